use clap::Parser;

use ataqv::qc::command::{qc, Args};

fn main() {
    let args = Args::parse();

    let mut level = tracing::Level::INFO;
    if args.quiet {
        level = tracing::Level::ERROR;
    } else if args.verbose {
        level = tracing::Level::DEBUG;
    }

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if let Err(e) = qc(args) {
        eprintln!("\n\x1b[1;31mERROR: {:#}\x1b[0m\n", e);
        std::process::exit(1);
    }
}
