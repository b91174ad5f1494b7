//! Utilities related to displaying things.

use std::fmt;
use std::time::Instant;

use num_format::Locale;
use num_format::ToFormattedString;
use tracing::debug;
use tracing::info;

/// Utility struct for displaying percentages. The first item in the struct is
/// the numerator and the second item in the struct is the denominator.
pub struct PercentageFormat(pub u64, pub u64);

impl fmt::Display for PercentageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.1 == 0 {
            f.write_str("N/A")
        } else {
            let (a, b) = (self.0 as f64, self.1 as f64);
            write!(f, "{:.3}%", a / b * 100.0)
        }
    }
}

/// Utility struct used to uniformly count and report the number of records
/// processed. Progress is reported every 100,000 records with the elapsed
/// time and throughput.
pub struct RecordCounter {
    count: u64,
    started_at: Instant,
}

impl RecordCounter {
    /// Creates a new `RecordCounter`.
    pub fn new() -> Self {
        Self {
            count: 0,
            started_at: Instant::now(),
        }
    }

    /// Gets the current number of records counted via a copy.
    pub fn get(&self) -> u64 {
        self.count
    }

    /// Increments the counter and reports progress (if appropriate).
    pub fn inc(&mut self) {
        self.count += 1;

        if self.count % 100_000 == 0 {
            let elapsed = self.started_at.elapsed().as_secs_f64();
            debug!(
                "  [*] Analyzed {} records in {:.1}s ({:.0} records/second).",
                self.count.to_formatted_string(&Locale::en),
                elapsed,
                self.count as f64 / elapsed,
            );
        }
    }

    /// Logs the final tally and overall throughput.
    pub fn report(&self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        info!(
            "Analyzed {} records in {:.1}s ({:.0} records/second).",
            self.count.to_formatted_string(&Locale::en),
            elapsed,
            self.count as f64 / elapsed,
        );
    }
}

impl Default for RecordCounter {
    fn default() -> Self {
        Self::new()
    }
}
