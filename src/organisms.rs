//! Built-in autosomal reference lists for common organisms.
//!
//! Autosomal alignments are the basis of the fragment-size and peak metrics,
//! so each organism needs the exact set of reference names that count as
//! autosomal. Both bare (`1`) and `chr`-prefixed (`chr1`) spellings are
//! included; worm and yeast use Roman numerals. A caller-supplied file
//! (one reference name per line) replaces the built-in list entirely.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::errors::Error;
use crate::utils::io::open_reader;
use crate::utils::natural_sort::{integer_to_roman, sort_strings_with_roman_numerals};

/// The organisms with built-in autosome lists.
pub const ORGANISMS: [&str; 6] = ["fly", "human", "mouse", "rat", "worm", "yeast"];

fn numbered(count: u64) -> Vec<String> {
    (1..=count).map(|i| i.to_string()).collect()
}

fn roman(count: u64) -> Vec<String> {
    (1..=count).map(integer_to_roman).collect()
}

/// The autosomal reference names for an organism, or `None` for an organism
/// we have no list for.
pub fn autosomal_references(organism: &str) -> Option<HashSet<String>> {
    let bare: Vec<String> = match organism {
        "human" => numbered(22),
        "mouse" => numbered(19),
        "rat" => numbered(20),
        "fly" => ["2L", "2R", "3L", "3R", "4"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        "worm" => roman(5),
        "yeast" => roman(16),
        _ => return None,
    };

    let mut references = HashSet::with_capacity(bare.len() * 2);
    for name in bare {
        references.insert(format!("chr{}", name));
        references.insert(name);
    }

    Some(references)
}

/// Reads autosomal reference names from a file, one per line, replacing any
/// built-in list. Names must match the alignment file's reference names
/// exactly.
pub fn load_autosomal_references<P>(path: P) -> Result<HashSet<String>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let reader = open_reader(path)?;

    let mut references = HashSet::new();
    for line in reader.lines() {
        let line = line.map_err(|e| Error::FileFormat {
            format: "autosomal reference list",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let name = line.trim();
        if !name.is_empty() {
            references.insert(name.to_string());
        }
    }

    Ok(references)
}

/// A display-friendly rendering of an autosome set: the distinct suffixes
/// (without any `chr` prefix), in Roman-aware natural order.
pub fn display_list(references: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = references
        .iter()
        .map(|name| name.strip_prefix("chr").unwrap_or(name).to_string())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    names.sort_by(|a, b| sort_strings_with_roman_numerals(a, b));
    names
}
