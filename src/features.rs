//! Genomic intervals and the per-reference collections that index them.
//!
//! A [`Feature`] is a named half-open interval on a reference sequence, as
//! read from a BED file or derived from an alignment record. Features for a
//! single reference live in a [`ReferenceCollection`], which keeps the
//! min-start/max-end envelope of everything it holds and answers overlap
//! queries with a bracketed range scan. A [`ReferenceIndex`] groups
//! collections by reference name.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use noodles::sam::alignment::Record;
use noodles::sam::Header;

use crate::errors::Error;
use crate::utils::natural_sort::sort_strings_numerically;

//==========//
// Strand   //
//==========//

/// Strand of a feature, when the BED source carries one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strand {
    /// The forward (`+`) strand.
    Forward,
    /// The reverse (`-`) strand.
    Reverse,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("+"),
            Self::Reverse => f.write_str("-"),
        }
    }
}

//==========//
// Features //
//==========//

/// A named, half-open genomic interval.
///
/// Equality ignores the score and strand; ordering is natural-numeric on the
/// reference name, then start, then end, then name.
#[derive(Clone, Debug, Default)]
pub struct Feature {
    /// Name of the reference sequence the interval lies on.
    pub reference: String,

    /// 0-based inclusive start.
    pub start: u64,

    /// 0-based exclusive end.
    pub end: u64,

    /// Feature name (a peak name, a gene name, a read name).
    pub name: String,

    /// Optional BED score.
    pub score: Option<f64>,

    /// Optional strand.
    pub strand: Option<Strand>,
}

impl Feature {
    /// Creates a feature spanning `[start, end)` on `reference`.
    pub fn new<R, N>(reference: R, start: u64, end: u64, name: N) -> Self
    where
        R: Into<String>,
        N: Into<String>,
    {
        Self {
            reference: reference.into(),
            start,
            end,
            name: name.into(),
            score: None,
            strand: None,
        }
    }

    /// Builds the feature covered by an alignment record: its reference
    /// span `[position, end position)`, named after the read, stranded by
    /// the reverse-complement flag.
    pub fn from_alignment(header: &Header, record: &Record) -> Option<Self> {
        let id = record.reference_sequence_id()?;
        let (reference, _) = header.reference_sequences().get_index(id)?;
        let start = usize::from(record.alignment_start()?) as u64 - 1;
        let end = usize::from(record.alignment_end()?) as u64;

        let strand = if record.flags().is_unmapped() {
            None
        } else if record.flags().is_reverse_complemented() {
            Some(Strand::Reverse)
        } else {
            Some(Strand::Forward)
        };

        Some(Self {
            reference: reference.to_string(),
            start,
            end,
            name: record
                .read_name()
                .map(|name| name.to_string())
                .unwrap_or_default(),
            score: None,
            strand,
        })
    }

    /// The number of bases the feature covers.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the feature lies on the reverse strand.
    pub fn is_reverse(&self) -> bool {
        self.strand == Some(Strand::Reverse)
    }

    /// Whether two features overlap. Boundaries count: abutting intervals
    /// overlap, matching the convention of the neighbouring BED tooling.
    pub fn overlaps(&self, other: &Feature) -> bool {
        self.reference == other.reference && self.start <= other.end && other.start <= self.end
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.start == other.start
            && self.end == other.end
            && self.name == other.name
    }
}

impl Eq for Feature {}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> Ordering {
        sort_strings_numerically(&self.reference, &other.reference)
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| sort_strings_numerically(&self.name, &other.name))
    }
}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.reference, self.start, self.end, self.name
        )?;

        if let Some(score) = self.score {
            write!(f, "\t{}", score)?;
        }

        if let Some(strand) = self.strand {
            if self.score.is_none() {
                write!(f, "\t0")?;
            }
            write!(f, "\t{}", strand)?;
        }

        Ok(())
    }
}

//======//
// Span //
//======//

/// The interval surface the collection machinery needs: anything with a
/// reference name and a half-open span.
pub trait Span {
    /// The reference sequence name.
    fn reference(&self) -> &str;

    /// 0-based inclusive start.
    fn start(&self) -> u64;

    /// 0-based exclusive end.
    fn end(&self) -> u64;
}

impl Span for Feature {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn start(&self) -> u64 {
        self.start
    }

    fn end(&self) -> u64 {
        self.end
    }
}

//======================//
// Reference collection //
//======================//

/// An ordered collection of intervals that all share one reference, plus the
/// envelope (minimum start, maximum end) of everything added so far.
#[derive(Clone, Debug)]
pub struct ReferenceCollection<T> {
    reference: String,
    items: Vec<T>,
    start: u64,
    end: u64,
}

impl<T> Default for ReferenceCollection<T> {
    fn default() -> Self {
        Self {
            reference: String::new(),
            items: Vec::new(),
            start: 0,
            end: 0,
        }
    }
}

impl<T: Span + Ord> ReferenceCollection<T> {
    /// Adds an interval, maintaining the envelope. The first interval added
    /// establishes the collection's reference; later intervals on any other
    /// reference are rejected.
    pub fn add(&mut self, item: T) -> Result<(), Error> {
        if self.reference != item.reference() {
            if self.reference.is_empty() {
                self.reference = item.reference().to_string();
            } else {
                return Err(Error::ReferenceMismatch {
                    interval: item.reference().to_string(),
                    collection: self.reference.clone(),
                });
            }
        }

        if self.items.is_empty() || self.start > item.start() {
            self.start = item.start();
        }

        if self.items.is_empty() || self.end < item.end() {
            self.end = item.end();
        }

        self.items.push(item);
        Ok(())
    }

    /// Sorts the collection; call once after loading, before any queries.
    pub fn sort(&mut self) {
        self.items.sort_unstable();
    }

    /// Whether the collection's envelope overlaps the query.
    pub fn overlaps(&self, query: &Feature) -> bool {
        !self.items.is_empty()
            && self.reference == query.reference
            && self.start <= query.end
            && query.start <= self.end
    }

    /// The contiguous sub-range of intervals whose spans could overlap the
    /// query, bracketed by binary search: the lower bound discards intervals
    /// ending before the query starts, the upper bound discards intervals
    /// starting after the query ends. Callers still check each candidate for
    /// actual overlap.
    pub fn overlap_range_mut(&mut self, query: &Feature) -> &mut [T] {
        let lower = self.items.partition_point(|item| item.end() < query.start);
        let upper = self.items.partition_point(|item| item.start() <= query.end);

        if lower >= upper {
            &mut []
        } else {
            &mut self.items[lower..upper]
        }
    }

    /// The intervals held by this collection.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The number of intervals held by this collection.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

//=================//
// Reference index //
//=================//

/// A mapping from reference name to [`ReferenceCollection`]. Populated once
/// during load; queried read-only afterwards.
#[derive(Clone, Debug)]
pub struct ReferenceIndex<T> {
    collections: HashMap<String, ReferenceCollection<T>>,
}

impl<T> Default for ReferenceIndex<T> {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
        }
    }
}

impl<T: Span + Ord + Clone> ReferenceIndex<T> {
    /// Adds an interval to the collection for its reference, creating the
    /// collection on first sight.
    pub fn add(&mut self, item: T) -> Result<(), Error> {
        self.collections
            .entry(item.reference().to_string())
            .or_default()
            .add(item)
    }

    /// Sorts every per-reference collection.
    pub fn sort(&mut self) {
        for collection in self.collections.values_mut() {
            collection.sort();
        }
    }

    /// Looks up the collection for a reference.
    pub fn get(&self, reference: &str) -> Option<&ReferenceCollection<T>> {
        self.collections.get(reference)
    }

    /// Looks up the collection for a reference, mutably.
    pub fn get_mut(&mut self, reference: &str) -> Option<&mut ReferenceCollection<T>> {
        self.collections.get_mut(reference)
    }

    /// Whether the index holds no intervals at all.
    pub fn is_empty(&self) -> bool {
        self.collections.values().all(|c| c.is_empty())
    }

    /// Total number of intervals across all references.
    pub fn size(&self) -> usize {
        self.collections.values().map(|c| c.len()).sum()
    }

    /// Per-reference interval counts in natural reference order.
    pub fn reference_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<_> = self
            .collections
            .iter()
            .map(|(name, collection)| (name.clone(), collection.len()))
            .collect();
        counts.sort_by(|a, b| sort_strings_numerically(&a.0, &b.0));
        counts
    }

    /// Reference names ordered by descending interval count. Used to hand
    /// the busiest references to workers first.
    pub fn references_by_count_descending(&self) -> Vec<String> {
        let mut references: Vec<_> = self
            .collections
            .iter()
            .map(|(name, collection)| (collection.len(), name.clone()))
            .collect();
        references.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        references.into_iter().map(|(_, name)| name).collect()
    }

    /// Every interval in the index, in natural order.
    pub fn list(&self) -> Vec<T> {
        let mut items: Vec<T> = self
            .collections
            .values()
            .flat_map(|c| c.items().iter().cloned())
            .collect();
        items.sort_unstable();
        items
    }
}

/// An index over plain features (TSS, excluded regions).
pub type FeatureTree = ReferenceIndex<Feature>;

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(reference: &str, start: u64, end: u64, name: &str) -> Feature {
        Feature::new(reference, start, end, name)
    }

    #[test]
    fn test_overlaps() {
        let a = feature("chr1", 100, 200, "a");

        assert!(a.overlaps(&feature("chr1", 150, 250, "b")));
        assert!(a.overlaps(&feature("chr1", 0, 100, "abuts-left")));
        assert!(a.overlaps(&feature("chr1", 200, 300, "abuts-right")));
        assert!(a.overlaps(&feature("chr1", 0, 1000, "contains")));
        assert!(a.overlaps(&feature("chr1", 120, 130, "contained")));

        assert!(!a.overlaps(&feature("chr1", 201, 300, "right")));
        assert!(!a.overlaps(&feature("chr2", 100, 200, "other-reference")));
    }

    #[test]
    fn test_equality_ignores_score_and_strand() {
        let mut a = feature("chr1", 100, 200, "a");
        let mut b = feature("chr1", 100, 200, "a");
        a.score = Some(5.0);
        b.strand = Some(Strand::Reverse);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ordering_is_natural() {
        let mut features = vec![
            feature("chr10", 0, 10, "c"),
            feature("chr2", 50, 60, "b"),
            feature("chr2", 50, 55, "a"),
            feature("chr1", 100, 200, "z"),
        ];
        features.sort();

        let names: Vec<_> = features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b", "c"]);
    }

    #[test]
    fn test_collection_envelope_and_mismatch() {
        let mut collection = ReferenceCollection::default();
        collection.add(feature("chr1", 100, 200, "a")).unwrap();
        collection.add(feature("chr1", 50, 80, "b")).unwrap();
        collection.add(feature("chr1", 500, 600, "c")).unwrap();

        assert!(collection.overlaps(&feature("chr1", 60, 70, "q")));
        assert!(collection.overlaps(&feature("chr1", 300, 400, "gap")));
        assert!(!collection.overlaps(&feature("chr1", 700, 800, "beyond")));
        assert!(!collection.overlaps(&feature("chr2", 60, 70, "other")));

        let result = collection.add(feature("chr2", 0, 10, "bad"));
        assert!(matches!(result, Err(Error::ReferenceMismatch { .. })));
    }

    #[test]
    fn test_bracketed_range_scan() {
        let mut collection = ReferenceCollection::default();
        for (start, end, name) in [(100, 200, "a"), (400, 800, "b"), (900, 950, "c")] {
            collection
                .add(feature("chr1", start, end, name))
                .unwrap();
        }
        collection.sort();

        let query = feature("chr1", 350, 450, "q");
        let bracket = collection.overlap_range_mut(&query);
        let names: Vec<_> = bracket.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);

        let query = feature("chr1", 0, 1000, "everything");
        assert_eq!(collection.overlap_range_mut(&query).len(), 3);

        let query = feature("chr1", 210, 390, "gap");
        let bracket = collection.overlap_range_mut(&query);
        assert!(bracket.iter().all(|f| !f.overlaps(&query)));
    }

    #[test]
    fn test_index_counts_and_scheduling_order() {
        let mut index = FeatureTree::default();
        index.add(feature("chr2", 0, 10, "a")).unwrap();
        index.add(feature("chr2", 20, 30, "b")).unwrap();
        index.add(feature("chr10", 0, 10, "c")).unwrap();
        index.sort();

        assert_eq!(index.size(), 3);
        assert_eq!(
            index.reference_counts(),
            vec![(String::from("chr2"), 2), (String::from("chr10"), 1)]
        );
        assert_eq!(
            index.references_by_count_descending(),
            vec![String::from("chr2"), String::from("chr10")]
        );
    }
}
