//! A simple histogram that can only be incremented. Bins are zero-based
//! because that is all this package needs: the one distribution stored this
//! way is the mapping-quality distribution, whose domain is 0-255.
use serde::Serialize;

/// Vec-backed, zero-based histogram over a closed bin range.
#[derive(Clone, Debug, Serialize)]
pub struct SimpleHistogram {
    // Vec-backed value store for the histogram.
    values: Vec<u64>,
    // Starting range for the histogram.
    range_start: usize,
    // Ending range for the histogram.
    range_stop: usize,
}

/// Error returned when an increment lands outside the histogram's range.
#[derive(Debug, PartialEq, Eq)]
pub struct BinOutOfBoundsError;

impl SimpleHistogram {
    /// Creates a zero-based histogram with a given capacity.
    pub fn zero_based_with_capacity(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity + 1],
            range_start: 0,
            range_stop: capacity,
        }
    }

    /// Increments a particular bin in the histogram by the specified value.
    pub fn increment_by(&mut self, bin: usize, value: u64) -> Result<(), BinOutOfBoundsError> {
        if bin < self.range_start || bin > self.range_stop {
            return Err(BinOutOfBoundsError);
        }

        self.values[bin] += value;
        Ok(())
    }

    /// Increments a particular bin in the histogram by one.
    pub fn increment(&mut self, bin: usize) -> Result<(), BinOutOfBoundsError> {
        self.increment_by(bin, 1)
    }

    /// Gives the starting position for the open range of the histogram.
    pub fn range_start(&self) -> usize {
        self.range_start
    }

    /// Gives the stopping position for the open range of the histogram.
    pub fn range_stop(&self) -> usize {
        self.range_stop
    }

    /// Whether the given value falls within the histogram's range.
    pub fn in_range(&self, value: usize) -> bool {
        self.range_start <= value && value <= self.range_stop
    }

    /// Gets a value for a bin within a histogram.
    pub fn get(&self, bin: usize) -> u64 {
        *self
            .values
            .get(bin)
            .unwrap_or_else(|| panic!("Could not lookup value for histogram bin: {}.", bin))
    }

    /// Sum of the counts in every bin.
    pub fn sum(&self) -> u64 {
        self.values.iter().sum()
    }

    /// Sum of the counts in bins at or above `bin`.
    pub fn count_ge(&self, bin: usize) -> u64 {
        self.values.iter().skip(bin).sum()
    }

    /// The non-empty bins, in ascending bin order.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(bin, &count)| (bin, count))
    }

    /// Computes the mean of all values within the histogram.
    pub fn mean(&self) -> f64 {
        let mut sum = 0.0;
        let mut denominator = 0.0;

        for i in self.range_start..=self.range_stop {
            let bin_value = self.get(i);
            denominator += bin_value as f64;
            sum += bin_value as f64 * i as f64;
        }

        sum / denominator
    }

    /// Computes the median of all values within the histogram.
    pub fn median(&self) -> Option<f64> {
        let mut sum: i64 = 0;
        // fp => Front pointer
        // bp => Back pointer
        let mut fp = self.range_start as i64 - 1;
        let mut bp = self.range_stop as i64 + 1;
        let mut last_known_nonzero_front: Option<i64> = None;
        let mut last_known_nonzero_back: Option<i64> = None;

        while fp != bp {
            if sum < 0 {
                fp += 1;

                if !self.in_range(fp as usize) {
                    break;
                }

                let val = self.get(fp as usize);
                if val != 0 && fp != bp {
                    last_known_nonzero_front = Some(fp);
                    sum += val as i64;
                }
            } else {
                bp -= 1;

                if bp < 0 || !self.in_range(bp as usize) {
                    break;
                }

                let val = self.get(bp as usize);
                if val != 0 && fp != bp {
                    last_known_nonzero_back = Some(bp);
                    sum -= val as i64;
                }
            }
        }

        if sum == 0 {
            if let Some(nonzero_front) = last_known_nonzero_front {
                if let Some(nonzero_back) = last_known_nonzero_back {
                    return Some(
                        (nonzero_back - nonzero_front) as f64 / 2.0 + nonzero_front as f64,
                    );
                }
            }

            None
        } else {
            Some(fp as f64)
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    pub fn test_initialization() {
        let s = SimpleHistogram::zero_based_with_capacity(100);
        assert_eq!(s.range_start(), 0);
        assert_eq!(s.range_stop(), 100);
    }

    #[test]
    pub fn test_valid_increments_and_mean_median() {
        let mut s = SimpleHistogram::zero_based_with_capacity(100);
        s.increment(25).unwrap();
        s.increment(50).unwrap();
        s.increment_by(75, 3).unwrap();

        assert_eq!(s.get(25), 1);
        assert_eq!(s.get(50), 1);
        assert_eq!(s.get(75), 3);

        assert_eq!(s.mean(), 60.0);
        assert_eq!(s.median().unwrap(), 75.0);
    }

    #[test]
    pub fn test_median_on_empty_histogram() {
        let s = SimpleHistogram::zero_based_with_capacity(5000);
        assert!(s.median().is_none());
    }

    #[test]
    pub fn test_median_extensively() {
        let mut s = SimpleHistogram::zero_based_with_capacity(5000);

        s.increment_by(0, 2500).unwrap();
        s.increment_by(10, 2500).unwrap();
        s.increment_by(100, 2500).unwrap();
        s.increment_by(5000, 5000).unwrap();
        let median = s.median();
        assert_eq!(median.unwrap(), 100.0);

        // If there is a tie, take the value in between the two middle values.
        s.increment_by(200, 2500).unwrap();
        let median = s.median();
        assert_eq!(median.unwrap(), 150.0);

        // If we add one more to sway the vote, the median should shift.
        s.increment(200).unwrap();
        let median = s.median();
        assert_eq!(median.unwrap(), 200.0);
    }

    #[test]
    pub fn test_invalid_increments() {
        let mut s = SimpleHistogram::zero_based_with_capacity(100);
        assert_eq!(s.increment(101).unwrap_err(), BinOutOfBoundsError);
    }

    #[test]
    pub fn test_count_ge_and_nonzero_iteration() {
        let mut s = SimpleHistogram::zero_based_with_capacity(255);
        s.increment(0).unwrap();
        s.increment_by(30, 2).unwrap();
        s.increment(255).unwrap();

        assert_eq!(s.sum(), 4);
        assert_eq!(s.count_ge(30), 3);
        assert_eq!(s.count_ge(31), 1);

        let nonzero: Vec<_> = s.iter_nonzero().collect();
        assert_eq!(nonzero, vec![(0, 1), (30, 2), (255, 1)]);
    }
}
