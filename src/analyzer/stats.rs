use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::Display;

/// Arithmetic mean. `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation. `None` for fewer than two samples,
/// where the spread is undefined rather than zero.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Keys that can be counted by a `Histogram`. Equality is exact; floats
/// compare by bit pattern, so 0.1 + 0.2 and 0.3 are different buckets.
pub trait HistogramKey: Copy + Display {
    fn same_bucket(&self, other: &Self) -> bool;
}

macro_rules! int_histogram_key {
    ($($t:ty),*) => {
        $(impl HistogramKey for $t {
            fn same_bucket(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

int_histogram_key!(u8, i32, usize);

impl HistogramKey for &'static str {
    fn same_bucket(&self, other: &Self) -> bool {
        self == other
    }
}

impl HistogramKey for f64 {
    fn same_bucket(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

/// Frequency table that remembers the order in which keys first appeared.
///
/// Serializes as a JSON object with stringified keys so it can be stored
/// in a single TEXT column.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<K> {
    entries: Vec<(K, usize)>,
}

impl<K> Default for Histogram<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: HistogramKey> Histogram<K> {
    /// Histogram with preset counts, in the given order. Zero counts are kept.
    pub fn from_counts(counts: impl IntoIterator<Item = (K, usize)>) -> Self {
        let mut hist = Self::default();
        for (key, count) in counts {
            match hist.entries.iter_mut().find(|(k, _)| k.same_bucket(&key)) {
                Some((_, c)) => *c += count,
                None => hist.entries.push((key, count)),
            }
        }
        hist
    }

    pub fn add(&mut self, key: K) {
        match self.entries.iter_mut().find(|(k, _)| k.same_bucket(&key)) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key, 1)),
        }
    }

    pub fn get(&self, key: K) -> usize {
        self.entries
            .iter()
            .find(|(k, _)| k.same_bucket(&key))
            .map_or(0, |(_, c)| *c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(K, usize)] {
        &self.entries
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, c)| c).sum()
    }
}

impl<K: HistogramKey> FromIterator<K> for Histogram<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut hist = Self::default();
        for key in iter {
            hist.add(key);
        }
        hist
    }
}

impl<K: HistogramKey> Serialize for Histogram<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(&key.to_string(), count)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), Some(5.0));
        assert_eq!(std_dev(&v), Some(2.0));
    }

    #[test]
    fn test_degenerate_inputs_are_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert_eq!(std_dev(&[3.0]), None);
        assert_eq!(mean(&[3.0]), Some(3.0));
    }

    #[test]
    fn test_histogram_keeps_first_occurrence_order() {
        let h: Histogram<i32> = [5, -2, 5, 0, -2, 5].into_iter().collect();
        assert_eq!(h.entries(), &[(5, 3), (-2, 2), (0, 1)]);
        assert_eq!(h.get(5), 3);
        assert_eq!(h.get(7), 0);
        assert_eq!(h.total(), 6);
    }

    #[test]
    fn test_preset_counts_keep_zeros_and_order() {
        let h = Histogram::from_counts([("b", 0), ("a", 2), ("b", 1)]);
        assert_eq!(h.entries(), &[("b", 1), ("a", 2)]);
        assert_eq!(serde_json::to_string(&h).unwrap(), r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_float_histogram_uses_exact_equality() {
        let h: Histogram<f64> = [0.5, 0.5, 0.1 + 0.2, 0.3].into_iter().collect();
        assert_eq!(h.get(0.5), 2);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_histogram_serializes_as_string_keyed_object() {
        let h: Histogram<u8> = [0, 7, 0].into_iter().collect();
        assert_eq!(serde_json::to_string(&h).unwrap(), r#"{"0":2,"7":1}"#);

        let d: Histogram<f64> = [0.25, 1.0].into_iter().collect();
        assert_eq!(serde_json::to_string(&d).unwrap(), r#"{"0.25":1,"1":1}"#);
    }
}
