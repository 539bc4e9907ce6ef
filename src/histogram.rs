use std::collections::BTreeMap;

use crate::domain::{HistogramBin, Medians, ReadsHistogram, SampleCounts};

pub const DEFAULT_BINS: usize = 50;
pub const DEFAULT_DOMAIN: (f64, f64) = (0.0, 10_000_000.0);

/// Total read count of one sample plus the geographic keys (country code,
/// region) it is filed under.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReads {
    pub reads: f64,
    pub keys: Vec<String>,
}

/// `n + 1` edges equally spaced in log10 space between `a` and `b`. The lower
/// bound is clamped to 1 so an observed zero does not produce `-inf`.
pub fn log_space(a: f64, b: f64, n: usize) -> Vec<f64> {
    let n = n.max(1);
    let low = a.max(1.0).log10();
    let high = b.max(a).max(1.0).log10();
    let step = (high - low) / n as f64;
    (0..=n)
        .map(|index| {
            if index == n {
                10f64.powf(high)
            } else {
                10f64.powf(low + step * index as f64)
            }
        })
        .collect()
}

fn bin_index(edges: &[f64], value: f64) -> usize {
    let bins = edges.len().saturating_sub(1).max(1);
    edges
        .partition_point(|edge| *edge <= value)
        .saturating_sub(1)
        .min(bins - 1)
}

pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}

/// Bins every sample over a shared log-spaced domain. Each bin carries the
/// overall count plus one count per geographic key, so filtering by a selected
/// country or region reads the same bins.
pub fn reads_histogram(samples: &[SampleReads], bins: usize, fallback: (f64, f64)) -> ReadsHistogram {
    let finite = samples.iter().filter(|sample| sample.reads.is_finite());
    let (min, max) = finite.fold(None, |range: Option<(f64, f64)>, sample| {
        Some(match range {
            Some((min, max)) => (min.min(sample.reads), max.max(sample.reads)),
            None => (sample.reads, sample.reads),
        })
    })
    .unwrap_or(fallback);

    let edges = log_space(min, max, bins);
    let mut histogram: Vec<HistogramBin> = edges
        .windows(2)
        .map(|pair| HistogramBin {
            samples: SampleCounts::default(),
            min: pair[0],
            max: pair[1],
            mid: (pair[0] * pair[1]).sqrt(),
        })
        .collect();

    let mut all = Vec::with_capacity(samples.len());
    let mut by_key: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for sample in samples.iter().filter(|sample| sample.reads.is_finite()) {
        let keys: Vec<&str> = sample.keys.iter().map(String::as_str).collect();
        histogram[bin_index(&edges, sample.reads)]
            .samples
            .increment(&keys);
        all.push(sample.reads);
        for (position, key) in keys.iter().enumerate() {
            if key.is_empty() || keys[..position].contains(key) {
                continue;
            }
            by_key.entry(*key).or_default().push(sample.reads);
        }
    }

    let median = Medians {
        total: median(&mut all),
        by_key: by_key
            .into_iter()
            .map(|(key, mut values)| (key.to_string(), median(&mut values)))
            .collect(),
    };

    ReadsHistogram { histogram, median }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(reads: f64, keys: &[&str]) -> SampleReads {
        SampleReads {
            reads,
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    #[test]
    fn log_space_edges() {
        let edges = log_space(1.0, 1000.0, 3);
        assert_eq!(edges.len(), 4);
        let expected = [1.0, 10.0, 100.0, 1000.0];
        for (edge, expected) in edges.iter().zip(expected) {
            assert!((edge - expected).abs() < 1e-6, "{edge} != {expected}");
        }
    }

    #[test]
    fn log_space_clamps_zero() {
        let edges = log_space(0.0, 100.0, 2);
        assert!((edges[0] - 1.0).abs() < 1e-9);
        assert!((edges[2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn covers_every_sample() {
        let samples = vec![
            sample(0.0, &["US", "Northern America"]),
            sample(10.0, &["US", "Northern America"]),
            sample(500.0, &["FR", "Europe"]),
            sample(12_345.0, &["FR", "Europe"]),
            sample(99_999.0, &["", ""]),
        ];
        let result = reads_histogram(&samples, DEFAULT_BINS, DEFAULT_DOMAIN);
        assert_eq!(result.histogram.len(), DEFAULT_BINS);
        let total: u64 = result.histogram.iter().map(|bin| bin.samples.total).sum();
        assert_eq!(total, 5);
        let us: u64 = result.histogram.iter().map(|bin| bin.samples.get("US")).sum();
        assert_eq!(us, 2);
        let europe: u64 = result
            .histogram
            .iter()
            .map(|bin| bin.samples.get("Europe"))
            .sum();
        assert_eq!(europe, 2);
        assert_eq!(result.histogram.last().unwrap().samples.total, 1);
    }

    #[test]
    fn medians_per_key() {
        let samples = vec![
            sample(1.0, &["US"]),
            sample(3.0, &["US"]),
            sample(100.0, &["FR"]),
        ];
        let result = reads_histogram(&samples, 4, DEFAULT_DOMAIN);
        assert_eq!(result.median.total, 3.0);
        assert_eq!(result.median.by_key["US"], 2.0);
        assert_eq!(result.median.by_key["FR"], 100.0);
    }

    #[test]
    fn empty_uses_fallback_domain() {
        let result = reads_histogram(&[], 10, DEFAULT_DOMAIN);
        assert_eq!(result.histogram.len(), 10);
        assert!((result.histogram.last().unwrap().max - 10_000_000.0).abs() < 1e-3);
        assert_eq!(result.median.total, 0.0);
    }

    #[test]
    fn single_value_domain() {
        let result = reads_histogram(&[sample(42.0, &[]), sample(42.0, &[])], 5, DEFAULT_DOMAIN);
        let total: u64 = result.histogram.iter().map(|bin| bin.samples.total).sum();
        assert_eq!(total, 2);
    }
}
