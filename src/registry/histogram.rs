//! Bucketed distribution accumulator.

use serde::Serialize;

/// Default bucket boundaries (seconds-oriented, same shape as the Prometheus
/// client defaults).
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Returns true if `bounds` are finite and strictly increasing.
pub fn valid_buckets(bounds: &[f64]) -> bool {
    bounds.iter().all(|b| b.is_finite()) && bounds.windows(2).all(|w| w[0] < w[1])
}

/// Live histogram series.
///
/// `counts` has one slot per boundary plus a trailing `+Inf` slot; counts are
/// per-bucket, not cumulative.
#[derive(Debug, Clone)]
pub(crate) struct HistogramState {
    bounds: Vec<f64>,
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramState {
    pub(crate) fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum: 0.0,
            count: 0,
        }
    }

    /// Count `value` in the smallest bucket whose upper bound is >= `value`.
    pub(crate) fn observe(&mut self, value: f64) {
        let idx = self.bounds.partition_point(|&upper| upper < value);
        self.counts[idx] += 1;
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter())
            .map(|(upper_bound, &n)| {
                cumulative += n;
                Bucket {
                    upper_bound,
                    cumulative_count: cumulative,
                }
            })
            .collect();
        HistogramSnapshot {
            buckets,
            sum: self.sum,
            count: self.count,
        }
    }
}

/// One cumulative bucket of a histogram snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    /// Inclusive upper bound; the final bucket is `+Inf`.
    #[serde(serialize_with = "serialize_bound")]
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

fn serialize_bound<S: serde::Serializer>(bound: &f64, s: S) -> Result<S::Ok, S::Error> {
    if bound.is_infinite() {
        s.serialize_str("+Inf")
    } else {
        s.serialize_f64(*bound)
    }
}

/// Point-in-time view of one histogram series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<Bucket>,
    pub sum: f64,
    pub count: u64,
}

impl HistogramSnapshot {
    /// Arithmetic mean of all observations, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Estimate the `q`-quantile (0 <= q <= 1).
    ///
    /// Interpolates linearly inside the bucket holding the target rank, with
    /// the lowest bucket starting at zero. Ranks landing in `+Inf` report the
    /// highest finite boundary.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 || !(0.0..=1.0).contains(&q) {
            return None;
        }
        let rank = q * self.count as f64;
        let mut lower_bound = 0.0;
        let mut lower_count = 0u64;
        for bucket in &self.buckets {
            if bucket.cumulative_count as f64 >= rank {
                if bucket.upper_bound.is_infinite() {
                    return Some(lower_bound);
                }
                let in_bucket = (bucket.cumulative_count - lower_count) as f64;
                if in_bucket == 0.0 {
                    return Some(bucket.upper_bound);
                }
                let fraction = (rank - lower_count as f64) / in_bucket;
                return Some(lower_bound + (bucket.upper_bound - lower_bound) * fraction);
            }
            lower_bound = bucket.upper_bound;
            lower_count = bucket.cumulative_count;
        }
        None
    }
}
