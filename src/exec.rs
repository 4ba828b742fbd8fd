//! Order-slicing execution primitives backing the hedger.

use std::future::Future;

/// Splits a total size into `slices` equal pieces separated by `interval`,
/// invoking `submit` once per slice in sequence.
pub struct Twap {
    slices: usize,
    interval: std::time::Duration,
}

impl Twap {
    pub fn new(slices: usize, interval: std::time::Duration) -> Self {
        assert!(slices > 0, "slices must be positive");
        Twap { slices, interval }
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    pub async fn execute<F, Fut>(&self, mut submit: F, total_size: f64)
    where
        F: FnMut(f64) -> Fut,
        Fut: Future<Output = ()>,
    {
        let size_per_slice = total_size / self.slices as f64;
        for i in 0..self.slices {
            submit(size_per_slice).await;
            if i + 1 < self.slices {
                tokio::time::sleep(self.interval).await;
            }
        }
    }
}

/// Splits a total size according to a weight profile, flushing any rounding
/// remainder as a final slice.
pub struct Vwap {
    profile: Vec<f64>,
}

impl Vwap {
    pub fn new(profile: Vec<f64>) -> Self {
        Vwap { profile }
    }

    pub fn execute<F>(&self, mut submit: F, total_size: f64)
    where
        F: FnMut(f64),
    {
        let mut remaining = total_size;
        for weight in &self.profile {
            let slice_size = total_size * weight;
            submit(slice_size);
            remaining -= slice_size;
        }
        if remaining.abs() > 1e-9 {
            submit(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn twap_submits_equal_slices() {
        let twap = Twap::new(4, std::time::Duration::from_millis(1));
        let total = Arc::new(parking_lot::Mutex::new(0.0f64));
        let count = Arc::new(AtomicUsize::new(0));
        {
            let total = total.clone();
            let count = count.clone();
            twap.execute(
                move |size| {
                    let total = total.clone();
                    let count = count.clone();
                    async move {
                        *total.lock() += size;
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                },
                8.0,
            )
            .await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(*total.lock(), 8.0);
    }

    #[test]
    fn vwap_flushes_rounding_remainder() {
        let vwap = Vwap::new(vec![0.3, 0.3]);
        let mut slices = Vec::new();
        vwap.execute(|size| slices.push(size), 10.0);
        let total: f64 = slices.iter().sum();
        assert!((total - 10.0).abs() < 1e-9);
        assert_eq!(slices.len(), 3);
    }

    #[test]
    fn vwap_exact_profile_has_no_remainder_slice() {
        let vwap = Vwap::new(vec![0.5, 0.5]);
        let mut slices = Vec::new();
        vwap.execute(|size| slices.push(size), 10.0);
        assert_eq!(slices.len(), 2);
    }
}
