//! Serde default providers shared by the profile models.

pub(crate) const fn poll_interval_ms() -> u64 {
    10_000
}

pub(crate) const fn max_concurrent() -> usize {
    1
}
