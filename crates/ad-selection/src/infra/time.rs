use chrono::{DateTime, Utc};

#[cfg(not(test))]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Frozen for the lifetime of the test binary so expiry and frequency cap
/// windows are deterministic.
#[cfg(test)]
pub fn now() -> DateTime<Utc> {
    use std::sync::LazyLock;
    static NOW: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);
    *NOW
}
