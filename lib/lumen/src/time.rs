use std::time::SystemTime;

/// Returns the current unix timestamp in milliseconds. Suitable as the
/// caller-supplied operation timestamp on store mutations.
#[inline]
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock predates the unix epoch")
        .as_millis() as u64
}
