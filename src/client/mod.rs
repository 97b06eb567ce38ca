pub mod agents;
pub mod chat;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod quota;
pub mod site;
pub mod storage;
pub mod tasks;
pub mod token;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;

pub fn unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
