// Library root: domain types, the question ledger, derived views and the
// ledger event feed shared by the LLM and server crates.

pub mod analytics;
pub mod config;
pub mod examples;
pub mod explore;
pub mod feed;
pub mod ledger;
pub mod protocol;
pub mod question;

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
