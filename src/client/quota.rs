use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::config::ChatConfig;
use super::storage::KvStore;

/// Daily usage counter as persisted in client storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub day: String,
    #[serde(default)]
    pub used: u32,
}

/// UTC calendar day, unpadded (`2026-1-5`), matching records written by the web client.
pub fn day_key(now: DateTime<Utc>) -> String {
    format!("{}-{}-{}", now.year(), now.month(), now.day())
}

pub fn today_key() -> String {
    day_key(Utc::now())
}

/// Advisory per-day counter plus the optional chat thread id.
///
/// Every operation first rolls the record over if its day is not today, so a tracker left
/// idle across UTC midnight heals on next access. The tracker never refuses `consume`;
/// enforcing the limit is up to the caller, and the backend remains authoritative.
#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn KvStore>,
    daily_limit: u32,
    quota_key: String,
    thread_key: String,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn KvStore>, cfg: &ChatConfig) -> Self {
        Self {
            store,
            daily_limit: cfg.free_limit,
            quota_key: cfg.quota_key.clone(),
            thread_key: cfg.thread_key.clone(),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn record(&self) -> QuotaRecord {
        self.record_for_day(&today_key())
    }

    pub fn remaining(&self) -> u32 {
        self.remaining_for_day(&today_key())
    }

    /// Returns the new used count.
    pub fn consume(&self) -> u32 {
        self.consume_for_day(&today_key())
    }

    pub fn set_thread(&self, id: &str) {
        self.record();
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.store.set(&self.thread_key, id);
    }

    pub fn get_thread(&self) -> Option<String> {
        self.record();
        self.store
            .get(&self.thread_key)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn clear_thread(&self) {
        self.record();
        self.store.remove(&self.thread_key);
    }

    pub fn counter_label(&self) -> String {
        let left = self.remaining();
        let plural = if left == 1 { "" } else { "s" };
        format!("{left} free question{plural} left today.")
    }

    pub(crate) fn record_for_day(&self, today: &str) -> QuotaRecord {
        let stored = self.store.get(&self.quota_key).and_then(|raw| {
            match serde_json::from_str::<QuotaRecord>(&raw) {
                Ok(r) => Some(r),
                Err(e) => {
                    log::warn!("resetting unreadable quota record: {e}");
                    None
                }
            }
        });
        match stored {
            Some(r) if r.day == today => r,
            _ => {
                let fresh = QuotaRecord {
                    day: today.to_string(),
                    used: 0,
                };
                self.write(&fresh);
                fresh
            }
        }
    }

    pub(crate) fn remaining_for_day(&self, today: &str) -> u32 {
        self.daily_limit
            .saturating_sub(self.record_for_day(today).used)
    }

    pub(crate) fn consume_for_day(&self, today: &str) -> u32 {
        let mut record = self.record_for_day(today);
        record.used = record.used.saturating_add(1);
        self.write(&record);
        record.used
    }

    fn write(&self, record: &QuotaRecord) {
        match serde_json::to_string(record) {
            Ok(txt) => self.store.set(&self.quota_key, &txt),
            Err(e) => log::warn!("quota record not saved: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::{KvStore, MemoryKvStore};
    use chrono::TimeZone;

    fn tracker(limit: u32) -> (QuotaTracker, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let cfg = ChatConfig {
            free_limit: limit,
            ..ChatConfig::default()
        };
        (QuotaTracker::new(store.clone(), &cfg), store)
    }

    #[test]
    fn day_key_is_utc_and_unpadded() {
        let t = Utc.with_ymd_and_hms(2026, 1, 5, 23, 59, 0).unwrap();
        assert_eq!(day_key(t), "2026-1-5");
        let t = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(day_key(t), "2026-12-31");
    }

    #[test]
    fn fresh_install_starts_at_zero_and_persists_record() {
        let (q, store) = tracker(3);
        assert_eq!(q.remaining_for_day("2026-10-16"), 3);
        let raw = store.get("cgpt_free_quota_v1").expect("record written");
        let rec: QuotaRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            rec,
            QuotaRecord {
                day: "2026-10-16".to_string(),
                used: 0
            }
        );
    }

    #[test]
    fn stale_day_resets_on_next_access() {
        let (q, store) = tracker(3);
        let yesterday = day_key(Utc::now() - chrono::Duration::days(1));
        store.set(
            "cgpt_free_quota_v1",
            &format!(r#"{{"day":"{yesterday}","used":3}}"#),
        );

        assert_eq!(q.remaining(), 3);
        assert_eq!(q.record().used, 0);
        assert_eq!(q.record().day, today_key());
    }

    #[test]
    fn stale_day_resets_before_consume() {
        let (q, store) = tracker(3);
        store.set("cgpt_free_quota_v1", r#"{"day":"2026-10-15","used":3}"#);
        assert_eq!(q.consume_for_day("2026-10-16"), 1);
        assert_eq!(q.remaining_for_day("2026-10-16"), 2);
    }

    #[test]
    fn consume_keeps_counting_past_the_limit() {
        let (q, _) = tracker(2);
        let day = "2026-10-16";
        assert_eq!(q.consume_for_day(day), 1);
        assert_eq!(q.consume_for_day(day), 2);
        assert_eq!(q.remaining_for_day(day), 0);
        assert_eq!(q.consume_for_day(day), 3);
        assert_eq!(q.remaining_for_day(day), 0);
    }

    #[test]
    fn unreadable_record_is_replaced() {
        let (q, store) = tracker(3);
        store.set("cgpt_free_quota_v1", "{broken");
        assert_eq!(q.remaining_for_day("2026-10-16"), 3);
        let rec: QuotaRecord =
            serde_json::from_str(&store.get("cgpt_free_quota_v1").unwrap()).unwrap();
        assert_eq!(rec.used, 0);
    }

    #[test]
    fn thread_round_trip_and_clear() {
        let (q, _) = tracker(3);
        assert_eq!(q.get_thread(), None);
        q.set_thread("abc");
        assert_eq!(q.get_thread().as_deref(), Some("abc"));
        q.clear_thread();
        assert_eq!(q.get_thread(), None);
    }

    #[test]
    fn empty_thread_ids_are_ignored() {
        let (q, store) = tracker(3);
        q.set_thread("   ");
        assert_eq!(store.get("cgpt_thread_id"), None);
        store.set("cgpt_thread_id", "");
        assert_eq!(q.get_thread(), None);
    }

    #[test]
    fn clearing_thread_leaves_counter_alone() {
        let (q, _) = tracker(3);
        q.consume();
        q.set_thread("abc");
        q.clear_thread();
        assert_eq!(q.remaining(), 2);
    }

    #[test]
    fn counter_label_pluralizes() {
        let (q, _) = tracker(2);
        assert_eq!(q.counter_label(), "2 free questions left today.");
        q.consume();
        assert_eq!(q.counter_label(), "1 free question left today.");
        q.consume();
        assert_eq!(q.counter_label(), "0 free questions left today.");
    }
}
