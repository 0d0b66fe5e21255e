use chrono::{Duration, Utc};
use mailtrace::{
    BodySnapshot, ContentStore, MailTracker, MemoryContentStore, MemoryStore, SentEmailStore,
    SentRecord, TrackerConfig,
};

fn aged(token: &str, hours: i64) -> SentRecord {
    let mut record = SentRecord::new(token);
    record.created_at = Utc::now() - Duration::hours(hours);
    record
}

#[test]
fn one_day_window_splits_at_24_hours() {
    let mut config = TrackerConfig::new("https://track.example.com");
    config.expire_days = Some(1);
    let store = MemoryStore::shared();
    store.insert(aged("stale", 25));
    store.insert(aged("fresh", 23));
    let tracker = MailTracker::builder(config).store(store.clone()).build();

    assert_eq!(tracker.purge(None), 1);
    assert!(store.find_by_token("stale").is_none());
    assert!(store.find_by_token("fresh").is_some());
}

#[test]
fn zero_and_unset_windows_disable_purging() {
    let store = MemoryStore::shared();
    store.insert(aged("ancient", 24 * 365));
    let tracker = MailTracker::builder(TrackerConfig::new("https://track.example.com"))
        .store(store.clone())
        .build();

    assert_eq!(tracker.purge(None), 0);
    assert_eq!(tracker.purge(Some(0)), 0);
    assert_eq!(store.count(), 1);
}

#[test]
fn purge_cascades_clicks_and_external_content() {
    let mut config = TrackerConfig::new("https://track.example.com");
    config.expire_days = Some(1);
    let store = MemoryStore::shared();
    let content = MemoryContentStore::shared();

    let mut record = aged("stale", 48);
    record.content = BodySnapshot::File("mail-tracker/stale.html".to_string());
    let saved = store.insert(record);
    store.upsert_url_click(saved.id, "stale", "https://dest.example.com");
    content.put("mail-tracker/stale.html", "<p>old</p>").unwrap();

    let tracker = MailTracker::builder(config)
        .store(store.clone())
        .content_store(content.clone())
        .build();

    assert_eq!(tracker.purge(None), 1);
    assert!(store.url_clicks(saved.id).is_empty());
    assert!(content.get("mail-tracker/stale.html").is_none());
}

#[test]
fn purge_sweeps_more_than_one_batch() {
    let mut config = TrackerConfig::new("https://track.example.com");
    config.expire_days = Some(1);
    let store = MemoryStore::shared();
    for i in 0..1005 {
        store.insert(aged(&format!("stale-{}", i), 48));
    }
    let tracker = MailTracker::builder(config).store(store.clone()).build();

    assert_eq!(tracker.purge(None), 1005);
    assert_eq!(store.count(), 0);
}
