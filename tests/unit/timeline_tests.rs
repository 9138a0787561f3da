use super::*;
use std::time::{Duration, Instant};

fn thought(body: &str) -> EntryKind {
    EntryKind::Thought {
        markdown_body: body.to_string(),
    }
}

fn finished_store(count: usize) -> (TimelineStore, Vec<EntryKey>) {
    let mut store = TimelineStore::new();
    let now = Instant::now();
    let keys = (0..count)
        .map(|i| {
            store.append(
                CorrelationId::new(format!("e{i}")),
                thought("done"),
                EntryStatus::Completed,
                now,
            )
        })
        .collect();
    (store, keys)
}

#[test]
fn append_assigns_consecutive_sequences_from_zero() {
    let (store, keys) = finished_store(3);
    let sequences: Vec<u64> = keys
        .iter()
        .map(|key| store.get(*key).expect("entry").sequence())
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(store.next_sequence(), 3);
}

#[test]
fn terminal_appends_freeze_end_time_at_start() {
    let mut store = TimelineStore::new();
    let now = Instant::now();
    let atomic = store.append("a".into(), thought("x"), EntryStatus::Completed, now);
    let running = store.append("b".into(), thought("y"), EntryStatus::Running, now);
    assert_eq!(store.get(atomic).and_then(|e| e.ended_at), Some(now));
    assert_eq!(store.get(running).and_then(|e| e.ended_at), None);
}

#[test]
fn position_and_key_lookup_agree() {
    let (store, keys) = finished_store(5);
    for (position, key) in keys.iter().enumerate() {
        assert_eq!(store.position_of(*key), Some(position));
        assert_eq!(store.key_at(position), Some(*key));
    }
    assert_eq!(store.key_of(&"e3".into()), Some(keys[3]));
}

#[test]
fn evicted_key_never_resolves_even_after_slot_reuse() {
    let (mut store, keys) = finished_store(2);
    let evicted = store.evict(keys[0]).expect("finished entry evicts");
    assert_eq!(evicted.id().as_str(), "e0");
    assert!(!store.resolve(keys[0]));

    let reused = store.append(
        "fresh".into(),
        thought("new"),
        EntryStatus::Running,
        Instant::now(),
    );
    assert!(store.resolve(reused));
    assert!(!store.resolve(keys[0]));
    assert_ne!(reused, keys[0]);
    assert_eq!(store.len(), 2);
}

#[test]
fn eviction_refuses_running_and_discarded_entries() {
    let mut store = TimelineStore::new();
    let now = Instant::now();
    let running = store.append("r".into(), thought("r"), EntryStatus::Running, now);
    let discarded = store.append("d".into(), thought("d"), EntryStatus::Completed, now);
    store.get_mut(discarded).expect("entry").set_discarded(true);

    assert_eq!(store.evict(running), Err(EvictionViolation::Active(running)));
    assert_eq!(
        store.evict(discarded),
        Err(EvictionViolation::Discarded(discarded))
    );
    assert_eq!(store.len(), 2);
}

#[test]
fn lease_dies_with_eviction_and_explicit_release() {
    let (mut store, keys) = finished_store(2);
    let first = store.lease(keys[0]).expect("lease");
    let second = store.lease(keys[1]).expect("lease");
    assert!(first.upgrade().is_some());

    store.evict(keys[0]).expect("evict");
    assert!(first.upgrade().is_none());

    store.release_lease(keys[1]);
    assert!(second.upgrade().is_none());
    assert!(store.resolve(keys[1]));
}

#[test]
fn retired_ids_are_remembered_up_to_the_cap() {
    let mut store = TimelineStore::with_retired_cap(1);
    let now = Instant::now();
    let a = store.append("a".into(), thought("a"), EntryStatus::Completed, now);
    let b = store.append("b".into(), thought("b"), EntryStatus::Completed, now);
    store.evict(a).expect("evict a");
    assert!(store.has_seen(&"a".into()));
    assert!(store.key_of(&"a".into()).is_none());

    store.evict(b).expect("evict b");
    assert!(!store.has_seen(&"a".into()));
    assert!(store.has_seen(&"b".into()));
}

#[test]
fn finish_records_end_time() {
    let mut store = TimelineStore::new();
    let start = Instant::now();
    let key = store.append("t".into(), thought("t"), EntryStatus::Running, start);
    let end = start + Duration::from_secs(2);
    store.get_mut(key).expect("entry").finish(EntryStatus::Failed, end);
    let entry = store.get(key).expect("entry");
    assert_eq!(entry.status, EntryStatus::Failed);
    assert_eq!(entry.ended_at, Some(end));
}

#[test]
fn tool_kind_splits_pipeline_segments() {
    let kind = EntryKind::tool("bash", "cargo test | tee out.log |  ");
    let EntryKind::ToolUse {
        command_segments, ..
    } = kind
    else {
        panic!("expected tool kind");
    };
    assert_eq!(command_segments, vec!["cargo test", "tee out.log"]);
}
