use super::*;
use crate::mailbox::Mailbox;
use crate::message::CorrelationId;
use crate::timeline::{EntryKind, EntryStatus, TimelineStore};
use std::io::Cursor;
use std::time::Instant;

fn running_store() -> (TimelineStore, EntryKey) {
    let mut store = TimelineStore::new();
    let key = store.append(
        CorrelationId::new("tool"),
        EntryKind::tool("bash", "cargo test"),
        EntryStatus::Running,
        Instant::now(),
    );
    (store, key)
}

#[test]
fn push_delivers_deltas_while_entry_lives() {
    let mailbox = Mailbox::new();
    let (store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );

    assert!(handle.is_alive());
    handle.push("hello").expect("push succeeds");
    assert_eq!(
        mailbox.drain(),
        vec![Message::StreamDelta {
            target: key,
            chunk: "hello".to_string(),
        }]
    );
}

#[test]
fn push_fails_once_lease_is_released() {
    let mailbox = Mailbox::new();
    let (mut store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );
    store.release_lease(key);
    assert!(!handle.is_alive());
    assert_eq!(handle.push("late"), Err(StreamClosed));
    assert!(mailbox.drain().is_empty());
}

#[test]
fn push_fails_when_store_is_dropped() {
    let mailbox = Mailbox::new();
    let (store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );
    drop(store);
    assert_eq!(handle.push("orphan"), Err(StreamClosed));
}

#[test]
fn output_pump_forwards_lines_until_reader_ends() {
    let mailbox = Mailbox::new();
    let (store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );
    let pump = spawn_output_pump(handle, Cursor::new("one\ntwo\n"), CancelToken::new());
    pump.join().expect("pump joins");

    let chunks: Vec<String> = mailbox
        .drain()
        .into_iter()
        .filter_map(|message| match message {
            Message::StreamDelta { chunk, .. } => Some(chunk),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn cancelled_pump_pushes_nothing() {
    let mailbox = Mailbox::new();
    let (store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );
    let cancel = CancelToken::new();
    cancel.cancel();
    spawn_output_pump(handle, Cursor::new("one\n"), cancel)
        .join()
        .expect("pump joins");
    assert!(mailbox.drain().is_empty());
}

#[test]
fn pump_stops_silently_when_target_is_gone() {
    let mailbox = Mailbox::new();
    let (mut store, key) = running_store();
    let handle = StreamHandle::new(
        key,
        store.lease(key).expect("lease"),
        mailbox.producer().expect("producer"),
    );
    store.release_lease(key);
    spawn_output_pump(handle, Cursor::new("a\nb\nc\n"), CancelToken::new())
        .join()
        .expect("pump joins");
    assert!(mailbox.drain().is_empty());
}
