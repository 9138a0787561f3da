use super::*;
use crate::message::Command;
use std::thread;

#[test]
fn drain_preserves_single_producer_order() {
    let mailbox = Mailbox::new();
    let producer = mailbox.producer().expect("producer");
    for i in 0..5 {
        assert!(producer.send(Message::Command(Command::ScrollUp(i))));
    }
    let drained = mailbox.drain();
    assert_eq!(
        drained,
        (0..5)
            .map(|i| Message::Command(Command::ScrollUp(i)))
            .collect::<Vec<_>>()
    );
    assert!(mailbox.drain().is_empty());
}

#[test]
fn drain_limited_leaves_the_rest_queued() {
    let mailbox = Mailbox::new();
    let producer = mailbox.producer().expect("producer");
    for _ in 0..4 {
        producer.send(Message::ConnectionRestored);
    }
    assert_eq!(mailbox.drain_limited(3).len(), 3);
    assert_eq!(mailbox.drain().len(), 1);
}

#[test]
fn wait_returns_message_before_deadline() {
    let mailbox = Mailbox::new();
    let producer = mailbox.producer().expect("producer");
    let now = Instant::now();
    let mut ticker = Ticker::new(Duration::from_secs(5), now);
    producer.send(Message::ConnectionRestored);
    assert_eq!(
        mailbox.wait(&mut ticker, now),
        Wake::Message(Message::ConnectionRestored)
    );
}

#[test]
fn wait_times_out_into_a_tick() {
    let mailbox = Mailbox::new();
    let now = Instant::now();
    let mut ticker = Ticker::new(Duration::from_millis(5), now);
    assert_eq!(mailbox.wait(&mut ticker, now), Wake::Tick);
}

#[test]
fn sealed_mailbox_closes_after_last_producer_leaves() {
    let mut mailbox = Mailbox::new();
    let producer = mailbox.producer().expect("producer");
    mailbox.seal();
    assert!(mailbox.producer().is_none());

    let worker = thread::spawn(move || {
        producer.send(Message::ConnectionRestored);
    });
    worker.join().expect("worker joins");

    let mut ticker = Ticker::new(Duration::from_secs(5), Instant::now());
    assert_eq!(
        mailbox.wait(&mut ticker, Instant::now()),
        Wake::Message(Message::ConnectionRestored)
    );
    assert_eq!(mailbox.wait(&mut ticker, Instant::now()), Wake::Closed);
}

#[test]
fn ticker_skips_missed_periods() {
    let start = Instant::now();
    let mut ticker = Ticker::new(Duration::from_millis(16), start);
    assert!(!ticker.fire(start));
    assert_eq!(ticker.remaining(start), Duration::from_millis(16));

    let late = start + Duration::from_millis(100);
    assert!(ticker.fire(late));
    assert!(!ticker.fire(late));
    assert_eq!(ticker.remaining(late), Duration::from_millis(16));
}
