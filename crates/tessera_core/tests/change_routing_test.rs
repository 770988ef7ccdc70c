//! Change routing under concurrent notification and drain.
//!
//! Every notification must land in exactly one drain: either the one in
//! progress or the next.

use std::sync::Arc;
use std::thread;
use tessera_core::record::memory::{MemRecord, MemStore};
use tessera_core::{ChangeHub, ClientId, NodeId, Record, RecordChange, Subscriber, Topic};

#[test]
fn test_concurrent_notify_and_drain_loses_nothing() {
    let hub = Arc::new(ChangeHub::new());
    let client = ClientId::new(1);
    let buffer = hub.register_client(client);
    hub.subscribe(Subscriber::new(client, NodeId::new(1)), [Topic::Type(Arc::from("Msg"))]);

    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 500;

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    // distinct records so the buffer cannot coalesce them
                    let rec = MemRecord::new("Msg", w * PER_WRITER + i).shared();
                    hub.notify(&RecordChange::saved(rec));
                }
            })
        })
        .collect();

    let mut seen = 0usize;
    while writers.iter().any(|w| !w.is_finished()) {
        seen += buffer.drain().len();
        thread::yield_now();
    }
    for w in writers {
        w.join().unwrap();
    }
    seen += buffer.drain().len();

    assert_eq!(seen as u64, WRITERS * PER_WRITER);
}

#[test]
fn test_store_save_reaches_listening_client() {
    let hub = Arc::new(ChangeHub::new());
    let store = MemStore::with_hub(Arc::clone(&hub));
    let room = store.create("Room", [("name", "g708")]);

    let listening = hub.register_client(ClientId::new(1));
    let idle = hub.register_client(ClientId::new(2));
    hub.subscribe(
        Subscriber::new(ClientId::new(1), NodeId::new(5)),
        [Topic::Record(room.key())],
    );

    room.set("name", "xxx");
    store.save(&room);

    let changes = listening.drain();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].record().read_field("name").as_str(), Some("xxx"));
    assert!(idle.is_empty());

    store.destroy(&room).unwrap();
    assert_eq!(listening.len(), 1);
}
