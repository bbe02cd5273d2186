//! Integration tests for channels
//!
//! These tests exercise channels across threads:
//! - Many producers and consumers sharing one named channel
//! - Per-producer FIFO order
//! - Close waking every blocked receiver
//! - Transports that fail and fall back to buffering

use prometheus_task_engine::core::{
    Capacity, Channel, ChannelError, ChannelRegistry, Payload, Transport, WriterTransport,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Drain `channel` until it is closed, returning everything received.
fn drain(channel: &Channel) -> Vec<Payload> {
    let mut received = Vec::new();
    loop {
        match channel.recv() {
            Ok(payload) => received.push(payload),
            Err(ChannelError::Closed) => return received,
            Err(err) => panic!("unexpected channel error: {err}"),
        }
    }
}

/// Sink that accepts `budget` writes and then fails.
struct FlakySink {
    budget: usize,
    lines: Arc<Mutex<Vec<u8>>>,
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        self.lines.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.budget = self.budget.saturating_sub(1);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_many_producers_many_consumers() {
    println!("\n=== test_many_producers_many_consumers ===");

    let registry = ChannelRegistry::new();
    registry.make("work", Capacity::Buffered(16)).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let registry = registry.clone();
            thread::spawn(move || {
                let channel = registry.open("work").unwrap();
                for i in 0..250 {
                    channel.send(&json!(format!("{p}:{i}"))).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let channel = registry.open("work").unwrap();
            thread::spawn(move || drain(&channel))
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    registry.open("work").unwrap().close().unwrap();

    let mut per_producer: HashMap<String, Vec<u32>> = HashMap::new();
    let mut total = 0;
    for consumer in consumers {
        let received = consumer.join().unwrap();
        total += received.len();
        let mut last_seen: HashMap<String, u32> = HashMap::new();
        for payload in received {
            let text = payload.as_str().unwrap().to_string();
            let (producer, index) = text.split_once(':').unwrap();
            let index: u32 = index.parse().unwrap();
            // each consumer sees any one producer's values in send order
            if let Some(previous) = last_seen.insert(producer.to_string(), index) {
                assert!(previous < index);
            }
            per_producer.entry(producer.to_string()).or_default().push(index);
        }
    }

    println!("Received {total} payloads");
    assert_eq!(total, 1_000);
    for (producer, mut indices) in per_producer {
        indices.sort_unstable();
        assert_eq!(indices, (0..250).collect::<Vec<_>>(), "producer {producer}");
    }

    println!("=== test_many_producers_many_consumers PASSED ===\n");
}

#[test]
fn test_close_wakes_every_blocked_receiver() {
    println!("\n=== test_close_wakes_every_blocked_receiver ===");

    let channel = Channel::new(Capacity::Unbuffered);
    let receivers: Vec<_> = (0..5)
        .map(|_| {
            let channel = channel.clone();
            thread::spawn(move || channel.recv())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    channel.close().unwrap();

    for receiver in receivers {
        assert!(matches!(receiver.join().unwrap(), Err(ChannelError::Closed)));
    }
    assert!(channel.is_closed());

    println!("=== test_close_wakes_every_blocked_receiver PASSED ===\n");
}

#[test]
fn test_dead_transport_falls_back_to_buffer() {
    println!("\n=== test_dead_transport_falls_back_to_buffer ===");

    let lines = Arc::new(Mutex::new(Vec::new()));
    let channel = Channel::named("telemetry", Capacity::Infinite);
    channel.bind(WriterTransport::new(FlakySink {
        budget: 2,
        lines: Arc::clone(&lines),
    }));

    channel.send(&json!("first")).unwrap();
    channel.send(&json!(2)).unwrap();
    let err = channel.send(&json!("third")).unwrap_err();
    println!("Transport failure: {err}");
    assert!(matches!(err, ChannelError::Transport(_)));

    // the transport is dead now, so sends are buffered
    channel.send(&json!("fourth")).unwrap();
    assert_eq!(channel.len(), 1);
    assert_eq!(channel.recv().unwrap(), Payload::Text("fourth".into()));
    assert_eq!(lines.lock().as_slice(), b"first\n2\n");

    println!("=== test_dead_transport_falls_back_to_buffer PASSED ===\n");
}

#[test]
fn test_custom_transport() {
    println!("\n=== test_custom_transport ===");

    struct Collect(Arc<Mutex<Vec<Payload>>>);

    impl Transport for Collect {
        fn is_alive(&self) -> bool {
            true
        }

        fn write(&mut self, payload: &Payload) -> io::Result<()> {
            self.0.lock().push(payload.clone());
            Ok(())
        }
    }

    let collected = Arc::new(Mutex::new(Vec::new()));
    let channel = Channel::new(Capacity::Unbuffered);
    channel.bind(Collect(Arc::clone(&collected)));
    channel.send_bytes(vec![1, 2, 3]).unwrap();
    channel.send_payload(Payload::from("raw")).unwrap();

    assert!(channel.is_empty());
    assert_eq!(
        *collected.lock(),
        vec![Payload::Bytes(vec![1, 2, 3]), Payload::Text("raw".into())]
    );
    assert!(channel.unbind());
    assert!(!channel.unbind());

    println!("=== test_custom_transport PASSED ===\n");
}

#[test]
fn test_illegal_values_are_rejected_before_sending() {
    println!("\n=== test_illegal_values_are_rejected_before_sending ===");

    let channel = Channel::new(Capacity::Infinite);
    assert!(matches!(
        channel.send(&json!({"nested": true})),
        Err(ChannelError::IllegalValue(_))
    ));
    assert!(channel.is_empty());

    println!("=== test_illegal_values_are_rejected_before_sending PASSED ===\n");
}
