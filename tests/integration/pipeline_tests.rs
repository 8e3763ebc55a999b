//! Sensor edge → outbox → session loop → transport, end to end.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::thread;

use futures_lite::future::block_on;

use smartlight::app::heartbeat::Heartbeat;
use smartlight::app::ports::SharedOutputs;
use smartlight::app::sensors::{SensorHandler, SensorSignal};
use smartlight::config::{AgentConfig, CHANNELS, PUBLISH_QUEUE_DEPTH, TELEMETRY_TOPIC};
use smartlight::error::PublishError;
use smartlight::fsm::context::SessionContext;
use smartlight::fsm::{SessionMachine, SessionState};
use smartlight::pubsub::link::SessionLink;
use smartlight::pubsub::outbox::Outbox;
use smartlight::pubsub::queue::{QoS, Topic};

use crate::mock_hw::{Call, MockDelay, MockInputs, MockOutputs, MockTransport, fast_config, leak, wait_until};

const CREDENTIAL: &str = "DE:AD:BE:EF:CA:FE";

#[test]
fn door_opening_reaches_the_broker_and_lights_the_lamp() {
    let outbox = leak(Outbox::new());
    let link = leak(SessionLink::new());
    let signal = leak(SensorSignal::new());
    let lights = leak(SharedOutputs::new(MockOutputs::default()));
    let levels = leak([const { AtomicBool::new(false) }; 4]);

    // Baseline is taken here, before any edge.
    let mut inputs = MockInputs { levels };
    let handler = SensorHandler::new(&CHANNELS, outbox, &mut inputs);
    // Sensor worker: runs for the rest of the test binary.
    thread::spawn::<_, ()>(move || {
        let mut outputs = lights;
        handler.run(signal, &mut inputs, &mut outputs)
    });

    let session = thread::spawn(move || {
        let ctx = SessionContext::new(
            MockTransport::new(link),
            MockDelay::default(),
            lights,
            link,
            outbox,
            fast_config(),
            CREDENTIAL,
        );
        let mut machine = SessionMachine::new(ctx);
        machine.run();
        machine.into_context()
    });

    assert!(wait_until(|| link.is_established()));

    // Door edge, then the wake-up the GPIO interrupt would give.
    MockInputs { levels }.set(0, true);
    signal.notify();

    assert!(wait_until(|| lights.with(|o| o.levels[0])));
    assert!(wait_until(|| outbox.queue.is_empty() && outbox.arena.used_units() == 0));

    outbox.queue.close();
    let ctx = session.join().unwrap();
    assert_eq!(
        ctx.transport.published(),
        vec![(TELEMETRY_TOPIC.to_string(), r#"{"Door":"Open"}"#.to_string())]
    );
    assert_eq!(ctx.transport.calls[1], Call::Session { credential: CREDENTIAL.to_string() });
    assert_eq!(lights.with(|o| o.writes.clone()), vec![(0, true)]);
}

#[test]
fn full_queue_rejects_then_accepts_after_one_dequeue() {
    let outbox = Outbox::new();
    for i in 0..PUBLISH_QUEUE_DEPTH {
        outbox.publish(Topic::Telemetry, QoS::AtMostOnce, format!("{i}").as_bytes()).unwrap();
    }
    let used = outbox.arena.used_units();

    assert_eq!(outbox.publish(Topic::Telemetry, QoS::AtMostOnce, b"21"), Err(PublishError::QueueFull));
    assert_eq!(outbox.arena.used_units(), used, "rejected payload must not leak arena units");

    let first = outbox.queue.try_dequeue().unwrap();
    assert_eq!(outbox.arena.bytes(&first.block), b"0");
    outbox.arena.release(first.block);

    outbox.publish(Topic::Telemetry, QoS::AtMostOnce, b"21").unwrap();
    assert_eq!(outbox.queue.len(), PUBLISH_QUEUE_DEPTH);
    outbox.shutdown();
    assert_eq!(outbox.arena.used_units(), 0);
}

#[test]
fn arena_exhaustion_drops_without_touching_the_queue() {
    let outbox = Outbox::new();
    let cap = outbox.arena.capacity_units() * 64;
    // Two half-pool payloads leave no room for a third.
    outbox.publish(Topic::Attributes, QoS::AtMostOnce, &vec![b'a'; cap / 2]).unwrap();
    outbox.publish(Topic::Attributes, QoS::AtMostOnce, &vec![b'b'; cap / 2]).unwrap();

    assert_eq!(outbox.publish(Topic::Telemetry, QoS::AtMostOnce, b"x"), Err(PublishError::OutOfMemory));
    assert_eq!(outbox.queue.len(), 2);
    assert_eq!(outbox.shutdown(), 2);
    assert_eq!(outbox.arena.free_units(), outbox.arena.capacity_units());
}

#[test]
fn heartbeat_and_telemetry_share_one_ordered_stream() {
    let outbox = leak(Outbox::new());
    let link = leak(SessionLink::new());
    let lights = leak(SharedOutputs::new(MockOutputs::default()));
    let config = AgentConfig {
        firmware_version: "1.2.3",
        ..fast_config()
    };

    Heartbeat::new(outbox, &config, "SL-EFCAFE").beat(7).unwrap();
    outbox.publish(Topic::Telemetry, QoS::AtMostOnce, br#"{"Board":"Writing"}"#).unwrap();

    let session = thread::spawn(move || {
        let ctx = SessionContext::new(MockTransport::new(link), MockDelay::default(), lights, link, outbox, config, CREDENTIAL);
        let mut machine = SessionMachine::new(ctx);
        machine.run();
        (machine.state(), machine.into_context())
    });

    assert!(wait_until(|| outbox.queue.is_empty() && outbox.arena.used_units() == 0));
    outbox.queue.close();
    let (state, ctx) = session.join().unwrap();

    assert_eq!(state, SessionState::Terminated);
    let published = ctx.transport.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, "v1/devices/me/attributes");
    assert_eq!(published[0].1, r#"{"firmware_version":"1.2.3","serial_number":"SL-EFCAFE","uptime":"7"}"#);
    assert_eq!(published[1].0, "v1/devices/me/telemetry");
    assert_eq!(ctx.stats.published, 2);
}

#[test]
fn concurrent_producers_feed_one_consumer_without_loss_or_leak() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 300;

    let outbox = Outbox::new();
    let (accepted, delivered) = thread::scope(|s| {
        let consumer = s.spawn(|| {
            let mut delivered = Vec::new();
            while let Ok(d) = block_on(outbox.queue.dequeue()) {
                delivered.push(String::from_utf8(outbox.arena.bytes(&d.block).to_vec()).unwrap());
                outbox.arena.release(d.block);
            }
            delivered
        });

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let outbox = &outbox;
                s.spawn(move || {
                    let mut accepted = 0;
                    for i in 0..PER_PRODUCER {
                        // Vary the size so allocations span one to three units.
                        let payload = format!("{p}:{i}:{}", "x".repeat(i % 150));
                        match outbox.publish(Topic::Telemetry, QoS::AtMostOnce, payload.as_bytes()) {
                            Ok(()) => accepted += 1,
                            Err(e) => assert!(matches!(e, PublishError::QueueFull | PublishError::OutOfMemory)),
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = producers.into_iter().map(|h| h.join().unwrap()).sum();

        assert!(wait_until(|| outbox.queue.is_empty()));
        outbox.queue.close();
        (accepted, consumer.join().unwrap())
    });

    assert!(accepted > 0);
    assert_eq!(delivered.len(), accepted);
    let unique: HashSet<&String> = delivered.iter().collect();
    assert_eq!(unique.len(), delivered.len(), "a payload was delivered twice");

    // Each producer's payloads arrive in the order it published them.
    for p in 0..PRODUCERS {
        let order: Vec<usize> = delivered
            .iter()
            .filter_map(|d| {
                let (producer, rest) = d.split_once(':')?;
                if producer != p.to_string() {
                    return None;
                }
                rest.split(':').next()?.parse().ok()
            })
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(outbox.arena.used_units(), 0);
}
