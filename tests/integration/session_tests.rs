//! Connection lifecycle and remote commands through the session loop.

use std::thread;

use smartlight::app::ports::SharedOutputs;
use smartlight::config::{AgentConfig, RPC_REQUEST_TOPIC};
use smartlight::fsm::context::SessionContext;
use smartlight::fsm::{SessionMachine, SessionState};
use smartlight::pubsub::link::SessionLink;
use smartlight::pubsub::outbox::Outbox;
use smartlight::pubsub::transport::PacketType;

use crate::mock_hw::{Call, MockDelay, MockOutputs, MockTransport, fast_config, leak, wait_until};

const CREDENTIAL: &str = "DE:AD:BE:EF:CA:FE";

type Lights = &'static SharedOutputs<MockOutputs>;
type Context = SessionContext<'static, MockTransport, MockDelay, Lights>;

struct Rig {
    outbox: &'static Outbox,
    link: &'static SessionLink,
    lights: Lights,
}

impl Rig {
    fn new() -> Self {
        Self {
            outbox: leak(Outbox::new()),
            link: leak(SessionLink::new()),
            lights: leak(SharedOutputs::new(MockOutputs::default())),
        }
    }

    fn machine(&self, transport: MockTransport, config: AgentConfig) -> SessionMachine<'static, MockTransport, MockDelay, Lights> {
        SessionMachine::new(SessionContext::new(
            transport,
            MockDelay::default(),
            self.lights,
            self.link,
            self.outbox,
            config,
            CREDENTIAL,
        ))
    }

    /// Run a session on its own thread until it terminates.
    fn spawn(&self, config: AgentConfig) -> thread::JoinHandle<(SessionState, Context)> {
        let mut machine = self.machine(MockTransport::new(self.link), config);
        thread::spawn(move || {
            machine.run();
            (machine.state(), machine.into_context())
        })
    }

    fn command(&self, request_id: u32, json: &str) {
        let topic = format!("v1/devices/me/rpc/request/{request_id}");
        self.link
            .on_publish_received(1, PacketType::Publish, &topic, json.as_bytes())
            .unwrap();
    }

    fn drained(&self) -> bool {
        self.outbox.queue.is_empty() && self.outbox.arena.used_units() == 0
    }
}

#[test]
fn transport_recovers_on_the_hundredth_attempt() {
    let rig = Rig::new();
    let mut transport = MockTransport::new(rig.link);
    transport.connect_failures = 99;
    let mut machine = rig.machine(transport, AgentConfig::default());

    while machine.step() != SessionState::Connected {}

    let ctx = machine.context();
    assert_eq!(ctx.transport.count(|c| *c == Call::Connect), 100);
    // Backoff after every fifth failure: 5, 10, ... 95.
    let backoffs = ctx.delay.slept_ms.iter().filter(|&&ms| ms == 1_500).count();
    assert_eq!(backoffs, 19);
    assert_eq!(
        ctx.transport.calls[100..],
        [
            Call::Session { credential: CREDENTIAL.to_string() },
            Call::Subscribe { topic: RPC_REQUEST_TOPIC.to_string() },
        ]
    );
}

#[test]
fn hundred_failed_connects_terminate_for_good() {
    let rig = Rig::new();
    let mut transport = MockTransport::new(rig.link);
    transport.connect_failures = 100;
    let mut machine = rig.machine(transport, AgentConfig::default());

    machine.run();
    assert_eq!(machine.state(), SessionState::Terminated);

    // Terminated is absorbing: further steps do nothing.
    for _ in 0..10 {
        assert_eq!(machine.step(), SessionState::Terminated);
    }
    let ctx = machine.context();
    assert_eq!(ctx.transport.calls.len(), 100);
    assert!(ctx.transport.calls.iter().all(|c| *c == Call::Connect));
    assert!(rig.outbox.queue.is_closed());
}

#[test]
fn rejected_session_gives_up_after_the_ceiling() {
    let rig = Rig::new();
    let mut transport = MockTransport::new(rig.link);
    transport.accept_session = false;
    let mut machine = rig.machine(transport, fast_config());

    machine.run();
    let ctx = machine.context();
    assert_eq!(ctx.transport.count(|c| matches!(c, Call::Session { .. })), 20);
    assert_eq!(ctx.transport.calls.last(), Some(&Call::Close));
    assert!(!rig.link.is_established());
}

#[test]
fn set_output_command_drives_exactly_one_output() {
    let rig = Rig::new();
    let session = rig.spawn(fast_config());
    assert!(wait_until(|| rig.link.is_established()));

    rig.command(1, r#"{"method":"set-output","params":{"ledno":2,"value":true}}"#);
    assert!(wait_until(|| rig.lights.with(|o| o.levels[2])));

    rig.outbox.queue.close();
    let (state, ctx) = session.join().unwrap();
    assert_eq!(state, SessionState::Terminated);
    assert_eq!(rig.lights.with(|o| o.writes.clone()), vec![(2, true)]);
    assert_eq!(ctx.stats.commands_handled, 1);
    assert!(ctx.transport.published().is_empty());
}

#[test]
fn get_output_replies_on_the_response_topic() {
    let rig = Rig::new();
    rig.lights.with(|o| o.levels[1] = true);
    let session = rig.spawn(fast_config());
    assert!(wait_until(|| rig.link.is_established()));

    rig.command(42, r#"{"method":"get-output","params":{"ledno":1}}"#);
    // Commands are handled in order, so this marks the first as done.
    rig.command(43, r#"{"method":"set-output","params":{"ledno":3,"value":true}}"#);
    assert!(wait_until(|| rig.lights.with(|o| o.levels[3])));
    assert!(wait_until(|| rig.drained()));

    rig.outbox.queue.close();
    let (_, ctx) = session.join().unwrap();
    assert_eq!(
        ctx.transport.published(),
        vec![("v1/devices/me/rpc/response/42".to_string(), r#"{"ledno":1,"value":true}"#.to_string())]
    );
}

#[test]
fn malformed_and_unknown_commands_change_nothing() {
    let rig = Rig::new();
    let session = rig.spawn(fast_config());
    assert!(wait_until(|| rig.link.is_established()));

    rig.command(1, r#"{"method":"reboot","params":{}}"#);
    rig.command(2, r#"{"method":"set-output","params":{"ledno":9,"value":true}}"#);
    rig.command(3, r#"{"method":"set-output","params":{"ledno":"two"}}"#);
    rig.command(4, r#"{"method":"set-output","params":{"ledno":0,"value":true}}"#);
    assert!(wait_until(|| rig.lights.with(|o| o.levels[0])));

    rig.outbox.queue.close();
    let (_, ctx) = session.join().unwrap();
    assert_eq!(rig.lights.with(|o| o.writes.clone()), vec![(0, true)]);
    assert_eq!(ctx.stats.commands_handled, 1);
    assert_eq!(ctx.stats.commands_rejected, 3);
}

#[test]
fn broker_drop_disconnects_and_closes() {
    let rig = Rig::new();
    let session = rig.spawn(fast_config());
    assert!(wait_until(|| rig.link.is_established()));

    rig.link.on_disconnect();
    let (state, ctx) = session.join().unwrap();

    assert_eq!(state, SessionState::Terminated);
    let tail = &ctx.transport.calls[ctx.transport.calls.len() - 2..];
    assert_eq!(tail, [Call::Disconnect, Call::Close]);
    assert_eq!(ctx.delay.slept_ms.last(), Some(&1));
    assert!(rig.outbox.queue.is_closed());
}
