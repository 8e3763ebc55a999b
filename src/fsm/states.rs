//! Session state handlers and table builder.
//!
//! ```text
//!  DISCONNECTED ──▶ TRANSPORT_CONNECTING ──[ok]──▶ SESSION_CONNECTING
//!                        │ [100 failures]              │ [CONNACK]   │ [20 failures]
//!                        ▼                             ▼             ▼
//!                    TERMINATED ◀── close ◀────── SUBSCRIPTION_PENDING
//!                        ▲                             │ (SUBSCRIBE sent)
//!                        │                             ▼
//!                  DISCONNECTING ◀─[queue closed / severed]─ CONNECTED
//! ```

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use futures_lite::future;
use log::{debug, error, info, warn};

use super::context::{RetryBudget, SessionContext};
use super::{SessionState, StateDescriptor};
use crate::adapters::entropy;
use crate::app::ports::OutputPort;
use crate::config::RPC_REQUEST_TOPIC;
use crate::pubsub::dispatch::{self, CommandContext};
use crate::pubsub::link::{InboundCommand, SessionLink};
use crate::pubsub::outbox::Outbox;
use crate::pubsub::queue::{PublishDescriptor, QoS};
use crate::pubsub::transport::{MqttTransport, OutboundMessage};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table<'a, T, D, O>() -> [StateDescriptor<SessionContext<'a, T, D, O>>; SessionState::COUNT]
where
    T: MqttTransport,
    D: DelayNs,
    O: OutputPort,
{
    [
        StateDescriptor {
            id: SessionState::Disconnected,
            name: "Disconnected",
            on_enter: None,
            on_exit: None,
            on_update: disconnected_update,
        },
        StateDescriptor {
            id: SessionState::TransportConnecting,
            name: "TransportConnecting",
            on_enter: Some(transport_connecting_enter),
            on_exit: None,
            on_update: transport_connecting_update,
        },
        StateDescriptor {
            id: SessionState::SessionConnecting,
            name: "SessionConnecting",
            on_enter: Some(session_connecting_enter),
            on_exit: None,
            on_update: session_connecting_update,
        },
        StateDescriptor {
            id: SessionState::SubscriptionPending,
            name: "SubscriptionPending",
            on_enter: None,
            on_exit: None,
            on_update: subscription_pending_update,
        },
        StateDescriptor {
            id: SessionState::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: Some(connected_exit),
            on_update: connected_update,
        },
        StateDescriptor {
            id: SessionState::Disconnecting,
            name: "Disconnecting",
            on_enter: Some(disconnecting_enter),
            on_exit: None,
            on_update: disconnecting_update,
        },
        StateDescriptor {
            id: SessionState::Terminated,
            name: "Terminated",
            on_enter: Some(terminated_enter),
            on_exit: None,
            on_update: terminated_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_update<T, D, O>(_ctx: &mut SessionContext<'_, T, D, O>) -> Option<SessionState> {
    Some(SessionState::TransportConnecting)
}

// ═══════════════════════════════════════════════════════════════════════════
//  TRANSPORT_CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn transport_connecting_enter<T, D, O>(ctx: &mut SessionContext<'_, T, D, O>) {
    ctx.budget = RetryBudget::new(ctx.config.transport_connect.attempts);
    info!(
        "session: connecting to {}:{}",
        ctx.config.broker_addr, ctx.config.broker_port
    );
}

fn transport_connecting_update<T: MqttTransport, D: DelayNs, O>(
    ctx: &mut SessionContext<'_, T, D, O>,
) -> Option<SessionState> {
    let policy = ctx.config.transport_connect;
    let attempt = ctx.budget.next_attempt();

    match ctx.transport.connect() {
        Ok(()) => {
            info!("session: transport open after {attempt} attempt(s)");
            return Some(SessionState::SessionConnecting);
        }
        Err(e) => warn!("session: connect attempt {attempt}/{} failed: {e:?}", policy.attempts),
    }

    if ctx.budget.fail() {
        error!("session: broker unreachable after {} attempts", policy.attempts);
        return Some(SessionState::Terminated);
    }
    if attempt % policy.backoff_every.max(1) == 0 {
        ctx.delay.delay_ms(policy.delay_ms);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SESSION_CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn session_connecting_enter<T, D, O>(ctx: &mut SessionContext<'_, T, D, O>) {
    ctx.budget = RetryBudget::new(ctx.config.session_connect.attempts);
    ctx.link.begin_session();
}

fn session_connecting_update<T: MqttTransport, D: DelayNs, O>(
    ctx: &mut SessionContext<'_, T, D, O>,
) -> Option<SessionState> {
    if ctx.link.confirm_session() {
        return Some(SessionState::SubscriptionPending);
    }

    let policy = ctx.config.session_connect;
    let attempt = ctx.budget.next_attempt();

    match ctx.transport.establish_session(ctx.credential, true) {
        Ok(()) => {
            ctx.delay.delay_ms(policy.delay_ms);
            if ctx.link.confirm_session() {
                info!("session: established on attempt {attempt}");
                return Some(SessionState::SubscriptionPending);
            }
            warn!("session: no CONNACK within {} ms (attempt {attempt}/{})", policy.delay_ms, policy.attempts);
        }
        Err(e) => warn!("session: CONNECT attempt {attempt}/{} not sent: {e:?}", policy.attempts),
    }

    if ctx.budget.fail() {
        error!("session: broker did not accept the session, closing transport");
        if let Err(e) = ctx.transport.close() {
            warn!("session: close failed: {e:?}");
        }
        return Some(SessionState::Terminated);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SUBSCRIPTION_PENDING
// ═══════════════════════════════════════════════════════════════════════════

/// The SUBACK is not awaited; the loop starts serving the queue at once.
fn subscription_pending_update<T: MqttTransport, D, O>(
    ctx: &mut SessionContext<'_, T, D, O>,
) -> Option<SessionState> {
    let packet_id = entropy::packet_id();
    match ctx.transport.subscribe(packet_id, RPC_REQUEST_TOPIC, QoS::AtMostOnce) {
        Ok(()) => info!("session: subscribed to {RPC_REQUEST_TOPIC} (id {packet_id})"),
        Err(e) => warn!("session: subscribe to {RPC_REQUEST_TOPIC} failed: {e:?}"),
    }
    Some(SessionState::Connected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

enum Wake {
    Outbound(PublishDescriptor),
    Inbound(InboundCommand),
    QueueClosed,
    Severed,
}

/// Whichever happens first. A severed link outranks pending work, and a
/// pending command outranks queued telemetry.
async fn next_wake(outbox: &Outbox, link: &SessionLink) -> Wake {
    future::or(
        async {
            link.severed().await;
            Wake::Severed
        },
        future::or(async { Wake::Inbound(link.next_command().await) }, async {
            match outbox.queue.dequeue().await {
                Ok(descriptor) => Wake::Outbound(descriptor),
                Err(_) => Wake::QueueClosed,
            }
        }),
    )
    .await
}

fn connected_enter<T, D, O>(ctx: &mut SessionContext<'_, T, D, O>) {
    info!("session: connected, {} payload(s) waiting", ctx.outbox.queue.len());
}

fn connected_exit<T, D, O>(ctx: &mut SessionContext<'_, T, D, O>) {
    info!(
        "session: leaving connected ({} sent, {} failed, {} commands)",
        ctx.stats.published, ctx.stats.transmit_failures, ctx.stats.commands_handled
    );
}

fn connected_update<T: MqttTransport, D, O: OutputPort>(
    ctx: &mut SessionContext<'_, T, D, O>,
) -> Option<SessionState> {
    match future::block_on(next_wake(ctx.outbox, ctx.link)) {
        Wake::Outbound(descriptor) => {
            transmit(ctx, descriptor);
            None
        }
        Wake::Inbound(command) => {
            handle_command(ctx, &command);
            None
        }
        Wake::QueueClosed => {
            info!("session: publish queue closed");
            Some(SessionState::Disconnecting)
        }
        Wake::Severed => {
            warn!("session: transport severed");
            Some(SessionState::Disconnecting)
        }
    }
}

/// Send one payload and release its block whatever the outcome.
fn transmit<T: MqttTransport, D, O>(ctx: &mut SessionContext<'_, T, D, O>, descriptor: PublishDescriptor) {
    let outbox = ctx.outbox;
    let mut topic = heapless::String::<64>::new();
    let _ = write!(topic, "{}", descriptor.topic);

    let message = OutboundMessage {
        topic: &topic,
        payload: outbox.arena.bytes(&descriptor.block),
        qos: descriptor.qos,
        packet_id: descriptor.packet_id,
    };
    match ctx.transport.publish(&message) {
        Ok(()) => {
            ctx.stats.published += 1;
            debug!("session: sent {} B to {topic} (id {})", message.payload.len(), message.packet_id);
        }
        Err(e) => {
            ctx.stats.transmit_failures += 1;
            warn!("session: publish to {topic} failed: {e:?}");
        }
    }

    outbox.arena.release(descriptor.block);
}

fn handle_command<T, D, O: OutputPort>(ctx: &mut SessionContext<'_, T, D, O>, command: &InboundCommand) {
    let mut command_ctx = CommandContext {
        outputs: &mut ctx.outputs,
        outbox: ctx.outbox,
        request_id: command.request_id,
    };
    match dispatch::dispatch(command, &mut command_ctx) {
        Ok(()) => ctx.stats.commands_handled += 1,
        // Already logged by the dispatcher; unknown methods only at debug.
        Err(_) => ctx.stats.commands_rejected += 1,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn disconnecting_enter<T, D, O>(_ctx: &mut SessionContext<'_, T, D, O>) {
    info!("session: disconnecting from broker");
}

fn disconnecting_update<T: MqttTransport, D: DelayNs, O>(
    ctx: &mut SessionContext<'_, T, D, O>,
) -> Option<SessionState> {
    if let Err(e) = ctx.transport.disconnect() {
        warn!("session: DISCONNECT failed: {e:?}");
    }
    ctx.delay.delay_ms(ctx.config.drain_delay_ms);
    if let Err(e) = ctx.transport.close() {
        warn!("session: close failed: {e:?}");
    }
    Some(SessionState::Terminated)
}

// ═══════════════════════════════════════════════════════════════════════════
//  TERMINATED
// ═══════════════════════════════════════════════════════════════════════════

fn terminated_enter<T, D, O>(ctx: &mut SessionContext<'_, T, D, O>) {
    error!("session: terminated, telemetry halted until restart");
    ctx.outbox.shutdown();
}

fn terminated_update<T, D, O>(_ctx: &mut SessionContext<'_, T, D, O>) -> Option<SessionState> {
    None
}
