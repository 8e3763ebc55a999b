//! Broker session state machine.
//!
//! A function-pointer FSM engine drives the connection lifecycle:
//!
//! ```text
//! ┌──────────────────────┬───────────┬──────────┬───────────────────┐
//! │ SessionState         │ on_enter  │ on_exit  │ on_update         │
//! ├──────────────────────┼───────────┼──────────┼───────────────────┤
//! │ Disconnected         │           │          │ fn(ctx)->Option<> │
//! │ TransportConnecting  │ fn(ctx)   │          │ fn(ctx)->Option<> │
//! │ SessionConnecting    │ fn(ctx)   │          │ fn(ctx)->Option<> │
//! │ SubscriptionPending  │           │          │ fn(ctx)->Option<> │
//! │ Connected            │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │
//! │ Disconnecting        │ fn(ctx)   │          │ fn(ctx)->Option<> │
//! │ Terminated           │ fn(ctx)   │          │ fn(ctx)->Option<> │
//! └──────────────────────┴───────────┴──────────┴───────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the current state. If it
//! returns `Some(next)`, the engine runs `on_exit` for the current state,
//! then `on_enter` for the next. Handlers receive the
//! [`SessionContext`](context::SessionContext), which owns the transport,
//! delay provider and output bank and borrows the shared outbox and link.
//!
//! `Terminated` is absorbing: the engine refuses every transition out of it.

pub mod context;
pub mod states;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::OutputPort;
use crate::pubsub::transport::MqttTransport;
use context::SessionContext;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    TransportConnecting = 1,
    SessionConnecting = 2,
    SubscriptionPending = 3,
    Connected = 4,
    Disconnecting = 5,
    Terminated = 6,
}

impl SessionState {
    pub const COUNT: usize = 7;

    /// Convert a table index back to a state. Out-of-range indices map to
    /// `Terminated`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Disconnected,
            1 => Self::TransportConnecting,
            2 => Self::SessionConnecting,
            3 => Self::SubscriptionPending,
            4 => Self::Connected,
            5 => Self::Disconnecting,
            _ => {
                debug_assert!(idx == 6, "invalid state index: {idx}");
                Self::Terminated
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit` action; runs once per transition.
pub type StateActionFn<C> = fn(&mut C);

/// Per-tick handler. `Some(next)` requests a transition.
pub type StateUpdateFn<C> = fn(&mut C) -> Option<SessionState>;

/// One row of the state table.
pub struct StateDescriptor<C> {
    pub id: SessionState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<C>>,
    pub on_exit: Option<StateActionFn<C>>,
    pub on_update: StateUpdateFn<C>,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm<C> {
    /// Indexed by `SessionState as usize`.
    table: [StateDescriptor<C>; SessionState::COUNT],
    current: usize,
}

impl<C> Fsm<C> {
    pub fn new(table: [StateDescriptor<C>; SessionState::COUNT], initial: SessionState) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial state's `on_enter`. Call once before the first tick.
    pub fn start(&mut self, ctx: &mut C) {
        info!("session: starting in {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Call `on_update` for the current state and apply any transition.
    pub fn tick(&mut self, ctx: &mut C) {
        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Jump to `next` regardless of what the current state wants.
    pub fn force_transition(&mut self, next: SessionState, ctx: &mut C) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> SessionState {
        SessionState::from_index(self.current)
    }

    fn transition(&mut self, next: SessionState, ctx: &mut C) {
        let next_idx = next as usize;
        if self.current == SessionState::Terminated as usize {
            warn!("session: ignoring transition to {} after termination", self.table[next_idx].name);
            return;
        }

        info!(
            "session: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Session runner
// ---------------------------------------------------------------------------

/// The FSM bound to its session context.
pub struct SessionMachine<'a, T, D, O> {
    fsm: Fsm<SessionContext<'a, T, D, O>>,
    ctx: SessionContext<'a, T, D, O>,
    started: bool,
}

impl<'a, T, D, O> SessionMachine<'a, T, D, O>
where
    T: MqttTransport,
    D: DelayNs,
    O: OutputPort,
{
    pub fn new(ctx: SessionContext<'a, T, D, O>) -> Self {
        Self {
            fsm: Fsm::new(states::build_state_table(), SessionState::Disconnected),
            ctx,
            started: false,
        }
    }

    /// Run one tick and report the resulting state. In `Connected` a tick
    /// blocks until there is something to transmit or dispatch.
    pub fn step(&mut self) -> SessionState {
        if !self.started {
            self.fsm.start(&mut self.ctx);
            self.started = true;
        }
        self.fsm.tick(&mut self.ctx);
        self.fsm.current_state()
    }

    /// Tick until the session terminates.
    pub fn run(&mut self) {
        while self.step() != SessionState::Terminated {}
    }

    pub fn state(&self) -> SessionState {
        self.fsm.current_state()
    }

    pub fn context(&self) -> &SessionContext<'a, T, D, O> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SessionContext<'a, T, D, O> {
        &mut self.ctx
    }

    /// Jump straight to `state`, running the usual exit/enter actions.
    pub fn force(&mut self, state: SessionState) {
        if !self.started {
            self.fsm.start(&mut self.ctx);
            self.started = true;
        }
        self.fsm.force_transition(state, &mut self.ctx);
    }

    pub fn into_context(self) -> SessionContext<'a, T, D, O> {
        self.ctx
    }
}
