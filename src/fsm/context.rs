//! Mutable context threaded through every session handler.
//!
//! Owns the pieces only the session loop touches (transport, delay
//! provider, output bank for remote commands, retry budget) and borrows the
//! state it shares with other contexts (outbox, link).

use crate::config::AgentConfig;
use crate::pubsub::link::SessionLink;
use crate::pubsub::outbox::Outbox;

// ---------------------------------------------------------------------------
// Retry budget
// ---------------------------------------------------------------------------

/// Failed-attempt counter for one connection phase. Reset on entering the
/// phase; exhausted once failures reach the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    ceiling: u16,
    failures: u16,
}

impl RetryBudget {
    pub const fn new(ceiling: u16) -> Self {
        Self { ceiling, failures: 0 }
    }

    /// Record a failed attempt. Returns `true` when no attempts remain.
    pub fn fail(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.ceiling
    }

    pub fn failures(&self) -> u16 {
        self.failures
    }

    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }

    /// 1-based number of the attempt about to be made.
    pub fn next_attempt(&self) -> u16 {
        self.failures.saturating_add(1)
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub published: u32,
    pub transmit_failures: u32,
    pub commands_handled: u32,
    pub commands_rejected: u32,
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

pub struct SessionContext<'a, T, D, O> {
    pub transport: T,
    pub delay: D,
    /// Output bank remote commands act on.
    pub outputs: O,

    pub link: &'a SessionLink,
    pub outbox: &'a Outbox,

    pub config: AgentConfig,
    /// Presented as the MQTT username at session establishment.
    pub credential: &'a str,

    pub budget: RetryBudget,
    pub stats: SessionStats,
}

impl<'a, T, D, O> SessionContext<'a, T, D, O> {
    pub fn new(
        transport: T,
        delay: D,
        outputs: O,
        link: &'a SessionLink,
        outbox: &'a Outbox,
        config: AgentConfig,
        credential: &'a str,
    ) -> Self {
        Self {
            transport,
            delay,
            outputs,
            link,
            outbox,
            config,
            credential,
            budget: RetryBudget::new(0),
            stats: SessionStats::default(),
        }
    }
}
