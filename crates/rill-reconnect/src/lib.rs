// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnection backoff policy for streaming clients.
//!
//! A pure state machine over discrete inputs: open success, transport
//! error, network offline/online transitions, and manual retry. The caller
//! owns timers and transport; the policy only answers "when, if ever,
//! should the next attempt happen". Backoff grows linearly: attempt N
//! waits `base_delay * N`, capped at `max_delay`, with a hard cap on
//! automatic attempts.

use std::time::Duration;

use strum::Display;
use tracing::debug;

use rill_config::ReconnectConfig;

/// Observable connection state from the policy's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Open,
    Error,
}

/// What the caller should do next after reporting an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Schedule the next attempt after this delay.
    After(Duration),
    /// Attempt right now, outside the backoff schedule.
    Immediate,
    /// Do not retry automatically; wait for a manual retry.
    Halt,
}

/// Linear-backoff reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt_count: u32,
    state: LinkState,
    online: bool,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            attempt_count: 0,
            state: LinkState::Disconnected,
            online: true,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// The caller has started a connection attempt.
    pub fn on_attempt_started(&mut self) {
        self.state = LinkState::Connecting;
    }

    /// The transport opened successfully; backoff starts over.
    pub fn on_open(&mut self) {
        self.state = LinkState::Open;
        self.attempt_count = 0;
        debug!("link open, backoff reset");
    }

    /// The transport failed (failed open or an established stream dropped).
    ///
    /// Returns the scheduling decision: a delay while under the attempt
    /// cap, `Halt` once the cap is reached.
    pub fn on_transport_error(&mut self) -> Retry {
        self.state = LinkState::Error;
        if self.attempt_count >= self.max_attempts {
            debug!(attempts = self.attempt_count, "attempt cap reached, halting automatic retries");
            return Retry::Halt;
        }
        self.attempt_count += 1;
        let delay = self.delay_for(self.attempt_count);
        debug!(attempt = self.attempt_count, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        Retry::After(delay)
    }

    /// The network went away. Remembered so the matching online transition
    /// can be recognized.
    pub fn on_offline(&mut self) {
        self.online = false;
    }

    /// The network came back. An errored link gets one immediate attempt
    /// outside the backoff schedule; any other state just notes the change.
    pub fn on_online(&mut self) -> Option<Retry> {
        let was_offline = !self.online;
        self.online = true;
        if was_offline && self.state == LinkState::Error {
            debug!("network restored while errored, retrying immediately");
            return Some(Retry::Immediate);
        }
        None
    }

    /// A human asked for a retry. Always honored unless the link is
    /// already open; resets the attempt counter so backoff starts fresh.
    pub fn on_manual_retry(&mut self) -> Option<Retry> {
        if self.state == LinkState::Open {
            return None;
        }
        self.attempt_count = 0;
        self.state = LinkState::Connecting;
        Some(Retry::Immediate)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(&ReconnectConfig {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            max_attempts,
        })
    }

    #[test]
    fn backoff_grows_linearly_to_the_cap_then_halts() {
        let mut policy = policy(6);
        let mut delays = Vec::new();
        for _ in 0..6 {
            match policy.on_transport_error() {
                Retry::After(d) => delays.push(d.as_millis() as u64),
                other => panic!("expected a scheduled retry, got {other:?}"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000, 5000]);

        // Beyond the cap: no automatic attempt, state stays errored.
        assert_eq!(policy.on_transport_error(), Retry::Halt);
        assert_eq!(policy.state(), LinkState::Error);
    }

    #[test]
    fn successful_open_resets_the_counter() {
        let mut policy = policy(6);
        policy.on_transport_error();
        policy.on_transport_error();
        assert_eq!(policy.attempt_count(), 2);

        policy.on_attempt_started();
        policy.on_open();
        assert_eq!(policy.state(), LinkState::Open);
        assert_eq!(policy.attempt_count(), 0);

        // The next failure starts the schedule from the beginning.
        assert_eq!(
            policy.on_transport_error(),
            Retry::After(Duration::from_millis(1000))
        );
    }

    #[test]
    fn online_transition_retries_an_errored_link_immediately() {
        let mut policy = policy(6);
        policy.on_transport_error();
        policy.on_offline();
        assert_eq!(policy.on_online(), Some(Retry::Immediate));
    }

    #[test]
    fn online_transition_is_ignored_unless_errored() {
        let mut policy = policy(6);
        policy.on_attempt_started();
        policy.on_open();
        policy.on_offline();
        assert_eq!(policy.on_online(), None);

        // Already online: a repeated online signal is not a transition.
        let mut errored = self::policy(6);
        errored.on_transport_error();
        assert_eq!(errored.on_online(), None);
    }

    #[test]
    fn manual_retry_recovers_a_halted_link() {
        let mut policy = policy(1);
        assert!(matches!(policy.on_transport_error(), Retry::After(_)));
        assert_eq!(policy.on_transport_error(), Retry::Halt);

        assert_eq!(policy.on_manual_retry(), Some(Retry::Immediate));
        assert_eq!(policy.state(), LinkState::Connecting);
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn manual_retry_is_refused_while_open() {
        let mut policy = policy(6);
        policy.on_open();
        assert_eq!(policy.on_manual_retry(), None);
    }
}
