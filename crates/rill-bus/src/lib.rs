// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory publish/subscribe keyed by channel identifier.
//!
//! Subscribers register a bounded delivery sink; publish fans out to a
//! snapshot of the current subscriber set for the channel. There is no
//! backlog and no replay: an event published before `subscribe` or after
//! `unsubscribe` is simply never seen. Publishing to a channel with no
//! subscribers is a silent no-op.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rill_core::{ChannelId, Event};

/// Default buffered events per subscriber sink.
const DEFAULT_SINK_BUFFER: usize = 64;

#[derive(Clone)]
struct Sink {
    id: u64,
    tx: mpsc::Sender<Event>,
}

/// Handle plus receiver returned by [`EventBus::subscribe`].
///
/// Dropping the receiver without unsubscribing is tolerated: the dead sink
/// is skipped and pruned on the next publish to its channel.
pub struct Subscription {
    pub channel: ChannelId,
    pub receiver: mpsc::Receiver<Event>,
    id: u64,
}

impl Subscription {
    /// Opaque sink id, stable for the lifetime of the subscription.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// In-memory event bus.
///
/// The channel->subscribers map is the only shared mutable state; `dashmap`
/// serializes mutations while `publish` operates on a cloned snapshot so no
/// lock is held during delivery.
pub struct EventBus {
    subscribers: DashMap<ChannelId, Vec<Sink>>,
    next_id: AtomicU64,
    sink_buffer: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_sink_buffer(DEFAULT_SINK_BUFFER)
    }

    pub fn with_sink_buffer(sink_buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            sink_buffer: sink_buffer.max(1),
        }
    }

    /// Register a delivery sink for `channel`.
    ///
    /// The channel comes into existence with its first subscriber; no
    /// declaration step exists.
    pub fn subscribe(&self, channel: ChannelId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.sink_buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(channel.clone())
            .or_default()
            .push(Sink { id, tx });
        debug!(channel = %channel, sink = id, "bus subscriber added");
        Subscription {
            channel,
            receiver: rx,
            id,
        }
    }

    /// Remove the given sink. The channel entry is dropped with its last
    /// subscriber.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut remove_channel = false;
        if let Some(mut sinks) = self.subscribers.get_mut(&subscription.channel) {
            sinks.retain(|s| s.id != subscription.id);
            remove_channel = sinks.is_empty();
        }
        if remove_channel {
            self.subscribers
                .remove_if(&subscription.channel, |_, sinks| sinks.is_empty());
        }
        debug!(channel = %subscription.channel, sink = subscription.id, "bus subscriber removed");
    }

    /// Fan `event` out to every sink currently subscribed to `channel`.
    ///
    /// Delivery per sink is a bounded attempt: a full or closed sink is
    /// logged and skipped so one slow consumer never blocks the publisher.
    /// Returns the number of sinks that accepted the event.
    pub fn publish(&self, channel: &ChannelId, event: Event) -> usize {
        // Snapshot, so delivery happens without holding the map entry.
        let snapshot: Vec<Sink> = match self.subscribers.get(channel) {
            Some(sinks) => sinks.clone(),
            None => return 0, // no subscribers: silent no-op
        };

        let mut delivered = 0;
        let mut dead: Vec<u64> = Vec::new();
        for sink in &snapshot {
            match sink.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel = %channel, sink = sink.id, "bus sink full, event skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(channel = %channel, sink = sink.id, "bus sink closed, pruning");
                    dead.push(sink.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut remove_channel = false;
            if let Some(mut sinks) = self.subscribers.get_mut(channel) {
                sinks.retain(|s| !dead.contains(&s.id));
                remove_channel = sinks.is_empty();
            }
            if remove_channel {
                self.subscribers.remove_if(channel, |_, sinks| sinks.is_empty());
            }
        }

        delivered
    }

    /// Number of sinks currently registered for `channel`.
    pub fn subscriber_count(&self, channel: &ChannelId) -> usize {
        self.subscribers.get(channel).map_or(0, |s| s.len())
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.subscribers.len()
    }
}
