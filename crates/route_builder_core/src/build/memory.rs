//! In-process broker.
//!
//! # Responsibility
//! - Implement [`BrokerTransport`] over shared in-memory queues.
//! - Expose the worker side (`receive_request`, `send_reply`) so a build
//!   worker can run on another thread.
//! - Count open reply channels and inject provisioning/publish faults.
//!
//! # Invariants
//! - A reply channel holds messages only while it exists; replies sent to a
//!   missing channel are dropped and counted, never delivered later.
//! - Reply channel names are exclusive.
//! - A work queue exists only while it holds undelivered requests.

use crate::build::transport::{
    BrokerTransport, InboundMessage, OutboundMessage, ReplyChannel, TransportError,
};
use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct BrokerState {
    queues: BTreeMap<String, VecDeque<OutboundMessage>>,
    channels: BTreeMap<String, VecDeque<InboundMessage>>,
    fail_next_provision: Option<String>,
    fail_next_publish: Option<String>,
    dropped_replies: usize,
    provisioned_total: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    signal: Condvar,
}

/// Cloneable handle to one in-memory broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `provision_reply_channel` call fail.
    pub fn fail_next_provision(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        self.lock()?.fail_next_provision = Some(reason.into());
        Ok(())
    }

    /// Makes the next `publish` call fail.
    pub fn fail_next_publish(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        self.lock()?.fail_next_publish = Some(reason.into());
        Ok(())
    }

    /// Worker side: takes the oldest request from `queue`, waiting up to
    /// `timeout`.
    pub fn receive_request(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<OutboundMessage>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if let Some(pending) = state.queues.get_mut(queue) {
                let message = pending.pop_front();
                if pending.is_empty() {
                    state.queues.remove(queue);
                }
                if let Some(message) = message {
                    return Ok(Some(message));
                }
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };
            state = self.wait(state, remaining)?;
        }
    }

    /// Worker side: answers on `reply_to`. Returns `false` when the channel
    /// no longer exists and the reply was dropped.
    pub fn send_reply(
        &self,
        reply_to: &str,
        correlation_id: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<bool, TransportError> {
        let mut state = self.lock()?;
        let Some(channel) = state.channels.get_mut(reply_to) else {
            state.dropped_replies += 1;
            debug!("event=broker_reply module=build status=dropped channel={reply_to}");
            return Ok(false);
        };
        channel.push_back(InboundMessage {
            correlation_id: Some(correlation_id.to_string()),
            body: body.into(),
        });
        drop(state);
        self.shared.signal.notify_all();
        Ok(true)
    }

    /// Reply channels currently provisioned and not torn down.
    pub fn open_reply_channels(&self) -> Result<usize, TransportError> {
        Ok(self.lock()?.channels.len())
    }

    pub fn provisioned_total(&self) -> Result<usize, TransportError> {
        Ok(self.lock()?.provisioned_total)
    }

    /// Replies that arrived for a missing channel.
    pub fn dropped_replies(&self) -> Result<usize, TransportError> {
        Ok(self.lock()?.dropped_replies)
    }

    /// Requests waiting on `queue`.
    pub fn pending_requests(&self, queue: &str) -> Result<usize, TransportError> {
        Ok(self.lock()?.queues.get(queue).map_or(0, VecDeque::len))
    }

    /// Number of routing keys with undelivered requests.
    pub fn open_queues(&self) -> Result<usize, TransportError> {
        Ok(self.lock()?.queues.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, TransportError> {
        self.shared
            .state
            .lock()
            .map_err(|_| TransportError::Unavailable("broker state poisoned".to_string()))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, BrokerState>,
        timeout: Duration,
    ) -> Result<MutexGuard<'a, BrokerState>, TransportError> {
        self.shared
            .signal
            .wait_timeout(guard, timeout)
            .map(|(guard, _)| guard)
            .map_err(|_| TransportError::Unavailable("broker state poisoned".to_string()))
    }
}

impl BrokerTransport for InMemoryBroker {
    fn provision_reply_channel(&self, name: &str) -> Result<ReplyChannel, TransportError> {
        let mut state = self.lock()?;
        if let Some(reason) = state.fail_next_provision.take() {
            return Err(TransportError::Unavailable(reason));
        }
        if state.channels.contains_key(name) {
            return Err(TransportError::Rejected(format!(
                "reply channel `{name}` already exists"
            )));
        }
        state.channels.insert(name.to_string(), VecDeque::new());
        state.provisioned_total += 1;
        Ok(ReplyChannel {
            name: name.to_string(),
        })
    }

    fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if let Some(reason) = state.fail_next_publish.take() {
            return Err(TransportError::Rejected(reason));
        }
        state
            .queues
            .entry(message.routing_key.clone())
            .or_default()
            .push_back(message.clone());
        drop(state);
        self.shared.signal.notify_all();
        Ok(())
    }

    fn await_one_message(
        &self,
        channel: &ReplyChannel,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            let Some(queue) = state.channels.get_mut(&channel.name) else {
                return Err(TransportError::ChannelGone(channel.name.clone()));
            };
            if let Some(message) = queue.pop_front() {
                return Ok(Some(message));
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };
            state = self.wait(state, remaining)?;
        }
    }

    fn teardown_channel(&self, channel: &ReplyChannel) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if let Some(pending) = state.channels.remove(&channel.name) {
            state.dropped_replies += pending.len();
        }
        Ok(())
    }
}
