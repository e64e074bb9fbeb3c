//! Per-connection table matching responses to waiting callers.

use crate::tool_server::protocol::RpcErrorObject;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// What a server sent back for one request.
pub type CallOutcome = Result<Value, RpcErrorObject>;

/// Why a correlated request did not receive a reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// The deadline expired before a reply arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was torn down while the request was pending.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Too many requests were already outstanding.
    #[error("too many pending requests (limit {0})")]
    Saturated(usize),
}

type Resolution = Result<CallOutcome, CorrelationError>;

struct PendingEntry {
    issued_at: Instant,
    deadline: Instant,
    timeout: Duration,
    sender: oneshot::Sender<Resolution>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<u64, PendingEntry>,
    closed: Option<String>,
}

struct Inner {
    next_id: AtomicU64,
    table: Mutex<Table>,
    default_timeout: Duration,
    max_pending: usize,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Assigns correlation ids and routes replies to their callers.
///
/// Ids are unique per correlator and increase monotonically from 1. Every
/// entry leaves the table exactly once: on reply, on timeout, on sweep, on
/// [`RequestCorrelator::fail_all`], or when its [`PendingCall`] is dropped.
#[derive(Clone)]
pub struct RequestCorrelator {
    inner: Arc<Inner>,
}

impl RequestCorrelator {
    /// Creates a correlator with the given default deadline and capacity.
    #[must_use]
    pub fn new(default_timeout: Duration, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                table: Mutex::new(Table::default()),
                default_timeout,
                max_pending,
            }),
        }
    }

    /// Reserves a correlation id for an outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::ConnectionLost`] once the correlator has
    /// been failed, or [`CorrelationError::Saturated`] at capacity.
    pub fn register(&self, timeout: Option<Duration>) -> Result<PendingCall, CorrelationError> {
        let effective = timeout.unwrap_or(self.inner.default_timeout);
        let (sender, receiver) = oneshot::channel();
        let mut table = self.inner.table();
        if let Some(reason) = &table.closed {
            return Err(CorrelationError::ConnectionLost(reason.clone()));
        }
        if table.entries.len() >= self.inner.max_pending {
            return Err(CorrelationError::Saturated(self.inner.max_pending));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let issued_at = Instant::now();
        let deadline = issued_at + effective;
        table.entries.insert(
            id,
            PendingEntry {
                issued_at,
                deadline,
                timeout: effective,
                sender,
            },
        );
        Ok(PendingCall {
            id,
            deadline,
            timeout: effective,
            receiver,
            early: None,
            correlator: Arc::clone(&self.inner),
        })
    }

    /// Delivers a reply. Returns `false` when no caller waits on `id`, which
    /// means the reply is late or was never requested.
    pub fn complete(&self, id: u64, outcome: CallOutcome) -> bool {
        let entry = self.inner.table().entries.remove(&id);
        let Some(pending) = entry else {
            return false;
        };
        debug!(
            correlation_id = id,
            elapsed_ms = pending.issued_at.elapsed().as_millis(),
            "response matched"
        );
        // A send failure means the waiter gave up in the same instant.
        pending.sender.send(Ok(outcome)).is_ok()
    }

    /// Fails every pending request with `ConnectionLost` and rejects all
    /// future registrations. Returns the number of requests failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut table = self.inner.table();
            if table.closed.is_none() {
                table.closed = Some(reason.to_owned());
            }
            table.entries.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            // Waiters that already gave up no longer hold a receiver.
            drop(
                entry
                    .sender
                    .send(Err(CorrelationError::ConnectionLost(reason.to_owned()))),
            );
        }
        count
    }

    /// Times out every entry whose deadline has passed. Returns the number
    /// of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<PendingEntry> = {
            let mut table = self.inner.table();
            let ids: Vec<u64> = table
                .entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| table.entries.remove(id))
                .collect()
        };
        let count = expired.len();
        for entry in expired {
            drop(entry.sender.send(Err(CorrelationError::Timeout(entry.timeout))));
        }
        count
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.table().entries.len()
    }

    /// Returns whether [`RequestCorrelator::fail_all`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.table().closed.is_some()
    }

    /// Returns the default per-call deadline.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestCorrelator")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// A reserved correlation id and the caller's end of its reply channel.
///
/// Dropping the guard removes the entry, so abandoned calls never linger.
pub struct PendingCall {
    id: u64,
    deadline: Instant,
    timeout: Duration,
    receiver: oneshot::Receiver<Resolution>,
    early: Option<CallOutcome>,
    correlator: Arc<Inner>,
}

impl PendingCall {
    /// Returns the reserved correlation id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the reply, the deadline, or connection loss.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Timeout`] when the deadline passes and
    /// [`CorrelationError::ConnectionLost`] when the connection is torn down.
    pub async fn wait(mut self) -> Result<CallOutcome, CorrelationError> {
        if let Some(outcome) = self.early.take() {
            return Ok(outcome);
        }
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(resolution) => flatten(resolution),
            Err(_) => Err(CorrelationError::Timeout(self.timeout)),
        }
    }

    /// Runs `work`, typically the outbound write, under this call's deadline.
    ///
    /// A reply that lands while `work` is still running is kept for
    /// [`PendingCall::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Timeout`] when the deadline passes first
    /// and [`CorrelationError::ConnectionLost`] when the connection is torn
    /// down meanwhile. `work` is dropped in both cases.
    pub async fn within<F>(&mut self, work: F) -> Result<F::Output, CorrelationError>
    where
        F: Future,
    {
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return Ok(output),
                resolution = &mut self.receiver, if self.early.is_none() => {
                    self.early = Some(flatten(resolution)?);
                }
                () = tokio::time::sleep_until(self.deadline) => {
                    return Err(CorrelationError::Timeout(self.timeout));
                }
            }
        }
    }
}

fn flatten(
    resolution: Result<Resolution, oneshot::error::RecvError>,
) -> Result<CallOutcome, CorrelationError> {
    resolution.unwrap_or_else(|_| {
        Err(CorrelationError::ConnectionLost(
            "correlator dropped".to_owned(),
        ))
    })
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.correlator.table().entries.remove(&self.id);
    }
}
