//! Correlation of in-flight requests with the events that answer them.
//!
//! Two key shapes share one slot type and one timeout mechanism:
//!
//! - [`PendingKey::Tag`]: an opaque value echoed by the answer (expected
//!   ack code, binary request tag, trace tag).
//! - [`PendingKey::Route`]: the remote identity prefix plus the kind of
//!   request, for answers that carry no tag at all.
//!
//! Each slot resolves exactly once. Completion and removal both happen
//! under the table lock, so whichever of completion, timeout or
//! cancellation gets there first wins and the others are no-ops.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use companion_protocol::{Event, PublicKeyPrefix};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::clock::Clock;
use crate::error::{Result, SessionError};

/// Kind of content-routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Status,
    Telemetry,
    Login,
    PathDiscovery,
}

/// Content-routed correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub prefix: PublicKeyPrefix,
    pub kind: RequestKind,
}

/// Correlation key for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Tag(u32),
    Route(RouteKey),
}

impl PendingKey {
    pub fn route(prefix: PublicKeyPrefix, kind: RequestKind) -> Self {
        PendingKey::Route(RouteKey { prefix, kind })
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingKey::Tag(tag) => write!(f, "tag {:08x}", tag),
            PendingKey::Route(route) => write!(f, "{:?} from {}", route.kind, route.prefix),
        }
    }
}

/// How a pending request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed(Arc<Event>),
    TimedOut,
    Cancelled,
}

impl Resolution {
    pub fn event(&self) -> Option<&Arc<Event>> {
        match self {
            Resolution::Completed(event) => Some(event),
            _ => None,
        }
    }
}

/// Key under which the registry would complete a request answered by
/// `event`, if any.
pub fn correlation(event: &Event) -> Option<PendingKey> {
    match event {
        Event::SendConfirmed { ack_code, .. } => Some(PendingKey::Tag(*ack_code)),
        Event::BinaryResponse { tag, .. } => Some(PendingKey::Tag(*tag)),
        Event::TraceData(trace) => Some(PendingKey::Tag(trace.tag)),
        Event::StatusResponse { prefix, .. } => {
            Some(PendingKey::route(*prefix, RequestKind::Status))
        }
        Event::TelemetryResponse { prefix, .. } => {
            Some(PendingKey::route(*prefix, RequestKind::Telemetry))
        }
        Event::LoginSuccess { prefix, .. } | Event::LoginFail { prefix } => {
            Some(PendingKey::route(*prefix, RequestKind::Login))
        }
        Event::PathDiscoveryResponse { prefix, .. } => {
            Some(PendingKey::route(*prefix, RequestKind::PathDiscovery))
        }
        _ => None,
    }
}

enum Signal {
    Completed(Arc<Event>),
    Cancelled,
}

struct Slot {
    id: u64,
    signal: oneshot::Sender<Signal>,
}

#[derive(Default)]
struct Table {
    slots: HashMap<PendingKey, Slot>,
    next_id: u64,
}

impl Table {
    /// Remove the slot for `key` only if it still belongs to `id`.
    fn remove_owned(&mut self, key: &PendingKey, id: u64) -> Option<Slot> {
        match self.slots.get(key) {
            Some(slot) if slot.id == id => self.slots.remove(key),
            _ => None,
        }
    }
}

/// Concurrency-safe table of pending requests.
#[derive(Clone)]
pub struct PendingRegistry {
    table: Arc<Mutex<Table>>,
    clock: Arc<dyn Clock>,
}

impl PendingRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        PendingRegistry {
            table: Arc::new(Mutex::new(Table::default())),
            clock,
        }
    }

    /// Register a slot for `key`. Fails if a live slot already holds it.
    pub fn register(&self, key: PendingKey, timeout: Duration) -> Result<PendingRequest> {
        let mut table = self.table.lock();
        if let Some(existing) = table.slots.get(&key) {
            if !existing.signal.is_closed() {
                return Err(SessionError::AlreadyPending(key.to_string()));
            }
        }
        let id = table.next_id;
        table.next_id += 1;
        let (signal, rx) = oneshot::channel();
        table.slots.insert(key, Slot { id, signal });
        trace!(%key, ?timeout, "registered pending request");

        Ok(PendingRequest {
            key,
            id,
            timeout,
            rx,
            table: Arc::clone(&self.table),
            clock: Arc::clone(&self.clock),
        })
    }

    pub fn register_tag(&self, tag: u32, timeout: Duration) -> Result<PendingRequest> {
        self.register(PendingKey::Tag(tag), timeout)
    }

    pub fn register_route(
        &self,
        prefix: PublicKeyPrefix,
        kind: RequestKind,
        timeout: Duration,
    ) -> Result<PendingRequest> {
        self.register(PendingKey::route(prefix, kind), timeout)
    }

    /// Resolve the slot for `key` with `event`. Returns false if nothing
    /// was waiting.
    pub fn complete_key(&self, key: PendingKey, event: Arc<Event>) -> bool {
        // Signal before unlocking: a waiter that releases after its deadline
        // must still find the completion in its channel.
        let mut table = self.table.lock();
        match table.slots.remove(&key) {
            Some(slot) => {
                trace!(%key, event = event.name(), "completing pending request");
                slot.signal.send(Signal::Completed(event)).is_ok()
            }
            None => false,
        }
    }

    pub fn complete(&self, tag: u32, event: Arc<Event>) -> bool {
        self.complete_key(PendingKey::Tag(tag), event)
    }

    pub fn complete_by_route(
        &self,
        prefix: PublicKeyPrefix,
        kind: RequestKind,
        event: Arc<Event>,
    ) -> bool {
        self.complete_key(PendingKey::route(prefix, kind), event)
    }

    /// Resolve whichever slot `event` answers, if any.
    pub fn complete_event(&self, event: &Arc<Event>) -> bool {
        match correlation(event) {
            Some(key) => self.complete_key(key, Arc::clone(event)),
            None => false,
        }
    }

    pub fn has_pending(&self, key: &PendingKey) -> bool {
        self.table
            .lock()
            .slots
            .get(key)
            .map_or(false, |slot| !slot.signal.is_closed())
    }

    pub fn has_pending_route(&self, prefix: PublicKeyPrefix, kind: RequestKind) -> bool {
        self.has_pending(&PendingKey::route(prefix, kind))
    }

    /// Cancel the slot for `key`.
    pub fn cancel(&self, key: &PendingKey) -> bool {
        let mut table = self.table.lock();
        match table.slots.remove(key) {
            Some(slot) => slot.signal.send(Signal::Cancelled).is_ok(),
            None => false,
        }
    }

    /// Cancel every slot. Returns how many waiters were notified.
    pub fn cancel_all(&self) -> usize {
        let mut table = self.table.lock();
        table
            .slots
            .drain()
            .filter_map(|(_, slot)| slot.signal.send(Signal::Cancelled).ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.table.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

/// Caller's side of a registered slot. Dropping it releases the slot.
pub struct PendingRequest {
    key: PendingKey,
    id: u64,
    timeout: Duration,
    rx: oneshot::Receiver<Signal>,
    table: Arc<Mutex<Table>>,
    clock: Arc<dyn Clock>,
}

impl PendingRequest {
    pub fn key(&self) -> PendingKey {
        self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for completion or the registered timeout.
    pub async fn wait(self) -> Resolution {
        self.wait_or_cancel(&CancellationToken::new()).await
    }

    /// Wait for completion, the registered timeout or `cancel`.
    pub async fn wait_or_cancel(mut self, cancel: &CancellationToken) -> Resolution {
        enum Woken {
            Signalled(std::result::Result<Signal, oneshot::error::RecvError>),
            Deadline,
            Cancelled,
        }

        let clock = Arc::clone(&self.clock);
        let timeout = self.timeout;
        let woken = tokio::select! {
            signal = &mut self.rx => Woken::Signalled(signal),
            _ = clock.sleep(timeout) => Woken::Deadline,
            _ = cancel.cancelled() => Woken::Cancelled,
        };

        match woken {
            Woken::Signalled(Ok(Signal::Completed(event))) => Resolution::Completed(event),
            Woken::Signalled(_) => Resolution::Cancelled,
            Woken::Deadline => {
                self.release();
                trace!(key = %self.key, "pending request timed out");
                self.settle(Resolution::TimedOut)
            }
            Woken::Cancelled => {
                self.release();
                self.settle(Resolution::Cancelled)
            }
        }
    }

    /// A completion that slipped in before the slot was released wins.
    fn settle(&mut self, fallback: Resolution) -> Resolution {
        match self.rx.try_recv() {
            Ok(Signal::Completed(event)) => Resolution::Completed(event),
            _ => fallback,
        }
    }

    fn release(&self) {
        self.table.lock().remove_owned(&self.key, self.id);
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish()
    }
}
