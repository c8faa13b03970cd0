//! The broker task: sole owner of the event log, the session registry and
//! both pending-slot maps.
//!
//! Every mutation arrives as a [`Command`] on one MPSC channel and is applied
//! by a single consumer, so "append event" and "open pending slot" can never
//! interleave. Callers hold a cloneable [`BrokerHandle`]. The only suspension
//! on the caller side is the deadline race in the await operations; the
//! broker itself never awaits while holding state.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::decisions::{Decision, DecisionOutcome, ResponseAction, ResponseOutcome, UserResponse};
use crate::errors::BrokerError;
use crate::events::{Event, NewEvent};
use crate::log::{EventLog, DEFAULT_CAPACITY};
use crate::notify::{Notification, Snapshot, Stats};
use crate::pending::{settle_by, PendingSlots, Settled, Ticket};
use crate::sessions::{Session, SessionChange, SessionRegistry};

/// Sizing for a broker instance.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Events retained by the log.
    pub log_capacity: usize,
    /// Per-observer notification ring. A slower observer loses the oldest.
    pub notification_buffer: usize,
    /// Events included in a new observer's snapshot.
    pub snapshot_events: usize,
    /// Depth of the command queue.
    pub command_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_CAPACITY,
            notification_buffer: 256,
            snapshot_events: 100,
            command_buffer: 1024,
        }
    }
}

#[derive(Clone, Debug)]
enum SlotKey {
    Decision(u64),
    Response(String),
}

type Waiter<V> = (Ticket, oneshot::Receiver<V>);

enum Command {
    Ingest {
        event: NewEvent,
        reply: oneshot::Sender<Event>,
    },
    RegisterDecision {
        event_id: u64,
        reply: oneshot::Sender<Waiter<DecisionOutcome>>,
    },
    SubmitDecision {
        event_id: u64,
        outcome: DecisionOutcome,
        reply: oneshot::Sender<bool>,
    },
    RegisterResponse {
        session_id: String,
        reply: oneshot::Sender<Waiter<ResponseOutcome>>,
    },
    SubmitResponse {
        session_id: String,
        response: Option<String>,
        action: ResponseAction,
        reply: oneshot::Sender<UserResponse>,
    },
    Expire {
        slot: SlotKey,
        ticket: Ticket,
    },
    ListEvents {
        limit: usize,
        reply: oneshot::Sender<Vec<Event>>,
    },
    FindEvent {
        id: u64,
        reply: oneshot::Sender<Option<Event>>,
    },
    ClearEvents {
        reply: oneshot::Sender<usize>,
    },
    ListSessions {
        reply: oneshot::Sender<Vec<Session>>,
    },
    GetSession {
        session_id: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    Stats {
        reply: oneshot::Sender<Stats>,
    },
    Subscribe {
        reply: oneshot::Sender<(Snapshot, broadcast::Receiver<Notification>)>,
    },
}

/// State owned by the broker task.
pub struct Broker {
    log: EventLog,
    sessions: SessionRegistry,
    permissions: PendingSlots<u64, DecisionOutcome>,
    responses: PendingSlots<String, ResponseOutcome>,
    notify_tx: broadcast::Sender<Notification>,
    last_response_id: u64,
    snapshot_events: usize,
}

impl Broker {
    fn new(config: &BrokerConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(config.notification_buffer.max(1));
        Self {
            log: EventLog::new(config.log_capacity),
            sessions: SessionRegistry::new(),
            permissions: PendingSlots::new(),
            responses: PendingSlots::new(),
            notify_tx,
            last_response_id: 0,
            snapshot_events: config.snapshot_events,
        }
    }

    /// Start a broker task on the current runtime and return its handle.
    /// The task exits once every handle is dropped.
    pub fn spawn(config: BrokerConfig) -> BrokerHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let broker = Self::new(&config);
        let _ = tokio::spawn(broker.run(rx));
        BrokerHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd);
        }
        debug!("broker command channel closed");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Ingest { event, reply } => {
                let _ = reply.send(self.ingest(event));
            }
            Command::RegisterDecision { event_id, reply } => {
                let waiter = self.permissions.register(event_id);
                debug!(
                    event_id,
                    waiters = self.permissions.waiter_count(&event_id),
                    "decision slot registered"
                );
                let _ = reply.send(waiter);
            }
            Command::SubmitDecision {
                event_id,
                outcome,
                reply,
            } => {
                let _ = reply.send(self.submit_decision(event_id, outcome));
            }
            Command::RegisterResponse { session_id, reply } => {
                let waiter = self.responses.register(session_id);
                let _ = reply.send(waiter);
            }
            Command::SubmitResponse {
                session_id,
                response,
                action,
                reply,
            } => {
                let _ = reply.send(self.submit_response(session_id, response, action));
            }
            Command::Expire { slot, ticket } => self.expire(slot, ticket),
            Command::ListEvents { limit, reply } => {
                let _ = reply.send(self.log.recent(limit));
            }
            Command::FindEvent { id, reply } => {
                let _ = reply.send(self.log.find(id).cloned());
            }
            Command::ClearEvents { reply } => {
                let _ = reply.send(self.clear());
            }
            Command::ListSessions { reply } => {
                let _ = reply.send(self.sessions.list());
            }
            Command::GetSession { session_id, reply } => {
                let _ = reply.send(self.sessions.get(&session_id).cloned());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.subscribe());
            }
        }
    }

    fn publish(&self, notification: Notification) {
        // No receivers is not an error: nobody is watching.
        let _ = self.notify_tx.send(notification);
    }

    fn ingest(&mut self, new: NewEvent) -> Event {
        let event = self.log.append(new);

        match self.sessions.upsert_from_event(&event) {
            SessionChange::Started(session) => {
                self.publish(Notification::SessionStart { session });
            }
            SessionChange::Ended(session_id) => {
                self.publish(Notification::SessionEnd { session_id });
            }
            SessionChange::Touched | SessionChange::Unchanged => {}
        }

        if event.pending_decision {
            self.publish(Notification::PermissionRequest {
                event: event.clone(),
            });
        } else {
            self.publish(Notification::Event {
                event: event.clone(),
            });
        }

        info!(
            event_id = event.id,
            hook = event.histogram_key(),
            session_id = event.session_id.as_deref().unwrap_or(""),
            label = %event.label(),
            "event ingested"
        );
        event
    }

    fn submit_decision(&mut self, event_id: u64, outcome: DecisionOutcome) -> bool {
        let decision = outcome.decision;
        let delivered = self.permissions.resolve(&event_id, outcome);
        if delivered {
            self.settle_decision(event_id, decision);
        } else {
            debug!(event_id, "no pending decision for event");
        }
        delivered
    }

    /// Announce a settlement. The event keeps the first decision it was
    /// given; later settlements for the same id are announced but not stored.
    fn settle_decision(&mut self, event_id: u64, decision: Decision) {
        let recorded = self.log.record_decision(event_id, decision);
        info!(event_id, decision = %decision, recorded, "decision settled");
        self.publish(Notification::PermissionDecided { event_id, decision });
    }

    fn submit_response(
        &mut self,
        session_id: String,
        response: Option<String>,
        action: ResponseAction,
    ) -> UserResponse {
        self.last_response_id += 1;
        let data = UserResponse {
            id: self.last_response_id,
            timestamp: chrono::Utc::now(),
            session_id,
            response,
            action,
        };

        let delivered = self
            .responses
            .resolve(&data.session_id, ResponseOutcome::Response(data.clone()));
        debug!(session_id = %data.session_id, delivered, "response submitted");

        self.publish(Notification::ResponseSent { data: data.clone() });
        data
    }

    fn expire(&mut self, slot: SlotKey, ticket: Ticket) {
        match slot {
            SlotKey::Decision(event_id) => {
                let remaining = self.permissions.expire(&event_id, ticket);
                // `None`: the slot was already resolved into a dropped
                // receiver, or cleared. Either way nobody else is waiting
                // unless the key is still occupied.
                let last_waiter = match remaining {
                    Some(n) => n == 0,
                    None => !self.permissions.contains(&event_id),
                };
                if last_waiter {
                    self.settle_decision(event_id, DecisionOutcome::fail_open().decision);
                }
            }
            SlotKey::Response(session_id) => {
                let _ = self.responses.expire(&session_id, ticket);
            }
        }
    }

    fn clear(&mut self) -> usize {
        let removed = self.log.clear();
        let abandoned = self.permissions.clear();
        info!(removed, abandoned, "event log cleared");
        self.publish(Notification::Clear);
        removed
    }

    fn stats(&mut self) -> Stats {
        self.permissions.prune();
        Stats {
            total_messages: self.log.len(),
            active_sessions: self.sessions.len(),
            pending_permissions: self.permissions.len(),
            event_counts: self.log.kind_histogram(),
            connected_clients: self.notify_tx.receiver_count(),
        }
    }

    fn subscribe(&mut self) -> (Snapshot, broadcast::Receiver<Notification>) {
        self.permissions.prune();
        let mut pending_permissions = self.permissions.keys();
        pending_permissions.sort_unstable();
        let snapshot = Snapshot {
            messages: self.log.recent(self.snapshot_events),
            sessions: self.sessions.list(),
            pending_permissions,
        };
        (snapshot, self.notify_tx.subscribe())
    }
}

/// Removes a waiter from its slot if the waiting future is dropped before it
/// settles (for example, the HTTP client disconnected).
struct SlotGuard {
    tx: mpsc::Sender<Command>,
    slot: Option<(SlotKey, Ticket)>,
}

impl SlotGuard {
    fn new(tx: mpsc::Sender<Command>, slot: SlotKey, ticket: Ticket) -> Self {
        Self {
            tx,
            slot: Some((slot, ticket)),
        }
    }

    fn disarm(mut self) {
        self.slot = None;
    }

    async fn expire(mut self) {
        if let Some((slot, ticket)) = self.slot.take() {
            let _ = self.tx.send(Command::Expire { slot, ticket }).await;
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let Some((slot, ticket)) = self.slot.take() else {
            return;
        };
        match self.tx.try_send(Command::Expire { slot, ticket }) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                if let Ok(rt) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    let _ = rt.spawn(async move {
                        let _ = tx.send(cmd).await;
                    });
                } else {
                    warn!("dropped slot expiry: command queue full and no runtime");
                }
            }
        }
    }
}

/// Cloneable front door to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<Command>,
}

impl BrokerHandle {
    async fn request<T>(
        &self,
        what: &'static str,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| BrokerError::Stopped)?;
        rx.await.map_err(|_| BrokerError::ReplyDropped(what))
    }

    /// Append an event; returns it with its assigned id.
    pub async fn ingest_event(&self, event: NewEvent) -> Result<Event, BrokerError> {
        self.request("ingest", |reply| Command::Ingest { event, reply })
            .await
    }

    /// Wait up to `timeout` for a decision on `event_id`. Never fails: an
    /// unanswered request, or a broker that cannot be reached, settles as
    /// [`DecisionOutcome::fail_open`] at the deadline.
    pub async fn await_decision(&self, event_id: u64, timeout: Duration) -> Settled<DecisionOutcome> {
        let deadline = Instant::now() + timeout;
        let registered = self
            .request("register_decision", |reply| Command::RegisterDecision {
                event_id,
                reply,
            })
            .await;

        let (ticket, rx) = match registered {
            Ok(waiter) => waiter,
            Err(e) => {
                warn!(event_id, error = %e, "could not open decision slot");
                tokio::time::sleep_until(deadline).await;
                return Settled::TimedOut(DecisionOutcome::fail_open());
            }
        };

        let guard = SlotGuard::new(self.tx.clone(), SlotKey::Decision(event_id), ticket);
        let settled = settle_by(rx, deadline, DecisionOutcome::fail_open()).await;
        match &settled {
            Settled::Resolved(outcome) => {
                guard.disarm();
                debug!(event_id, decision = %outcome.decision, "decision resolved");
            }
            Settled::TimedOut(_) => {
                guard.expire().await;
                debug!(event_id, timeout_ms = timeout.as_millis() as u64, "decision timed out");
            }
        }
        settled
    }

    /// Deliver a decision to whoever is waiting on `event_id`. `false` when
    /// nobody is.
    pub async fn submit_decision(
        &self,
        event_id: u64,
        outcome: DecisionOutcome,
    ) -> Result<bool, BrokerError> {
        self.request("submit_decision", |reply| Command::SubmitDecision {
            event_id,
            outcome,
            reply,
        })
        .await
    }

    /// Record a response for a session and wake anyone polling for it.
    pub async fn submit_response(
        &self,
        session_id: impl Into<String>,
        response: Option<String>,
        action: ResponseAction,
    ) -> Result<UserResponse, BrokerError> {
        let session_id = session_id.into();
        self.request("submit_response", |reply| Command::SubmitResponse {
            session_id,
            response,
            action,
            reply,
        })
        .await
    }

    /// Wait up to `timeout` for a response on `session_id`, settling as
    /// [`ResponseOutcome::proceed`] otherwise.
    pub async fn await_response(&self, session_id: &str, timeout: Duration) -> Settled<ResponseOutcome> {
        let deadline = Instant::now() + timeout;
        let session_id = session_id.to_string();
        let registered = self
            .request("register_response", |reply| Command::RegisterResponse {
                session_id: session_id.clone(),
                reply,
            })
            .await;

        let (ticket, rx) = match registered {
            Ok(waiter) => waiter,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "could not open response slot");
                tokio::time::sleep_until(deadline).await;
                return Settled::TimedOut(ResponseOutcome::proceed());
            }
        };

        let guard = SlotGuard::new(self.tx.clone(), SlotKey::Response(session_id), ticket);
        let settled = settle_by(rx, deadline, ResponseOutcome::proceed()).await;
        if settled.is_timed_out() {
            guard.expire().await;
        } else {
            guard.disarm();
        }
        settled
    }

    pub async fn list_events(&self, limit: usize) -> Result<Vec<Event>, BrokerError> {
        self.request("list_events", |reply| Command::ListEvents { limit, reply })
            .await
    }

    pub async fn find_event(&self, id: u64) -> Result<Option<Event>, BrokerError> {
        self.request("find_event", |reply| Command::FindEvent { id, reply })
            .await
    }

    /// Empty the log and abandon every open decision slot. Abandoned waiters
    /// settle through their own deadline. Returns the number of events removed.
    pub async fn clear_events(&self) -> Result<usize, BrokerError> {
        self.request("clear_events", |reply| Command::ClearEvents { reply })
            .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, BrokerError> {
        self.request("list_sessions", |reply| Command::ListSessions { reply })
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, BrokerError> {
        let session_id = session_id.to_string();
        self.request("get_session", |reply| Command::GetSession { session_id, reply })
            .await
    }

    pub async fn stats(&self) -> Result<Stats, BrokerError> {
        self.request("stats", |reply| Command::Stats { reply }).await
    }

    /// Snapshot of current state plus a receiver for everything after it.
    pub async fn subscribe(
        &self,
    ) -> Result<(Snapshot, broadcast::Receiver<Notification>), BrokerError> {
        self.request("subscribe", |reply| Command::Subscribe { reply })
            .await
    }

    /// Whether the broker task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
