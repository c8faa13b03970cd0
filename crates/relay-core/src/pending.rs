//! Pending slots: waiters parked on a correlation key until a value is
//! submitted or their deadline passes.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Identifies one waiter inside a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// How a wait ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settled<V> {
    /// A value was submitted before the deadline.
    Resolved(V),
    /// The deadline passed, or the slot was dropped; carries the default.
    TimedOut(V),
}

impl<V> Settled<V> {
    pub fn into_value(self) -> V {
        match self {
            Self::Resolved(v) | Self::TimedOut(v) => v,
        }
    }

    pub fn value(&self) -> &V {
        match self {
            Self::Resolved(v) | Self::TimedOut(v) => v,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

struct Waiter<V> {
    ticket: Ticket,
    tx: oneshot::Sender<V>,
}

/// Waiters grouped by correlation key.
///
/// Registering under an occupied key joins the existing slot; resolving a
/// key delivers a clone of the value to every waiter in it and removes the
/// slot.
pub struct PendingSlots<K, V> {
    slots: HashMap<K, Vec<Waiter<V>>>,
    next_ticket: u64,
}

impl<K, V> PendingSlots<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Park a new waiter under `key`.
    pub fn register(&mut self, key: K) -> (Ticket, oneshot::Receiver<V>) {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let (tx, rx) = oneshot::channel();

        let waiters = self.slots.entry(key).or_default();
        waiters.retain(|w| !w.tx.is_closed());
        waiters.push(Waiter { ticket, tx });
        (ticket, rx)
    }

    /// Deliver `value` to everyone waiting on `key` and drop the slot.
    ///
    /// Returns `true` if at least one live waiter received it. Absent keys
    /// are a no-op.
    pub fn resolve(&mut self, key: &K, value: V) -> bool {
        let Some(waiters) = self.slots.remove(key) else {
            return false;
        };
        let mut delivered = false;
        for waiter in waiters {
            delivered |= waiter.tx.send(value.clone()).is_ok();
        }
        delivered
    }

    /// Remove one waiter after its deadline. Returns the number of waiters
    /// left under `key`, or `None` if the ticket was no longer parked.
    pub fn expire(&mut self, key: &K, ticket: Ticket) -> Option<usize> {
        let waiters = self.slots.get_mut(key)?;
        let before = waiters.len();
        waiters.retain(|w| w.ticket != ticket);
        if waiters.len() == before {
            return None;
        }
        let remaining = waiters.len();
        if remaining == 0 {
            let _ = self.slots.remove(key);
        }
        Some(remaining)
    }

    /// Drop every slot. Waiters see a closed channel.
    pub fn clear(&mut self) -> usize {
        let n = self.slots.len();
        self.slots.clear();
        n
    }

    /// Discard waiters whose receiver is gone, then empty slots.
    pub fn prune(&mut self) {
        self.slots.retain(|_, waiters| {
            waiters.retain(|w| !w.tx.is_closed());
            !waiters.is_empty()
        });
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of occupied keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.slots.keys().cloned().collect()
    }

    /// Number of waiters parked under `key`.
    pub fn waiter_count(&self, key: &K) -> usize {
        self.slots.get(key).map_or(0, Vec::len)
    }
}

impl<K, V> Default for PendingSlots<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Race a parked waiter against its deadline.
///
/// A dropped slot (administrative clear, broker gone) does not settle early:
/// the waiter sleeps out its deadline and takes the default, the same path as
/// an unanswered request.
pub async fn settle_by<V>(rx: oneshot::Receiver<V>, deadline: Instant, default: V) -> Settled<V> {
    match tokio::time::timeout_at(deadline, rx).await {
        Ok(Ok(value)) => Settled::Resolved(value),
        Ok(Err(_)) => {
            tokio::time::sleep_until(deadline).await;
            Settled::TimedOut(default)
        }
        Err(_) => Settled::TimedOut(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_is_empty() {
        let slots: PendingSlots<u64, String> = PendingSlots::new();
        assert!(slots.is_empty());
        assert_eq!(slots.len(), 0);
    }

    #[tokio::test]
    async fn resolve_delivers_value() {
        let mut slots = PendingSlots::new();
        let (_ticket, rx) = slots.register(1u64);
        assert!(slots.contains(&1));

        assert!(slots.resolve(&1, "deny"));
        assert!(!slots.contains(&1));
        assert_eq!(rx.await.unwrap(), "deny");
    }

    #[test]
    fn resolve_absent_key_is_noop() {
        let mut slots: PendingSlots<u64, &str> = PendingSlots::new();
        assert!(!slots.resolve(&999_999, "allow"));
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn resolve_only_once() {
        let mut slots = PendingSlots::new();
        let (_t, rx) = slots.register("s1".to_string());

        assert!(slots.resolve(&"s1".to_string(), 1));
        assert!(!slots.resolve(&"s1".to_string(), 2));
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_key_fans_out() {
        let mut slots = PendingSlots::new();
        let (_t1, rx1) = slots.register(7u64);
        let (_t2, rx2) = slots.register(7u64);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.waiter_count(&7), 2);

        assert!(slots.resolve(&7, "allow"));
        assert_eq!(rx1.await.unwrap(), "allow");
        assert_eq!(rx2.await.unwrap(), "allow");
    }

    #[test]
    fn expire_removes_only_that_waiter() {
        let mut slots: PendingSlots<u64, u8> = PendingSlots::new();
        let (t1, _rx1) = slots.register(7);
        let (t2, _rx2) = slots.register(7);

        assert_eq!(slots.expire(&7, t1), Some(1));
        assert!(slots.contains(&7));
        assert_eq!(slots.expire(&7, t1), None);
        assert_eq!(slots.expire(&7, t2), Some(0));
        assert!(!slots.contains(&7));
        assert_eq!(slots.expire(&7, t2), None);
    }

    #[tokio::test]
    async fn clear_drops_senders() {
        let mut slots: PendingSlots<u64, u8> = PendingSlots::new();
        let (_t1, rx1) = slots.register(1);
        let (_t2, rx2) = slots.register(2);

        assert_eq!(slots.clear(), 2);
        assert!(slots.is_empty());
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[test]
    fn prune_discards_dropped_receivers() {
        let mut slots: PendingSlots<u64, u8> = PendingSlots::new();
        let (_t1, rx1) = slots.register(1);
        let (_t2, _rx2) = slots.register(2);
        drop(rx1);

        slots.prune();
        assert_eq!(slots.keys(), vec![2]);
    }

    #[test]
    fn resolve_with_only_dead_waiters_reports_false() {
        let mut slots: PendingSlots<u64, u8> = PendingSlots::new();
        let (_t, rx) = slots.register(1);
        drop(rx);
        assert!(!slots.resolve(&1, 5));
        assert!(!slots.contains(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_by_times_out_with_default() {
        let (_tx, rx) = oneshot::channel::<&str>();
        let start = Instant::now();
        let settled = settle_by(rx, start + Duration::from_millis(50), "allow").await;
        assert_eq!(settled, Settled::TimedOut("allow"));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_by_resolves_before_deadline() {
        let (tx, rx) = oneshot::channel();
        tx.send("deny").unwrap();
        let settled = settle_by(rx, Instant::now() + Duration::from_secs(30), "allow").await;
        assert_eq!(settled, Settled::Resolved("deny"));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_by_dropped_slot_waits_for_deadline() {
        let (tx, rx) = oneshot::channel::<&str>();
        drop(tx);
        let start = Instant::now();
        let settled = settle_by(rx, start + Duration::from_millis(200), "allow").await;
        assert!(settled.is_timed_out());
        assert_eq!(settled.into_value(), "allow");
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
