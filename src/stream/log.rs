//! # Append Log
//! In-process ordered log with named consumer groups, modeled on the
//! stream/consumer-group protocol the pipeline consumes in production.
//!
//! Guarantees:
//!   - append order is total; ids increase monotonically
//!   - within one group, an entry is delivered to exactly one consumer at a
//!     time (competing consumers)
//!   - an entry leaves a group's pending set only on `ack`; unacknowledged
//!     entries are re-readable (`read_pending`) or reassignable
//!     (`reclaim_stale`), giving at-least-once, never exactly-once
//!
//! Reads never remove entries from the log; trimming is out of scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{EntryId, PostEvent};

/// Where a newly created group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Deliver everything already in the log.
    Beginning,
    /// Deliver only entries appended after group creation.
    End,
}

/// Introspection row for a group's pending set (tests, reaper policies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub id: EntryId,
    pub consumer: String,
    pub delivery_count: u32,
}

#[derive(Debug)]
struct PendingDelivery {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
    index: usize,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Index into `entries` of the next not-yet-delivered entry.
    cursor: usize,
    pending: BTreeMap<EntryId, PendingDelivery>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<(EntryId, PostEvent)>,
    next_id: u64,
    groups: HashMap<String, GroupState>,
}

/// Thread-safe append log; share it between producers and workers via `Arc`.
#[derive(Debug, Default)]
pub struct AppendLog {
    state: Mutex<LogState>,
    data_ready: Notify,
}

impl AppendLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and wake blocked readers. Ids start at 1.
    pub fn append(&self, event: PostEvent) -> EntryId {
        let id = {
            let mut state = self.state.lock().expect("append log mutex poisoned");
            state.next_id += 1;
            let id = EntryId(state.next_id);
            state.entries.push((id, event));
            id
        };
        self.data_ready.notify_waiters();
        id
    }

    /// Create a consumer group. Idempotent: a second call for an existing
    /// group is a no-op and does not move its cursor.
    pub fn create_group(&self, name: &str, start: StartPosition) {
        let mut state = self.state.lock().expect("append log mutex poisoned");
        if state.groups.contains_key(name) {
            return;
        }
        let cursor = match start {
            StartPosition::Beginning => 0,
            StartPosition::End => state.entries.len(),
        };
        state
            .groups
            .insert(name.to_string(), GroupState { cursor, pending: BTreeMap::new() });
    }

    /// Read up to `max_count` previously-undelivered entries for `consumer`,
    /// blocking up to `block` while the log has nothing new for this group.
    /// Returns an empty batch on timeout. Delivered entries move into the
    /// group's pending set until acknowledged.
    pub async fn read_batch(
        &self,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<(EntryId, PostEvent)>> {
        let deadline = Instant::now() + block;
        loop {
            // Arm the notification before checking state so an append between
            // the check and the await cannot be missed.
            let notified = self.data_ready.notified();
            {
                let mut state = self.state.lock().expect("append log mutex poisoned");
                let batch = Self::take_undelivered(&mut state, group, consumer, max_count)?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // Deadline hit. One last look, in case an append raced the
                // park (notify_waiters only wakes already-registered waiters).
                let mut state = self.state.lock().expect("append log mutex poisoned");
                return Self::take_undelivered(&mut state, group, consumer, max_count);
            }
        }
    }

    /// Re-return `consumer`'s own delivered-but-unacknowledged entries, in id
    /// order. Each redelivery bumps the entry's delivery count.
    pub fn read_pending(
        &self,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<(EntryId, PostEvent)>> {
        let mut state = self.state.lock().expect("append log mutex poisoned");
        let state = &mut *state;
        let grp = match state.groups.get_mut(group) {
            Some(g) => g,
            None => bail!("unknown consumer group: {group}"),
        };
        let now = Instant::now();
        let mut out = Vec::new();
        for (id, pend) in grp.pending.iter_mut() {
            if out.len() >= max_count {
                break;
            }
            if pend.consumer != consumer {
                continue;
            }
            pend.delivered_at = now;
            pend.delivery_count += 1;
            out.push((*id, state.entries[pend.index].1.clone()));
        }
        Ok(out)
    }

    /// Remove `id` from the group's pending set. Returns false when the id
    /// was not pending (already acked or never delivered); that is not an
    /// error, at-least-once redelivery makes double acks routine.
    pub fn ack(&self, group: &str, id: EntryId) -> Result<bool> {
        let mut state = self.state.lock().expect("append log mutex poisoned");
        let grp = match state.groups.get_mut(group) {
            Some(g) => g,
            None => bail!("unknown consumer group: {group}"),
        };
        Ok(grp.pending.remove(&id).is_some())
    }

    /// Reassign entries pending longer than `min_idle` (held by any other
    /// consumer) to `new_consumer`, bumping their delivery counts. This is
    /// the explicit recovery primitive for consumers that died mid-batch;
    /// callers decide when to run it and what delivery count means dead.
    pub fn reclaim_stale(
        &self,
        group: &str,
        new_consumer: &str,
        min_idle: Duration,
        max_count: usize,
    ) -> Result<Vec<(EntryId, PostEvent)>> {
        let mut state = self.state.lock().expect("append log mutex poisoned");
        let state = &mut *state;
        let grp = match state.groups.get_mut(group) {
            Some(g) => g,
            None => bail!("unknown consumer group: {group}"),
        };
        let now = Instant::now();
        let mut out = Vec::new();
        for (id, pend) in grp.pending.iter_mut() {
            if out.len() >= max_count {
                break;
            }
            if pend.consumer == new_consumer || now.duration_since(pend.delivered_at) < min_idle {
                continue;
            }
            pend.consumer = new_consumer.to_string();
            pend.delivered_at = now;
            pend.delivery_count += 1;
            out.push((*id, state.entries[pend.index].1.clone()));
        }
        Ok(out)
    }

    /// Total entries ever appended (the log is never trimmed here).
    pub fn len(&self) -> usize {
        self.state.lock().expect("append log mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of delivered-but-unacknowledged entries in a group.
    pub fn pending_count(&self, group: &str) -> Result<usize> {
        let state = self.state.lock().expect("append log mutex poisoned");
        match state.groups.get(group) {
            Some(g) => Ok(g.pending.len()),
            None => bail!("unknown consumer group: {group}"),
        }
    }

    /// Snapshot of a group's pending set in id order.
    pub fn pending_entries(&self, group: &str) -> Result<Vec<PendingInfo>> {
        let state = self.state.lock().expect("append log mutex poisoned");
        let grp = match state.groups.get(group) {
            Some(g) => g,
            None => bail!("unknown consumer group: {group}"),
        };
        Ok(grp
            .pending
            .iter()
            .map(|(id, p)| PendingInfo {
                id: *id,
                consumer: p.consumer.clone(),
                delivery_count: p.delivery_count,
            })
            .collect())
    }

    fn take_undelivered(
        state: &mut LogState,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<(EntryId, PostEvent)>> {
        let LogState { entries, groups, .. } = state;
        let grp = match groups.get_mut(group) {
            Some(g) => g,
            None => bail!("unknown consumer group: {group}"),
        };
        let now = Instant::now();
        let mut out = Vec::new();
        while grp.cursor < entries.len() && out.len() < max_count {
            let index = grp.cursor;
            let (id, event) = &entries[index];
            grp.pending.insert(
                *id,
                PendingDelivery {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                    index,
                },
            );
            out.push((*id, event.clone()));
            grp.cursor += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(post_id: &str) -> PostEvent {
        PostEvent::new(post_id, "unit", "some content", "tester")
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_order_is_preserved() {
        let log = AppendLog::new();
        log.create_group("g", StartPosition::Beginning);
        let a = log.append(ev("a"));
        let b = log.append(ev("b"));
        assert!(b > a);

        let batch = log
            .read_batch("g", "c1", 10, Duration::from_millis(0))
            .await
            .unwrap();
        let ids: Vec<_> = batch.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn unknown_group_is_an_error() {
        let log = AppendLog::new();
        let err = log
            .read_batch("nope", "c1", 1, Duration::from_millis(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown consumer group"));
    }

    #[tokio::test]
    async fn ack_is_idempotent_on_unknown_ids() {
        let log = AppendLog::new();
        log.create_group("g", StartPosition::Beginning);
        let id = log.append(ev("a"));
        let _ = log
            .read_batch("g", "c1", 1, Duration::from_millis(0))
            .await
            .unwrap();
        assert!(log.ack("g", id).unwrap());
        assert!(!log.ack("g", id).unwrap());
    }

    #[tokio::test]
    async fn end_position_skips_history() {
        let log = AppendLog::new();
        log.append(ev("old"));
        log.create_group("late", StartPosition::End);
        let fresh = log.append(ev("new"));

        let batch = log
            .read_batch("late", "c1", 10, Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, fresh);
    }
}
