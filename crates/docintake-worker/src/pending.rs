//! Queue bookkeeping: waiting jobs ordered by tier and arrival, the set of keys
//! currently being processed, and staff follow-ups parked behind an in-flight key.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::time::Instant;

use docintake_core::models::{Priority, ProcessingJob};

/// A job waiting for a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: ProcessingJob,
    /// 1-based attempt number the next run will be.
    pub attempt: u32,
    pub ready_at: Instant,
}

/// Ordering key: higher tier first, then earlier arrival.
type Slot = (Reverse<Priority>, u64);

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Enqueued,
    AlreadyQueued,
    Upgraded,
    InFlight,
    /// Same key is in flight; the high-tier job runs once that attempt ends.
    Deferred,
}

#[derive(Default)]
pub struct PendingJobs {
    waiting: BTreeMap<Slot, QueuedJob>,
    by_key: HashMap<String, Slot>,
    in_flight: HashSet<String>,
    follow_ups: HashMap<String, ProcessingJob>,
    next_seq: u64,
}

impl PendingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_slot(&mut self, priority: Priority) -> Slot {
        let slot = (Reverse(priority), self.next_seq);
        self.next_seq += 1;
        slot
    }

    fn insert(&mut self, slot: Slot, queued: QueuedJob) {
        self.by_key.insert(queued.job.idempotency_key(), slot);
        self.waiting.insert(slot, queued);
    }

    /// Admit a fresh submission, coalescing on the idempotency key.
    pub fn admit(&mut self, job: ProcessingJob, now: Instant) -> Admission {
        let key = job.idempotency_key();

        if self.in_flight.contains(&key) {
            if job.priority == Priority::High {
                // the running attempt may predate this payload; the latest one wins
                self.follow_ups.insert(key, job);
                return Admission::Deferred;
            }
            return Admission::InFlight;
        }

        if let Some(slot) = self.by_key.get(&key).copied() {
            let (Reverse(current), seq) = slot;
            if job.priority <= current {
                return Admission::AlreadyQueued;
            }
            // higher tier replaces the payload and runs as soon as a worker frees up
            self.waiting.remove(&slot);
            let upgraded = QueuedJob {
                attempt: 1,
                ready_at: now,
                job,
            };
            let slot = (Reverse(upgraded.job.priority), seq);
            self.insert(slot, upgraded);
            return Admission::Upgraded;
        }

        let slot = self.next_slot(job.priority);
        self.insert(
            slot,
            QueuedJob {
                job,
                attempt: 1,
                ready_at: now,
            },
        );
        Admission::Enqueued
    }

    /// Take the best ready job and mark its key in flight.
    pub fn take_ready(&mut self, now: Instant) -> Option<QueuedJob> {
        let slot = self
            .waiting
            .iter()
            .find(|(_, queued)| queued.ready_at <= now)
            .map(|(slot, _)| *slot)?;
        let queued = self.waiting.remove(&slot)?;
        let key = queued.job.idempotency_key();
        self.by_key.remove(&key);
        self.in_flight.insert(key);
        Some(queued)
    }

    /// Release an in-flight key, optionally scheduling a retry behind its tier. A parked
    /// follow-up replaces the retry and starts over at attempt 1.
    pub fn finish(&mut self, key: &str, retry: Option<QueuedJob>, now: Instant) {
        self.in_flight.remove(key);
        let next = match self.follow_ups.remove(key) {
            Some(job) => Some(QueuedJob {
                job,
                attempt: 1,
                ready_at: now,
            }),
            None => retry,
        };
        if let Some(queued) = next {
            let slot = self.next_slot(queued.job.priority);
            self.insert(slot, queued);
        }
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn normal() -> ProcessingJob {
        ProcessingJob::intake(Uuid::new_v4(), "unprocessed/a.pdf", "a.pdf")
    }

    #[test]
    fn high_tier_first_then_fifo() {
        let now = Instant::now();
        let mut pending = PendingJobs::new();
        let a = normal();
        let b = normal();
        let c = ProcessingJob::reprocess(Uuid::new_v4(), "unprocessed/c.pdf", "c.pdf", "staff");
        pending.admit(a.clone(), now);
        pending.admit(b.clone(), now);
        pending.admit(c.clone(), now);

        let order: Vec<Uuid> = std::iter::from_fn(|| pending.take_ready(now))
            .map(|q| q.job.file_id)
            .collect();
        assert_eq!(order, vec![c.file_id, a.file_id, b.file_id]);
    }

    #[test]
    fn duplicate_key_is_coalesced_and_upgraded() {
        let now = Instant::now();
        let mut pending = PendingJobs::new();
        let job = normal();
        assert_eq!(pending.admit(job.clone(), now), Admission::Enqueued);
        assert_eq!(pending.admit(job.clone(), now), Admission::AlreadyQueued);

        let mut urgent = job.clone();
        urgent.priority = Priority::High;
        urgent.manually_edited = true;
        assert_eq!(pending.admit(urgent, now), Admission::Upgraded);
        assert_eq!(pending.waiting_len(), 1);

        let taken = pending.take_ready(now).unwrap();
        assert!(taken.job.manually_edited);
        assert_eq!(pending.admit(job, now), Admission::InFlight);
    }

    #[test]
    fn delayed_retry_is_not_ready_early() {
        let now = Instant::now();
        let mut pending = PendingJobs::new();
        let job = normal();
        pending.admit(job.clone(), now);
        let taken = pending.take_ready(now).unwrap();

        let key = taken.job.idempotency_key();
        pending.finish(
            &key,
            Some(QueuedJob {
                job: taken.job,
                attempt: 2,
                ready_at: now + Duration::from_secs(2),
            }),
            now,
        );
        assert_eq!(pending.in_flight_len(), 0);
        assert!(pending.take_ready(now).is_none());
        let retried = pending.take_ready(now + Duration::from_secs(2)).unwrap();
        assert_eq!(retried.attempt, 2);
    }

    #[test]
    fn staff_resubmit_while_in_flight_runs_after_release() {
        let now = Instant::now();
        let mut pending = PendingJobs::new();
        let file_id = Uuid::new_v4();
        let first = ProcessingJob::reprocess(file_id, "unprocessed/a.pdf", "a.pdf", "staff");
        pending.admit(first, now);
        let taken = pending.take_ready(now).unwrap();

        let edited = ProcessingJob::reprocess(file_id, "unprocessed/a.pdf", "a.pdf", "reviewer");
        assert_eq!(pending.admit(edited, now), Admission::Deferred);
        assert_eq!(pending.admit(normal(), now), Admission::Enqueued);
        assert_eq!(pending.waiting_len(), 1);

        // the follow-up supersedes the retry of the attempt that was running
        let key = taken.job.idempotency_key();
        let retry = QueuedJob {
            job: taken.job,
            attempt: 2,
            ready_at: now + Duration::from_secs(60),
        };
        pending.finish(&key, Some(retry), now);
        assert_eq!(pending.waiting_len(), 2);

        let next = pending.take_ready(now).unwrap();
        assert_eq!(next.job.file_id, file_id);
        assert_eq!(next.attempt, 1);
        assert_eq!(next.job.requested_by.as_deref(), Some("reviewer"));
    }

    #[test]
    fn normal_resubmit_while_in_flight_is_dropped() {
        let now = Instant::now();
        let mut pending = PendingJobs::new();
        let job = normal();
        pending.admit(job.clone(), now);
        let taken = pending.take_ready(now).unwrap();

        assert_eq!(pending.admit(job, now), Admission::InFlight);
        pending.finish(&taken.job.idempotency_key(), None, now);
        assert_eq!(pending.waiting_len(), 0);
    }
}
