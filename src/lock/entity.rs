// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::time::Instant;

use super::id::{ConnId, LockId, Mode};
use super::queue::{RequestRecord, WaiterQueue};
use super::Nonce;

/// Result of a non-blocking `acquire_read`/`acquire_write` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Granted immediately (including the idempotent re-acquire case).
    Granted,
    /// Could not be granted; a [`RequestRecord`] was appended to the
    /// appropriate waiter queue.
    Pending,
}

/// Result of a `release` call.
///
/// `Released` carries the nonce the holder's original `acquire` (or the
/// grant that promoted it out of a waiter queue) supplied, so the dispatcher
/// can echo it alongside the release's own nonce per spec.md §6.4 ("the
/// release response then contains both the holder's original acquire nonce
/// and the release nonce, in that order").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(Mode, Nonce),
    NoLockToRelease,
}

/// A promotion produced by [`LockEntity::abdicate`] (or by the cleanup
/// paths that call it): a previously queued request that just became a
/// held lock and needs a `LOCKED` response sent to its connection.
///
/// Carries its own `lock_id` because the registry collects grants across
/// every entity it sweeps (`release_all`, `disconnect`) into a single
/// `Vec`, at which point the per-entity context would otherwise be lost.
#[derive(Debug, Clone)]
pub struct Grant {
    pub lock_id: LockId,
    pub conn: ConnId,
    pub nonce: Nonce,
    pub mode: Mode,
}

/// Per-key reader/writer state machine.
///
/// Owns both of the key's waiter queues. Every method here assumes it is
/// called from the single serialization domain described in spec.md §5:
/// there is no internal locking, because there is exactly one caller.
#[derive(Debug)]
pub struct LockEntity {
    id: LockId,
    /// The current writer, paired with the nonce its grant carried.
    writer: Option<(ConnId, Nonce)>,
    /// Current readers, each paired with the nonce its grant carried.
    readers: HashMap<ConnId, Nonce>,
    reader_queue: WaiterQueue,
    writer_queue: WaiterQueue,
    /// Fixed at creation: whether new reader acquires succeed even while a
    /// writer is queued. See `is_read_available`.
    greedy: bool,
    next_record_id: u64,
}

impl LockEntity {
    pub fn new(id: LockId, greedy: bool) -> Self {
        LockEntity {
            id,
            writer: None,
            readers: HashMap::new(),
            reader_queue: WaiterQueue::new(),
            writer_queue: WaiterQueue::new(),
            greedy,
            next_record_id: 0,
        }
    }

    pub fn id(&self) -> &LockId {
        &self.id
    }

    pub fn is_write_locked(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_read_locked(&self) -> bool {
        !self.readers.is_empty()
    }

    /// Non-greedy mode blocks new readers once a writer is queued, so a
    /// perpetual stream of readers cannot starve it; greedy mode maximizes
    /// read throughput at the cost of that guarantee.
    pub fn is_read_available(&self) -> bool {
        if self.greedy {
            !self.is_write_locked()
        } else {
            !self.is_write_locked() && self.writer_queue.is_empty()
        }
    }

    /// True if `conn` can become the writer right now: nobody else holds
    /// write, and either nobody holds read or `conn` is the sole reader
    /// (which authorizes a same-connection upgrade).
    pub fn is_write_available(&self, conn: ConnId) -> bool {
        !self.is_write_locked()
            && (self.readers.is_empty()
                || (self.readers.len() == 1 && self.readers.contains_key(&conn)))
    }

    /// A lock entity with no holder and no waiter is abandoned and must be
    /// removed from the registry (invariant I4).
    pub fn is_abandoned(&self) -> bool {
        self.writer.is_none()
            && self.readers.is_empty()
            && self.reader_queue.is_empty()
            && self.writer_queue.is_empty()
    }

    pub fn writer(&self) -> Option<ConnId> {
        self.writer.as_ref().map(|(conn, _)| *conn)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn reader_queue_len(&self) -> usize {
        self.reader_queue.len()
    }

    pub fn writer_queue_len(&self) -> usize {
        self.writer_queue.len()
    }

    fn alloc_record_id(&mut self) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        id
    }

    /// Returns the id of the queued record, so the caller can arm a deadline
    /// timer against it.
    pub fn acquire_read(
        &mut self,
        conn: ConnId,
        nonce: Nonce,
        deadline: Instant,
    ) -> (AcquireOutcome, Option<u64>) {
        if self.writer() == Some(conn) || self.readers.contains_key(&conn) {
            return (AcquireOutcome::Granted, None);
        }
        if self.is_read_available() {
            self.readers.insert(conn, nonce);
            return (AcquireOutcome::Granted, None);
        }
        let id = self.alloc_record_id();
        self.reader_queue.push_back(RequestRecord {
            id,
            conn,
            nonce,
            mode: Mode::Read,
            deadline,
        });
        (AcquireOutcome::Pending, Some(id))
    }

    pub fn acquire_write(
        &mut self,
        conn: ConnId,
        nonce: Nonce,
        deadline: Instant,
    ) -> (AcquireOutcome, Option<u64>) {
        if self.writer() == Some(conn) {
            return (AcquireOutcome::Granted, None);
        }
        if self.is_write_available(conn) {
            // Realizes the upgrade when `conn` was the sole reader.
            self.readers.remove(&conn);
            self.writer = Some((conn, nonce));
            return (AcquireOutcome::Granted, None);
        }
        let id = self.alloc_record_id();
        self.writer_queue.push_back(RequestRecord {
            id,
            conn,
            nonce,
            mode: Mode::Write,
            deadline,
        });
        (AcquireOutcome::Pending, Some(id))
    }

    /// Releases whichever side `conn` holds. Does not touch pending
    /// requests `conn` may have queued elsewhere: release targets held
    /// locks only.
    pub fn release(&mut self, conn: ConnId) -> (ReleaseOutcome, Vec<Grant>) {
        let outcome = if self.writer() == Some(conn) {
            let (_, nonce) = self.writer.take().expect("writer() returned Some");
            ReleaseOutcome::Released(Mode::Write, nonce)
        } else if let Some(nonce) = self.readers.remove(&conn) {
            ReleaseOutcome::Released(Mode::Read, nonce)
        } else {
            ReleaseOutcome::NoLockToRelease
        };
        let grants = if matches!(outcome, ReleaseOutcome::Released(..)) {
            self.abdicate()
        } else {
            Vec::new()
        };
        (outcome, grants)
    }

    /// Promotion loop run after any release (or disconnect cleanup): drains
    /// the reader queue while availability holds, then grants at most one
    /// writer. Readers are served before writers in the same cycle; in
    /// non-greedy mode this still prevents writer starvation because new
    /// *external* reader requests are blocked by the pending writer.
    pub fn abdicate(&mut self) -> Vec<Grant> {
        let mut grants = Vec::new();

        while self.is_read_available() {
            let Some(record) = self.reader_queue.pop_front() else {
                break;
            };
            self.readers.insert(record.conn, record.nonce.clone());
            grants.push(Grant {
                lock_id: self.id.clone(),
                conn: record.conn,
                nonce: record.nonce,
                mode: Mode::Read,
            });
        }

        if let Some(head) = self.writer_queue.front() {
            if self.is_write_available(head.conn) {
                let record = self.writer_queue.pop_front().expect("front just peeked");
                self.writer = Some((record.conn, record.nonce.clone()));
                grants.push(Grant {
                    lock_id: self.id.clone(),
                    conn: record.conn,
                    nonce: record.nonce,
                    mode: Mode::Write,
                });
            }
        }

        grants
    }

    /// Removes a specific queued record when its deadline timer fires. A
    /// `None` return means the wakeup is stale (already granted or purged)
    /// and must be treated as a no-op.
    pub fn timeout_expire(&mut self, record_id: u64) -> Option<RequestRecord> {
        self.reader_queue
            .remove_by_id(record_id)
            .or_else(|| self.writer_queue.remove_by_id(record_id))
    }

    /// Removes `conn` from every role it holds or waits in, then runs
    /// abdicate. No outbound messages are generated for `conn` itself.
    pub fn disconnect_cleanup(&mut self, conn: ConnId) -> Vec<Grant> {
        if self.writer() == Some(conn) {
            self.writer = None;
        }
        self.readers.remove(&conn);
        self.reader_queue.remove_all_by_conn(conn);
        self.writer_queue.remove_all_by_conn(conn);
        self.abdicate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn entity(greedy: bool) -> LockEntity {
        LockEntity::new(LockId::new("X").unwrap(), greedy)
    }

    #[test]
    fn scenario_write_contention() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        let c2 = ConnId::new(2);

        let (outcome, _) = e.acquire_write(c1, None, far_deadline());
        assert_eq!(outcome, AcquireOutcome::Granted);

        let (outcome, id) = e.acquire_write(c2, Some("n2".into()), far_deadline());
        assert_eq!(outcome, AcquireOutcome::Pending);
        assert!(id.is_some());

        let (released, grants) = e.release(c1);
        assert_eq!(released, ReleaseOutcome::Released(Mode::Write, None));
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].conn, c2);
        assert_eq!(grants[0].nonce.as_deref(), Some("n2"));
        assert_eq!(e.writer(), Some(c2));
    }

    #[test]
    fn scenario_reader_fan_in_then_writer_queues() {
        let mut e = entity(true);
        let readers = [ConnId::new(1), ConnId::new(2), ConnId::new(3)];
        for c in readers {
            let (outcome, _) = e.acquire_read(c, None, far_deadline());
            assert_eq!(outcome, AcquireOutcome::Granted);
        }
        assert_eq!(e.reader_count(), 3);

        let (outcome, id) = e.acquire_write(ConnId::new(4), None, far_deadline());
        assert_eq!(outcome, AcquireOutcome::Pending);
        let id = id.unwrap();

        let expired = e.timeout_expire(id);
        assert!(expired.is_some());
        assert_eq!(e.writer_queue_len(), 0);
        // A second expiry of the same id is a no-op.
        assert!(e.timeout_expire(id).is_none());
    }

    #[test]
    fn scenario_non_greedy_blocks_new_readers_behind_waiting_writer() {
        let mut e = entity(false);
        let c1 = ConnId::new(1);
        let c2 = ConnId::new(2);
        let c3 = ConnId::new(3);

        assert_eq!(e.acquire_read(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.acquire_write(c2, None, far_deadline()).0, AcquireOutcome::Pending);
        // C3 would otherwise be grantable (no writer holds yet) but the
        // pending writer blocks new readers in non-greedy mode.
        assert_eq!(e.acquire_read(c3, None, far_deadline()).0, AcquireOutcome::Pending);

        let (released, grants) = e.release(c1);
        assert_eq!(released, ReleaseOutcome::Released(Mode::Read, None));
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].conn, c2);
        assert_eq!(grants[0].mode, Mode::Write);
        assert_eq!(e.writer(), Some(c2));
        assert_eq!(e.reader_queue_len(), 1, "C3 is still pending");
    }

    #[test]
    fn scenario_upgrade() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        assert_eq!(e.acquire_read(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.acquire_write(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.reader_count(), 0);
        assert_eq!(e.writer(), Some(c1));
    }

    #[test]
    fn scenario_disconnect_purge() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        let c2 = ConnId::new(2);
        assert_eq!(e.acquire_write(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.acquire_write(c2, None, far_deadline()).0, AcquireOutcome::Pending);

        let grants = e.disconnect_cleanup(c1);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].conn, c2);
        assert_eq!(e.writer(), Some(c2));
        assert_eq!(e.reader_count(), 0);
        assert_eq!(e.writer_queue_len(), 0);
    }

    #[test]
    fn idempotent_reacquire_does_not_change_state() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        assert_eq!(e.acquire_read(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.reader_count(), 1);
        assert_eq!(e.acquire_read(c1, None, far_deadline()).0, AcquireOutcome::Granted);
        assert_eq!(e.reader_count(), 1, "re-acquire must not duplicate the holder");
    }

    #[test]
    fn release_of_unheld_lock_reports_no_lock_to_release() {
        let mut e = entity(true);
        let (outcome, grants) = e.release(ConnId::new(1));
        assert_eq!(outcome, ReleaseOutcome::NoLockToRelease);
        assert!(grants.is_empty());
    }

    #[test]
    fn greedy_readers_bypass_waiting_writer() {
        let mut e = entity(true);
        assert_eq!(
            e.acquire_write(ConnId::new(1), None, far_deadline()).0,
            AcquireOutcome::Pending
        );
        assert_eq!(
            e.acquire_read(ConnId::new(2), None, far_deadline()).0,
            AcquireOutcome::Granted,
            "greedy mode lets readers cut in line ahead of a queued writer"
        );
    }

    #[test]
    fn release_echoes_holders_original_acquire_nonce() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        e.acquire_write(c1, Some("acquired-with-this".into()), far_deadline());
        let (outcome, _) = e.release(c1);
        match outcome {
            ReleaseOutcome::Released(Mode::Write, nonce) => {
                assert_eq!(nonce.as_deref(), Some("acquired-with-this"));
            }
            other => panic!("expected Released(Write, _), got {other:?}"),
        }
    }

    #[test]
    fn abdicated_grant_carries_queued_requests_original_nonce_into_the_new_holder_slot() {
        let mut e = entity(true);
        let c1 = ConnId::new(1);
        let c2 = ConnId::new(2);
        e.acquire_write(c1, None, far_deadline());
        e.acquire_write(c2, Some("queued-nonce".into()), far_deadline());
        e.release(c1);
        // c2 is now the writer, promoted via abdicate; a subsequent release
        // of c2 must still echo the nonce its original queued acquire
        // carried, not something lost along the way.
        let (outcome, _) = e.release(c2);
        match outcome {
            ReleaseOutcome::Released(Mode::Write, nonce) => {
                assert_eq!(nonce.as_deref(), Some("queued-nonce"));
            }
            other => panic!("expected Released(Write, _), got {other:?}"),
        }
    }
}

/// Property tests for invariants P1-P5 and P8 (spec.md §8): random
/// interleavings of acquire/release/disconnect over a handful of connection
/// ids, checking the invariants after every single step rather than only at
/// the end.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum Op {
        AcquireRead(u64),
        AcquireWrite(u64),
        Release(u64),
        Disconnect(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        // Only four connection ids: small enough that contention, upgrades,
        // and queue promotion all show up often in a 1000-case run.
        (0..4u64, 0..4u32).prop_map(|(conn, kind)| match kind {
            0 => Op::AcquireRead(conn),
            1 => Op::AcquireWrite(conn),
            2 => Op::Release(conn),
            _ => Op::Disconnect(conn),
        })
    }

    fn check_invariants(e: &LockEntity) {
        // P1/I1: writer and readers are never both occupied.
        assert!(!(e.is_write_locked() && e.is_read_locked()), "P1 violated");
        // P3/I2: no connection holds both roles (implied by P1 plus the
        // fact that `writer` is a single Option, never a set).
        if let Some(w) = e.writer() {
            assert!(!e.readers.contains_key(&w), "P3 violated: {w} holds both roles");
        }
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_op(ops in proptest::collection::vec(op_strategy(), 0..200)) {
            let mut e = LockEntity::new(LockId::new("X").unwrap(), true);
            let deadline = Instant::now() + Duration::from_secs(3600);
            for op in ops {
                match op {
                    Op::AcquireRead(c) => {
                        e.acquire_read(ConnId::new(c), None, deadline);
                    }
                    Op::AcquireWrite(c) => {
                        e.acquire_write(ConnId::new(c), None, deadline);
                    }
                    Op::Release(c) => {
                        e.release(ConnId::new(c));
                    }
                    Op::Disconnect(c) => {
                        e.disconnect_cleanup(ConnId::new(c));
                    }
                }
                check_invariants(&e);
            }
        }

        #[test]
        fn idempotent_reacquire_never_changes_holder_counts(
            conn in 0..4u64,
            write_first in any::<bool>(),
        ) {
            let mut e = LockEntity::new(LockId::new("X").unwrap(), true);
            let deadline = Instant::now() + Duration::from_secs(3600);
            let c = ConnId::new(conn);
            if write_first {
                e.acquire_write(c, None, deadline);
                let before = e.is_write_locked();
                e.acquire_write(c, None, deadline);
                prop_assert_eq!(before, e.is_write_locked());
                prop_assert_eq!(e.reader_count(), 0);
            } else {
                e.acquire_read(c, None, deadline);
                let before = e.reader_count();
                e.acquire_read(c, None, deadline);
                prop_assert_eq!(before, e.reader_count());
            }
        }

        #[test]
        fn disconnect_purges_every_role_and_queue_slot(
            conn in 0..4u64,
            others in proptest::collection::vec(0..4u64, 0..6),
        ) {
            let mut e = LockEntity::new(LockId::new("X").unwrap(), true);
            let deadline = Instant::now() + Duration::from_secs(3600);
            let c = ConnId::new(conn);
            e.acquire_write(c, None, deadline);
            for other in &others {
                e.acquire_write(ConnId::new(*other), None, deadline);
                e.acquire_read(ConnId::new(*other), None, deadline);
            }
            e.disconnect_cleanup(c);
            // P5/I5: after disconnect processing, `conn` is absent from
            // every role and every queue.
            prop_assert_ne!(e.writer(), Some(c));
            prop_assert!(!e.readers.contains_key(&c));
            prop_assert!(!e.reader_queue.contains_conn(c));
            prop_assert!(!e.writer_queue.contains_conn(c));
        }
    }
}
