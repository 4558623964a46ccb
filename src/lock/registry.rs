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

use super::entity::{AcquireOutcome, Grant, LockEntity, ReleaseOutcome};
use super::id::{ConnId, LockId};
use super::Nonce;

/// One row of a [`Registry::show`] snapshot.
///
/// The source project's `SHOW` only ever carried a lock id; this crate adds
/// the richer fields spec.md's Open Question in §9 invites (mode, holder
/// count, waiter counts) while keeping the lock id as the only field older
/// clients can rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub lock_id: LockId,
    pub writer: Option<ConnId>,
    pub reader_count: usize,
    pub reader_waiters: usize,
    pub writer_waiters: usize,
}

/// A single acquire's outcome as seen by the registry: immediate grant,
/// or queued with the record id a deadline timer should be armed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Granted,
    Pending { record_id: u64 },
}

/// Owns every [`LockEntity`] by lock id, creating on first reference and
/// deleting on abandonment (invariant I4). This is the only type that
/// touches the `lockId -> LockEntity` map; every method assumes it runs
/// inside the single serialization domain.
#[derive(Debug, Default)]
pub struct Registry {
    locks: HashMap<LockId, LockEntity>,
    /// Default policy for newly created entities, derived from server
    /// configuration rather than from any per-acquire protocol field (see
    /// spec.md §9's reader-greed Open Question).
    default_greedy: bool,
}

impl Registry {
    pub fn new(default_greedy: bool) -> Self {
        Registry {
            locks: HashMap::new(),
            default_greedy,
        }
    }

    fn entity_mut(&mut self, lock_id: &LockId) -> &mut LockEntity {
        self.locks
            .entry(lock_id.clone())
            .or_insert_with(|| LockEntity::new(lock_id.clone(), self.default_greedy))
    }

    /// Removes `lock_id` if its entity has become abandoned. Safe to call
    /// even if there is no entity for `lock_id`.
    fn cleanup(&mut self, lock_id: &LockId) {
        if self.locks.get(lock_id).is_some_and(LockEntity::is_abandoned) {
            self.locks.remove(lock_id);
        }
    }

    pub fn acquire_read(
        &mut self,
        lock_id: &LockId,
        conn: ConnId,
        nonce: Nonce,
        deadline: Instant,
    ) -> AcquireResult {
        let (outcome, record_id) = self.entity_mut(lock_id).acquire_read(conn, nonce, deadline);
        match outcome {
            AcquireOutcome::Granted => AcquireResult::Granted,
            AcquireOutcome::Pending => AcquireResult::Pending {
                record_id: record_id.expect("pending acquire always yields a record id"),
            },
        }
    }

    pub fn acquire_write(
        &mut self,
        lock_id: &LockId,
        conn: ConnId,
        nonce: Nonce,
        deadline: Instant,
    ) -> AcquireResult {
        let (outcome, record_id) = self.entity_mut(lock_id).acquire_write(conn, nonce, deadline);
        match outcome {
            AcquireOutcome::Granted => AcquireResult::Granted,
            AcquireOutcome::Pending => AcquireResult::Pending {
                record_id: record_id.expect("pending acquire always yields a record id"),
            },
        }
    }

    /// A release against an id with no entity lazily creates one (to
    /// delegate to the same `release` code path) and then immediately
    /// cleans it up, yielding `NoLockToRelease`. This is deliberately kept
    /// (spec.md §9) rather than special-cased, because it keeps the code
    /// uniform; callers must never observe the transient entity through
    /// `show`, which is guaranteed here because cleanup runs before this
    /// function returns.
    pub fn release(&mut self, lock_id: &LockId, conn: ConnId) -> (ReleaseOutcome, Vec<Grant>) {
        let result = self.entity_mut(lock_id).release(conn);
        self.cleanup(lock_id);
        result
    }

    /// Releases whatever `conn` holds across every entity. Per-entity
    /// misses are silent; the caller decides whether to emit a single
    /// aggregate "nothing was held" response via the returned `released_any`
    /// flag combined with its own `report_if_empty` policy.
    pub fn release_all(&mut self, conn: ConnId) -> (bool, Vec<Grant>) {
        let mut released_any = false;
        let mut grants = Vec::new();
        let ids: Vec<LockId> = self.locks.keys().cloned().collect();
        for lock_id in &ids {
            let Some(entity) = self.locks.get_mut(lock_id) else {
                continue;
            };
            let (outcome, entity_grants) = entity.release(conn);
            if matches!(outcome, ReleaseOutcome::Released(..)) {
                released_any = true;
            }
            grants.extend(entity_grants);
            self.cleanup(lock_id);
        }
        (released_any, grants)
    }

    /// Purges `conn` from every entity (held locks, queued requests), with
    /// no outbound message for `conn` itself. Returns grants produced by
    /// the resulting abdication so the caller can notify promoted waiters.
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Grant> {
        let mut grants = Vec::new();
        let ids: Vec<LockId> = self.locks.keys().cloned().collect();
        for lock_id in &ids {
            let Some(entity) = self.locks.get_mut(lock_id) else {
                continue;
            };
            grants.extend(entity.disconnect_cleanup(conn));
            self.cleanup(lock_id);
        }
        grants
    }

    /// Forwards a deadline-timer wakeup to the owning entity, if it still
    /// exists. Returns the expired [`RequestRecord`] only when it was still
    /// queued (i.e. the timeout is real, not a stale wakeup for a request
    /// that already got granted, cancelled by disconnect, or expired once
    /// already, in which case this is a no-op and returns `None`).
    pub fn timeout_expire(
        &mut self,
        lock_id: &LockId,
        record_id: u64,
    ) -> Option<super::queue::RequestRecord> {
        let entity = self.locks.get_mut(lock_id)?;
        let record = entity.timeout_expire(record_id)?;
        self.cleanup(lock_id);
        Some(record)
    }

    /// One row per currently held-or-waited-on lock id. Entities that were
    /// lazily created and then abandoned by a release never appear here,
    /// because `cleanup` always runs before `show` can observe them.
    pub fn show(&self) -> Vec<LockSnapshot> {
        let mut rows: Vec<LockSnapshot> = self
            .locks
            .values()
            .map(|entity| LockSnapshot {
                lock_id: entity.id().clone(),
                writer: entity.writer(),
                reader_count: entity.reader_count(),
                reader_waiters: entity.reader_queue_len(),
                writer_waiters: entity.writer_queue_len(),
            })
            .collect();
        rows.sort_by(|a, b| a.lock_id.as_str().cmp(b.lock_id.as_str()));
        rows
    }

    #[cfg(test)]
    pub fn entity_count(&self) -> usize {
        self.locks.len()
    }
}
