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

use std::collections::VecDeque;
use std::time::Instant;

use super::id::{ConnId, Mode};
use super::Nonce;

/// An immutable descriptor of one pending acquire.
///
/// Created when an acquire cannot be granted immediately; destroyed on
/// grant, on timer expiry, on client disconnect, or (implicitly, since
/// there is no explicit cancel command) on being superseded by one of
/// those. Everything but its position in the owning [`WaiterQueue`] is
/// fixed at construction.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Monotonic id assigned by the registry, used to find this exact
    /// record again when its deadline timer fires.
    pub id: u64,
    pub conn: ConnId,
    pub nonce: Nonce,
    pub mode: Mode,
    pub deadline: Instant,
}

/// A FIFO sequence of [`RequestRecord`]s for one (lock, waiter-class) pair.
///
/// Enqueue and dequeue-head are O(1); removal by connection or by record id
/// is O(n), which is adequate for the modest per-lock waiter counts this
/// service expects (spec.md only requires O(1) insert-tail).
#[derive(Debug, Default)]
pub struct WaiterQueue(VecDeque<RequestRecord>);

impl WaiterQueue {
    pub fn new() -> Self {
        WaiterQueue(VecDeque::new())
    }

    pub fn push_back(&mut self, record: RequestRecord) {
        self.0.push_back(record);
    }

    pub fn pop_front(&mut self) -> Option<RequestRecord> {
        self.0.pop_front()
    }

    pub fn front(&self) -> Option<&RequestRecord> {
        self.0.front()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Removes and returns the record with the given id, if it is still
    /// queued. Used by `timeoutExpire` to make a late timer wakeup a no-op
    /// when the request was already granted or purged.
    pub fn remove_by_id(&mut self, id: u64) -> Option<RequestRecord> {
        let pos = self.0.iter().position(|r| r.id == id)?;
        self.0.remove(pos)
    }

    /// Removes every record belonging to `conn`. Used by disconnect cleanup.
    pub fn remove_all_by_conn(&mut self, conn: ConnId) -> Vec<RequestRecord> {
        let mut removed = Vec::new();
        self.0.retain(|r| {
            if r.conn == conn {
                removed.push(r.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// True if `conn` already has a pending request in this queue.
    pub fn contains_conn(&self, conn: ConnId) -> bool {
        self.0.iter().any(|r| r.conn == conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(id: u64, conn: u64, mode: Mode) -> RequestRecord {
        RequestRecord {
            id,
            conn: ConnId::new(conn),
            nonce: None,
            mode,
            deadline: Instant::now() + Duration::from_secs(1),
        }
    }

    #[test]
    fn fifo_order() {
        let mut q = WaiterQueue::new();
        q.push_back(record(1, 1, Mode::Read));
        q.push_back(record(2, 2, Mode::Read));
        assert_eq!(q.pop_front().unwrap().id, 1);
        assert_eq!(q.pop_front().unwrap().id, 2);
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn remove_by_id_is_noop_once_gone() {
        let mut q = WaiterQueue::new();
        q.push_back(record(1, 1, Mode::Write));
        assert!(q.remove_by_id(1).is_some());
        assert!(q.remove_by_id(1).is_none());
    }

    #[test]
    fn remove_all_by_conn_purges_every_match() {
        let mut q = WaiterQueue::new();
        q.push_back(record(1, 1, Mode::Read));
        q.push_back(record(2, 2, Mode::Read));
        q.push_back(record(3, 1, Mode::Read));
        let removed = q.remove_all_by_conn(ConnId::new(1));
        assert_eq!(removed.len(), 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.front().unwrap().conn, ConnId::new(2));
    }
}
