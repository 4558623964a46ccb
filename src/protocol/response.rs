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

use serde::Serialize;

use crate::lock::{LockSnapshot, Mode};

/// Every outbound `status` value spec.md §6.3 defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "IMUSTBLOCKYOU")]
    ImustBlockYou,
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "LOCKPENDING")]
    LockPending,
    #[serde(rename = "RELEASED")]
    Released,
    #[serde(rename = "ACQUIRETIMEOUT")]
    AcquireTimeout,
    #[serde(rename = "NOLOCKTORELEASE")]
    NoLockToRelease,
    #[serde(rename = "NOLOCKSTORELEASEALL")]
    NoLocksToReleaseAll,
    #[serde(rename = "CANNOTACQUIREINVALIDLOCKID")]
    CannotAcquireInvalidLockId,
    #[serde(rename = "SHOW")]
    Show,
    #[serde(rename = "WISDOM")]
    Wisdom,
    #[serde(rename = "GOINPIECES")]
    GoInPieces,
    #[serde(rename = "COMMANDNOTFOUND")]
    CommandNotFound,
}

/// A row of a `SHOW` payload.
///
/// The source project's `SHOW` carried only `lockId`; this adds the richer
/// fields spec.md's Open Question in §9 invites. `write_locked` stands in
/// for "mode" (there is no single mode once a lock is unheld), and the
/// reader/writer counts cover "holder count, waiter count".
#[derive(Debug, Clone, Serialize)]
pub struct LockRow {
    #[serde(rename = "lockId")]
    pub lock_id: String,
    #[serde(rename = "writeLocked")]
    pub write_locked: bool,
    #[serde(rename = "readerCount")]
    pub reader_count: usize,
    #[serde(rename = "readerWaiters")]
    pub reader_waiters: usize,
    #[serde(rename = "writerWaiters")]
    pub writer_waiters: usize,
}

impl From<LockSnapshot> for LockRow {
    fn from(s: LockSnapshot) -> Self {
        LockRow {
            lock_id: s.lock_id.as_str().to_string(),
            write_locked: s.writer.is_some(),
            reader_count: s.reader_count,
            reader_waiters: s.reader_waiters,
            writer_waiters: s.writer_waiters,
        }
    }
}

/// One outbound frame. Serialized as a single newline-terminated JSON
/// object; absent optional fields are omitted rather than emitted as
/// `null`, matching the terse style of the rest of the protocol.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status: Status,
    #[serde(rename = "lockId", skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nonce: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locks: Option<Vec<LockRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Response {
            status,
            lock_id: None,
            mode: None,
            nonce: Vec::new(),
            locks: None,
            message: None,
        }
    }

    pub fn with_lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        if let Some(n) = nonce {
            self.nonce.push(n);
        }
        self
    }

    pub fn with_nonces(mut self, nonces: impl IntoIterator<Item = String>) -> Self {
        self.nonce.extend(nonces);
        self
    }

    pub fn with_locks(mut self, locks: Vec<LockRow>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Serializes to a single newline-terminated JSON line, ready to be
    /// written straight to a socket.
    pub fn to_frame(&self) -> String {
        let mut s = serde_json::to_string(self).expect("Response always serializes");
        s.push('\n');
        s
    }
}
