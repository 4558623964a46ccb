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

use std::fmt;

/// A non-empty, case-sensitive lock identifier.
///
/// Equality is bytewise, which `derive(PartialEq, Eq, Hash)` on a `String`
/// already gives us; the only thing this newtype adds over a bare `String`
/// is the constructor-time validation spec'd for `LockId`: no embedded
/// whitespace and no embedded newline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(String);

/// Why a candidate string could not become a [`LockId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockIdError {
    #[error("lock id must not be empty")]
    Empty,
    #[error("lock id must not contain whitespace")]
    ContainsWhitespace,
}

impl LockId {
    pub fn new(raw: impl Into<String>) -> Result<Self, LockIdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(LockIdError::Empty);
        }
        if raw.chars().any(|c| c.is_whitespace()) {
            return Err(LockIdError::ContainsWhitespace);
        }
        Ok(LockId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of one TCP connection.
///
/// Comparable by value, not by remote address: a reconnect from the same
/// peer is a brand new `ConnId`, assigned from a monotonically increasing
/// counter in [`crate::server::listener`] that is never reused, so value
/// equality here is equivalent to the reference-identity spec.md asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub fn new(id: u64) -> Self {
        ConnId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Read or write access to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "W")]
    Write,
}

impl Default for Mode {
    /// `ACQUIRE` without a `mode` field defaults to write, per spec.
    fn default() -> Self {
        Mode::Write
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => f.write_str("R"),
            Mode::Write => f.write_str("W"),
        }
    }
}
