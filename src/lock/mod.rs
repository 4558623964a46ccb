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

//! The lock coordinator: per-key reader/writer state machines and the
//! registry that owns them.
//!
//! This module is the hard part of `lockd`. Everything in here runs from
//! exactly one owning task (see [`crate::server::core`]), so none of it
//! needs internal locking: the single caller *is* the serialization domain.

mod entity;
mod id;
mod queue;
mod registry;

pub use entity::{AcquireOutcome, Grant, LockEntity, ReleaseOutcome};
pub use id::{ConnId, LockId, LockIdError, Mode};
pub use queue::{RequestRecord, WaiterQueue};
pub use registry::{AcquireResult, LockSnapshot, Registry};

/// Opaque correlation token a client may attach to a request; echoed back
/// verbatim on responses tied to that request.
pub type Nonce = Option<String>;
