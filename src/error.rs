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

//! Process-level failures: the only two things that can stop `lockd` from
//! running at all. Everything reachable from a client command is instead
//! absorbed into a status code (see [`crate::protocol::Status`]) or
//! silently swallowed, per spec.md §7: it never becomes an `Error`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration for {var}: {reason}")]
    Config { var: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
