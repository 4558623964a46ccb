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

//! Wire protocol: one newline-terminated frame in, one newline-terminated
//! JSON frame out.
//!
//! Inbound frames accept two syntaxes on the same socket (spec.md §6.2): a
//! single JSON object, or a whitespace-separated `command lockId` pair for
//! interactive testing with `telnet`/`nc`. A line that fails structured
//! parsing falls through to the whitespace interpretation rather than being
//! rejected outright.

mod command;
mod response;

pub use command::{parse_frame, Command};
pub use response::{LockRow, Response, Status};
