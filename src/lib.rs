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

//! `lockd`: a single-process TCP service that hands out named reader/writer
//! locks to whichever connections ask for them.
//!
//! The crate is organized around the single serialization domain described
//! in [`server::core`]: [`lock`] is the pure state machine, [`protocol`] is
//! the wire format, and [`server`] wires both to a [`tokio::net::TcpListener`].

pub mod config;
pub mod error;
pub mod lock;
pub mod protocol;
pub mod server;
pub mod wisdom;

pub use error::{Error, Result};
