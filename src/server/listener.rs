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

//! TCP accept loop. Assigns each inbound connection a monotonically
//! increasing [`ConnId`] (never reused, so a reconnect from the same peer
//! never aliases a `ConnId` still referenced by the registry) and spawns its
//! connection task.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::lock::ConnId;

use super::connection;
use super::core::Event;

/// Binds `port` and runs the accept loop until the socket errors out.
///
/// Each accepted connection is handed its own task (see
/// [`connection::handle`]); this function itself never touches lock state,
/// it only ever produces [`Event::Accepted`]/[`Event::Frame`]/
/// [`Event::Disconnected`] values for the single registry actor.
pub async fn run(port: u16, tx: mpsc::UnboundedSender<Event>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| Error::Bind { port, source })?;

    let next_conn_id = AtomicU64::new(1);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "accept failed, continuing");
                continue;
            }
        };

        let conn = ConnId::new(next_conn_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%conn, %peer, "connection accepted");
        connection::spawn(conn, stream, tx.clone());
    }
}
