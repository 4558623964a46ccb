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

//! Per-connection task: one task per socket, bridging line-based I/O to the
//! registry actor's event channel.
//!
//! A single task owns both directions instead of splitting read/write into
//! separate tasks, so that `QUIT`'s close sequence (send the last frame,
//! then drop the socket) can't race a concurrent writer task still
//! flushing: `tokio::select!` between "next inbound line" and "next
//! outbound push" keeps both directions on one `TcpStream` value.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::lock::ConnId;
use crate::protocol::parse_frame;

use super::core::{ConnMsg, Event};

/// Spawns the task that owns `stream` for the lifetime of the connection.
pub fn spawn(conn: ConnId, stream: TcpStream, core_tx: mpsc::UnboundedSender<Event>) {
    tokio::spawn(async move {
        run(conn, stream, core_tx).await;
    });
}

async fn run(conn: ConnId, stream: TcpStream, core_tx: mpsc::UnboundedSender<Event>) {
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ConnMsg>();
    if core_tx
        .send(Event::Accepted {
            conn,
            outbox: outbox_tx,
        })
        .is_err()
    {
        // Core is gone; nothing left to serve.
        return;
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let command = parse_frame(&line);
                        if core_tx.send(Event::Frame { conn, command }).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // peer closed its write half
                    Err(_) => break,   // malformed UTF-8 or I/O error
                }
            }
            msg = outbox_rx.recv() => {
                match msg {
                    Some(ConnMsg::Data(frame)) => {
                        if write_half.write_all(frame.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Some(ConnMsg::Close) | None => break,
                }
            }
        }
    }

    let _ = core_tx.send(Event::Disconnected { conn });
}
