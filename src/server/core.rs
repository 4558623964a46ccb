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

//! The single serialization domain: one Tokio task that owns the
//! [`Registry`] and every connection's outbound channel.
//!
//! Every state-changing event (a parsed command, a deadline timer firing,
//! a disconnect) flows through the `mpsc` channel this module owns and is
//! handled one at a time in [`run`]'s loop. Nothing here needs a `Mutex` or
//! an atomic: there is exactly one caller, matching spec.md §5.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Config;
use crate::lock::{AcquireResult, ConnId, Grant, LockId, Mode, Nonce, Registry, ReleaseOutcome};
use crate::protocol::{Command, LockRow, Response, Status};

/// A frame destined for one connection's writer, or an instruction to send
/// whatever is already queued and then shut the socket down.
#[derive(Debug, Clone)]
pub enum ConnMsg {
    Data(String),
    Close,
}

/// Everything that can change registry state, unified into one stream so
/// the core loop never needs to pick between multiple receivers.
#[derive(Debug)]
pub enum Event {
    Accepted {
        conn: ConnId,
        outbox: mpsc::UnboundedSender<ConnMsg>,
    },
    Frame {
        conn: ConnId,
        command: Command,
    },
    TimerFired {
        lock_id: LockId,
        record_id: u64,
    },
    Disconnected {
        conn: ConnId,
    },
}

struct Core {
    registry: Registry,
    outboxes: HashMap<ConnId, mpsc::UnboundedSender<ConnMsg>>,
    default_timeout: Duration,
}

/// Runs the registry actor until its event channel is closed (which only
/// happens once every listener/connection task referencing `tx` has been
/// dropped, in practice for the lifetime of the process).
pub async fn run(
    mut rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
    config: Config,
) {
    let mut core = Core {
        registry: Registry::new(config.default_greedy),
        outboxes: HashMap::new(),
        default_timeout: config.default_timeout,
    };

    while let Some(event) = rx.recv().await {
        core.handle(event, &tx);
    }
}

impl Core {
    fn handle(&mut self, event: Event, tx: &mpsc::UnboundedSender<Event>) {
        match event {
            Event::Accepted { conn, outbox } => self.on_accepted(conn, outbox),
            Event::Frame { conn, command } => self.on_frame(conn, command, tx),
            Event::TimerFired { lock_id, record_id } => self.on_timer_fired(lock_id, record_id),
            Event::Disconnected { conn } => self.on_disconnected(conn),
        }
    }

    fn send_to(&self, conn: ConnId, response: Response) {
        if let Some(outbox) = self.outboxes.get(&conn) {
            // Best-effort: a dead socket's send fails silently here and is
            // cleaned up when its own Disconnected event arrives.
            let _ = outbox.send(ConnMsg::Data(response.to_frame()));
        }
    }

    fn deliver_grants(&self, grants: Vec<Grant>) {
        for grant in grants {
            debug!(lock_id = %grant.lock_id, conn = %grant.conn, mode = ?grant.mode, "abdication grant");
            let resp = Response::new(Status::Locked)
                .with_lock_id(grant.lock_id.as_str())
                .with_mode(grant.mode)
                .with_nonce(grant.nonce);
            self.send_to(grant.conn, resp);
        }
    }

    fn on_accepted(&mut self, conn: ConnId, outbox: mpsc::UnboundedSender<ConnMsg>) {
        info!(%conn, "accepted connection");
        self.outboxes.insert(conn, outbox);
        self.send_to(conn, Response::new(Status::ImustBlockYou).with_message("lockd"));
    }

    fn on_disconnected(&mut self, conn: ConnId) {
        info!(%conn, "connection closed");
        self.outboxes.remove(&conn);
        let grants = self.registry.disconnect(conn);
        self.deliver_grants(grants);
    }

    fn on_timer_fired(&mut self, lock_id: LockId, record_id: u64) {
        let Some(record) = self.registry.timeout_expire(&lock_id, record_id) else {
            // Stale wakeup: already granted, released-into, or purged by a
            // disconnect. Spec.md §5 requires this to be a silent no-op.
            return;
        };
        debug!(
            %lock_id,
            conn = %record.conn,
            overdue_by = ?record.deadline.elapsed(),
            "acquire timed out"
        );
        let resp = Response::new(Status::AcquireTimeout)
            .with_lock_id(lock_id.as_str())
            .with_mode(record.mode)
            .with_nonce(record.nonce);
        self.send_to(record.conn, resp);
    }

    fn on_frame(&mut self, conn: ConnId, command: Command, tx: &mpsc::UnboundedSender<Event>) {
        match command {
            Command::Wisdom { nonce } => {
                let resp = Response::new(Status::Wisdom)
                    .with_message(crate::wisdom::next())
                    .with_nonce(nonce);
                self.send_to(conn, resp);
            }
            Command::Acquire {
                lock_id,
                mode,
                timeout_ms,
                nonce,
            } => self.on_acquire(conn, lock_id, mode, timeout_ms, nonce, tx),
            Command::Release { lock_id, nonce } => self.on_release(conn, lock_id, nonce),
            Command::ReleaseAll { nonce } => self.on_release_all(conn, nonce, true),
            Command::Show { nonce } => self.on_show(conn, nonce),
            Command::Quit { nonce } => self.on_quit(conn, nonce),
            Command::Unknown => {
                self.send_to(conn, Response::new(Status::CommandNotFound));
            }
        }
    }

    fn on_acquire(
        &mut self,
        conn: ConnId,
        lock_id: Option<String>,
        mode: Mode,
        timeout_ms: Option<u64>,
        nonce: Nonce,
        tx: &mpsc::UnboundedSender<Event>,
    ) {
        let Some(lock_id) = lock_id.and_then(|raw| LockId::new(raw).ok()) else {
            self.send_to(
                conn,
                Response::new(Status::CannotAcquireInvalidLockId).with_nonce(nonce),
            );
            return;
        };

        let timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout;

        let result = match mode {
            Mode::Read => self
                .registry
                .acquire_read(&lock_id, conn, nonce.clone(), deadline),
            Mode::Write => self
                .registry
                .acquire_write(&lock_id, conn, nonce.clone(), deadline),
        };

        match result {
            AcquireResult::Granted => {
                let resp = Response::new(Status::Locked)
                    .with_lock_id(lock_id.as_str())
                    .with_mode(mode)
                    .with_nonce(nonce);
                self.send_to(conn, resp);
            }
            AcquireResult::Pending { record_id } => {
                let resp = Response::new(Status::LockPending)
                    .with_lock_id(lock_id.as_str())
                    .with_mode(mode)
                    .with_nonce(nonce);
                self.send_to(conn, resp);
                arm_timer(tx.clone(), lock_id, record_id, timeout);
            }
        }
    }

    fn on_release(&mut self, conn: ConnId, lock_id: Option<String>, nonce: Nonce) {
        // spec.md only specifies CANNOTACQUIREINVALIDLOCKID for ACQUIRE; a
        // RELEASE naming no resolvable lock id can't match any held lock
        // either, so it collapses to the same outcome as releasing an id
        // that simply isn't held.
        let Some(lock_id) = lock_id.and_then(|raw| LockId::new(raw).ok()) else {
            self.send_to(
                conn,
                Response::new(Status::NoLockToRelease).with_nonce(nonce),
            );
            return;
        };

        let (outcome, grants) = self.registry.release(&lock_id, conn);
        self.deliver_grants(grants);

        let resp = match outcome {
            // Order matters: the holder's original acquire nonce first,
            // then the release's own nonce (spec.md §6.4).
            ReleaseOutcome::Released(mode, holder_nonce) => Response::new(Status::Released)
                .with_lock_id(lock_id.as_str())
                .with_mode(mode)
                .with_nonces(holder_nonce.into_iter().chain(nonce)),
            ReleaseOutcome::NoLockToRelease => Response::new(Status::NoLockToRelease)
                .with_lock_id(lock_id.as_str())
                .with_nonce(nonce),
        };
        self.send_to(conn, resp);
    }

    fn on_release_all(&mut self, conn: ConnId, nonce: Nonce, report_if_empty: bool) {
        let (released_any, grants) = self.registry.release_all(conn);
        self.deliver_grants(grants);
        if !released_any && report_if_empty {
            self.send_to(
                conn,
                Response::new(Status::NoLocksToReleaseAll).with_nonce(nonce),
            );
        }
    }

    fn on_show(&mut self, conn: ConnId, nonce: Nonce) {
        let rows = self
            .registry
            .show()
            .into_iter()
            .map(LockRow::from)
            .collect();
        let resp = Response::new(Status::Show).with_locks(rows).with_nonce(nonce);
        self.send_to(conn, resp);
    }

    fn on_quit(&mut self, conn: ConnId, nonce: Nonce) {
        // suppress-empty: QUIT never emits NOLOCKSTORELEASEALL.
        self.on_release_all(conn, None, false);
        self.send_to(conn, Response::new(Status::GoInPieces).with_nonce(nonce));
        if let Some(outbox) = self.outboxes.remove(&conn) {
            let _ = outbox.send(ConnMsg::Close);
        }
    }
}

/// Spawns the deadline timer for one queued request. The wakeup re-enters
/// the single registry actor as a plain event; it never closes over the
/// lock entity directly, which is what spec.md §9 calls out as the bug to
/// avoid (the source's callback closed over its own lexical scope instead
/// of the owning entity, so a re-grant at timeout silently failed).
fn arm_timer(tx: mpsc::UnboundedSender<Event>, lock_id: LockId, record_id: u64, timeout: Duration) {
    tokio::spawn(async move {
        sleep(timeout).await;
        let _ = tx.send(Event::TimerFired { lock_id, record_id });
    });
}
