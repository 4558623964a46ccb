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

use serde::Deserialize;

use crate::lock::{Mode, Nonce};

/// A decoded inbound command, already disentangled from which of the two
/// inbound syntaxes produced it. `lock_id` is intentionally left
/// unvalidated `String` here: [`crate::lock::LockId`] validation, and the
/// `CANNOTACQUIREINVALIDLOCKID` response it can produce, happen at dispatch
/// time (see `server::core`), not during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wisdom {
        nonce: Nonce,
    },
    Acquire {
        lock_id: Option<String>,
        mode: Mode,
        timeout_ms: Option<u64>,
        nonce: Nonce,
    },
    Release {
        lock_id: Option<String>,
        nonce: Nonce,
    },
    ReleaseAll {
        nonce: Nonce,
    },
    Show {
        nonce: Nonce,
    },
    Quit {
        nonce: Nonce,
    },
    /// The command token is not one of the recognized ones.
    Unknown,
}

/// Shape of the structured (JSON) inbound syntax.
#[derive(Debug, Deserialize)]
struct StructuredFrame {
    command: String,
    #[serde(rename = "lockId", default)]
    lock_id: Option<String>,
    #[serde(default)]
    mode: Option<Mode>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    nonce: Option<String>,
}

/// Parses one logical line (already newline-stripped) into a [`Command`].
///
/// A line that looks like a JSON object is decoded structurally. Anything
/// else, including a JSON value that isn't an object (e.g. a bare array
/// or scalar), falls through to the whitespace syntax: first token is the
/// command, second token (if present) is the lock id verbatim, and `mode`/
/// `timeout`/`nonce` are never surfaced by that syntax.
pub fn parse_frame(line: &str) -> Command {
    let line = line.trim();
    if let Ok(frame) = serde_json::from_str::<StructuredFrame>(line) {
        return from_structured(frame);
    }
    from_whitespace(line)
}

fn from_structured(frame: StructuredFrame) -> Command {
    build(
        &frame.command,
        frame.lock_id,
        frame.mode.unwrap_or_default(),
        frame.timeout,
        frame.nonce,
    )
}

fn from_whitespace(line: &str) -> Command {
    let mut tokens = line.split_whitespace();
    let Some(command) = tokens.next() else {
        return Command::Unknown;
    };
    let lock_id = tokens.next().map(str::to_owned);
    build(command, lock_id, Mode::default(), None, None)
}

fn build(
    command: &str,
    lock_id: Option<String>,
    mode: Mode,
    timeout_ms: Option<u64>,
    nonce: Nonce,
) -> Command {
    match command.to_ascii_uppercase().as_str() {
        "WISDOM" => Command::Wisdom { nonce },
        "ACQUIRE" | "LOCK" => Command::Acquire {
            lock_id,
            mode,
            timeout_ms,
            nonce,
        },
        "RELEASE" => Command::Release { lock_id, nonce },
        "RELEASEALL" => Command::ReleaseAll { nonce },
        "SHOW" => Command::Show { nonce },
        "QUIT" => Command::Quit { nonce },
        _ => Command::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_and_whitespace_acquire_agree_on_lock_id() {
        let structured = parse_frame(r#"{"command":"ACQUIRE","lockId":"HelloWorld"}"#);
        let whitespace = parse_frame("ACQUIRE HelloWorld");
        match (structured, whitespace) {
            (
                Command::Acquire { lock_id: a, .. },
                Command::Acquire { lock_id: b, .. },
            ) => assert_eq!(a, b),
            other => panic!("expected two Acquire commands, got {other:?}"),
        }
    }

    #[test]
    fn command_token_is_case_insensitive() {
        let quit = Command::Quit { nonce: None };
        assert_eq!(parse_frame("quit"), quit);
        assert_eq!(parse_frame("Quit"), quit);
        assert_eq!(parse_frame("QUIT"), quit);
    }

    #[test]
    fn unrecognized_command_token_is_unknown() {
        assert_eq!(parse_frame("DANCE X"), Command::Unknown);
    }

    #[test]
    fn malformed_json_falls_through_to_whitespace_syntax() {
        // Not valid JSON at all.
        let cmd = parse_frame("lock HelloWorld");
        assert_eq!(
            cmd,
            Command::Acquire {
                lock_id: Some("HelloWorld".to_string()),
                mode: Mode::Write,
                timeout_ms: None,
                nonce: None,
            }
        );
    }

    #[test]
    fn structured_syntax_carries_mode_timeout_and_nonce() {
        let cmd = parse_frame(
            r#"{"command":"ACQUIRE","lockId":"X","mode":"R","timeout":2000,"nonce":"abc"}"#,
        );
        assert_eq!(
            cmd,
            Command::Acquire {
                lock_id: Some("X".to_string()),
                mode: Mode::Read,
                timeout_ms: Some(2000),
                nonce: Some("abc".to_string()),
            }
        );
    }

    #[test]
    fn missing_lock_id_is_represented_not_rejected_by_the_parser() {
        let cmd = parse_frame(r#"{"command":"ACQUIRE"}"#);
        assert_eq!(
            cmd,
            Command::Acquire {
                lock_id: None,
                mode: Mode::Write,
                timeout_ms: None,
                nonce: None,
            }
        );
    }
}
