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

//! Start-of-process configuration, loaded once from the environment.
//!
//! spec.md §6.5 calls for exactly three knobs (listen port, default request
//! timeout, default reader-greed flag); `LOCKD_LOG` is this crate's own
//! addition for its `tracing` setup and is not part of the lock protocol.
//! There is no runtime reconfiguration, per spec.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 11311;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_GREEDY: bool = true;
const DEFAULT_LOG: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub default_timeout: Duration,
    pub default_greedy: bool,
    pub log_filter: String,
}

impl Config {
    /// Reads `LOCKD_PORT`, `LOCKD_DEFAULT_TIMEOUT_MS`, `LOCKD_DEFAULT_GREEDY`,
    /// and `LOCKD_LOG` from the environment, falling back to documented
    /// defaults when a variable is unset.
    pub fn from_env() -> Result<Self> {
        let port = parse_env("LOCKD_PORT", DEFAULT_PORT)?;
        let default_timeout_ms = parse_env("LOCKD_DEFAULT_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        let default_greedy = parse_env("LOCKD_DEFAULT_GREEDY", DEFAULT_GREEDY)?;
        let log_filter =
            env::var("LOCKD_LOG").unwrap_or_else(|_| DEFAULT_LOG.to_string());

        Ok(Config {
            port,
            default_timeout: Duration::from_millis(default_timeout_ms),
            default_greedy,
            log_filter,
        })
    }
}

fn parse_env<T>(var: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| Error::Config {
            var,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(Error::Config {
            var,
            reason: "value is not valid UTF-8".to_string(),
        }),
    }
}
