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

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lockd::config::Config;
use lockd::server::{core, listener};

#[tokio::main]
async fn main() -> lockd::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter.clone()))
        .init();

    let (tx, rx) = mpsc::unbounded_channel();

    let core_handle = tokio::spawn(core::run(rx, tx.clone(), config.clone()));
    listener::run(config.port, tx).await?;

    let _ = core_handle.await;
    Ok(())
}
