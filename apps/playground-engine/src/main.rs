//! Playground Engine Binary
//!
//! Reads one JSON request per line from stdin and writes one JSON response
//! per line to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! echo '{"type":"GetAccount","playground_id":"p-1"}' | cargo run --bin playground-engine -- --config config.yaml
//! ```
//!
//! # Exit codes
//!
//! `0` when every request succeeded, otherwise the code of the first
//! failure: `2` validation, `3` not found, `5` broker, `1` anything else.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: overrides `logging.level`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use playground_engine::config::{Config, load_config};
use playground_engine::observability::init_tracing;
use playground_engine::{
    Container, EngineError, EngineRequest, EngineResponse, InMemoryStore, MockBroker,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Time allowed for the reconciler to stop after stdin closes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type EngineContainer = Container<MockBroker, InMemoryStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = parse_args()?;
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging).context("initializing tracing")?;

    tracing::info!(config = ?config_path, "Starting playground engine");

    let container = create_container(&config)?;
    let hydrated = container.hydrate().await?;
    tracing::info!(
        playgrounds = hydrated.playgrounds,
        live_accounts = hydrated.live_accounts,
        "Startup state loaded"
    );

    let shutdown = CancellationToken::new();
    let reconciler = container.spawn_reconciler(shutdown.clone());

    let exit_code = serve(&container).await?;

    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, reconciler).await.is_err() {
        tracing::warn!("Reconciler did not stop in time");
    }
    tracing::info!(exit_code, "Playground engine stopped");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// `--config <path>` is the only flag.
fn parse_args() -> anyhow::Result<Option<String>> {
    let mut args = std::env::args().skip(1);
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config = Some(args.next().context("--config needs a path")?);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(config)
}

fn create_container(config: &Config) -> anyhow::Result<EngineContainer> {
    if !config.brokers.mock.enabled {
        bail!("no broker enabled; set brokers.mock.enabled");
    }
    let settings = config.engine_settings()?;
    let broker = Arc::new(MockBroker::from_config(&config.brokers.mock));
    let store = Arc::new(InMemoryStore::new());
    Ok(Container::new(broker, store, settings))
}

/// Handle requests until stdin closes. Returns the exit code.
async fn serve(container: &EngineContainer) -> anyhow::Result<i32> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut exit_code = 0;

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<EngineRequest>(&line) {
            Ok(request) => container.handle(request).await,
            Err(e) => Err(EngineError::validation(format!("malformed request: {e}"))),
        };
        let response = result.unwrap_or_else(|e| {
            if exit_code == 0 {
                exit_code = e.kind().exit_code();
            }
            EngineResponse::Error(e.to_response())
        });

        let mut out = serde_json::to_vec(&response).context("encoding response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }

    Ok(exit_code)
}
