//! videodown console front end
//!
//! Reads one command per line from stdin:
//! - a URL starts a negotiation
//! - `cancel` drops the current one
//! - anything else is a menu token (`category:muxed`, `pick:18`, ...)
//!
//! A line may start with `@<id> ` to act as a different identity. Every
//! outcome is printed as one JSON line. Commands for one identity run in the
//! order they were read; different identities run concurrently.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use videodown::downloader::tools::ToolManager;
use videodown::downloader::utils::is_valid_url;
use videodown::{join_task, Engine, EngineConfig, EngineError, Identity, MenuOutcome, YtDlpCli};

const DEFAULT_IDENTITY: Identity = Identity(0);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("videodown=info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::load().context("loading configuration")?;
    report_tools(config.ytdlp_path.as_deref());
    let capability = Arc::new(YtDlpCli::new(config.ytdlp_path.clone()));
    let engine = Arc::new(Engine::new(capability, config));

    let deliver_to = dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .context("no directory to deliver files into")?;
    info!(dir = %deliver_to.display(), "ready");

    let (output, mut printed) = mpsc::unbounded_channel::<Value>();
    let printer = tokio::spawn(async move {
        while let Some(line) = printed.recv().await {
            println!("{}", line);
        }
    });

    let mut dispatcher = Dispatcher::new(engine, deliver_to, output);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let (identity, command) = split_identity(&line);
        if command.is_empty() {
            continue;
        }
        dispatcher.dispatch(identity, command).await;
    }

    // finish whatever is queued before exiting
    dispatcher.shutdown().await;
    printer.await.context("output task failed")?;
    Ok(())
}

fn report_tools(ytdlp_override: Option<&str>) {
    if let Some(path) = ytdlp_override {
        info!(path, "yt-dlp path set by configuration");
    }
    for tool in ToolManager::new().get_all_tools() {
        match &tool.path {
            Some(path) => info!(
                tool = %tool.name,
                path = %path,
                version = tool.version.as_deref().unwrap_or("unknown"),
                "tool found"
            ),
            None => warn!(tool = %tool.name, "tool not found"),
        }
    }
}

/// `@42 pick:18` → (Identity(42), "pick:18")
fn split_identity(line: &str) -> (Identity, &str) {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('@') {
        if let Some((id, command)) = rest.split_once(char::is_whitespace) {
            if let Ok(id) = id.parse::<i64>() {
                return (Identity(id), command.trim());
            }
        }
    }
    (DEFAULT_IDENTITY, line)
}

struct Worker {
    queue: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Routes commands to one worker task per identity. `cancel` bypasses the
/// queue so it can interrupt a running acquisition.
struct Dispatcher {
    engine: Arc<Engine>,
    deliver_to: PathBuf,
    output: mpsc::UnboundedSender<Value>,
    workers: HashMap<Identity, Worker>,
}

impl Dispatcher {
    fn new(engine: Arc<Engine>, deliver_to: PathBuf, output: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            engine,
            deliver_to,
            output,
            workers: HashMap::new(),
        }
    }

    async fn dispatch(&mut self, identity: Identity, command: &str) {
        if command == "cancel" {
            let cancelled = self.engine.cancel(identity).await;
            emit(&self.output, json!({ "identity": identity, "cancelled": cancelled }));
            return;
        }

        let mut command = command.to_string();
        if let Some(worker) = self.workers.get(&identity) {
            match worker.queue.send(command) {
                Ok(()) => return,
                // worker is gone (it panicked); start a fresh one
                Err(mpsc::error::SendError(returned)) => command = returned,
            }
        }

        let worker = self.spawn_worker(identity);
        if worker.queue.send(command).is_err() {
            error!(%identity, "worker stopped before its first command");
        }
        self.workers.insert(identity, worker);
    }

    fn spawn_worker(&self, identity: Identity) -> Worker {
        let (queue, mut commands) = mpsc::unbounded_channel::<String>();
        let engine = self.engine.clone();
        let dir = self.deliver_to.clone();
        let output = self.output.clone();

        let handle = tokio::spawn(async move {
            debug!(%identity, "worker started");
            while let Some(command) = commands.recv().await {
                if is_valid_url(&command) {
                    match join_task(engine.spawn_submit_url(identity, command)).await {
                        Ok(view) => emit(&output, json!({ "identity": identity, "view": view })),
                        Err(e) => emit(&output, error_line(identity, &e)),
                    }
                } else {
                    match join_task(engine.spawn_select_menu_option(identity, command)).await {
                        Ok(outcome) => {
                            if let Some(line) = report(identity, outcome, dir.clone()).await {
                                emit(&output, line);
                            }
                        }
                        Err(e) => emit(&output, error_line(identity, &e)),
                    }
                }
            }
            debug!(%identity, "worker stopped");
        });

        Worker { queue, handle }
    }

    /// Close every queue and wait for the queued commands to finish
    async fn shutdown(self) {
        for (identity, worker) in self.workers {
            drop(worker.queue);
            if let Err(e) = worker.handle.await {
                error!(%identity, error = %e, "worker failed");
            }
        }
    }
}

async fn report(identity: Identity, outcome: MenuOutcome, dir: PathBuf) -> Option<Value> {
    match outcome {
        MenuOutcome::View(view) => Some(json!({ "identity": identity, "view": view })),
        MenuOutcome::Cancelled => Some(json!({ "identity": identity, "cancelled": true })),
        MenuOutcome::Delivered { target, result } => {
            let summary = result.summary();
            let persisted = tokio::task::spawn_blocking(move || result.persist_into(&dir)).await;
            match persisted {
                Ok(Ok(path)) => Some(json!({
                    "identity": identity,
                    "delivered": summary,
                    "target": target,
                    "path": path,
                })),
                Ok(Err(e)) => {
                    error!(%identity, error = %e, "failed to move download");
                    None
                }
                Err(e) => {
                    error!(%identity, error = %e, "delivery task failed");
                    None
                }
            }
        }
    }
}

fn error_line(identity: Identity, error: &EngineError) -> Value {
    json!({
        "identity": identity,
        "error": error,
        "message": error.to_string(),
    })
}

fn emit(output: &mpsc::UnboundedSender<Value>, line: Value) {
    if output.send(line).is_err() {
        warn!("output closed, dropping line");
    }
}
