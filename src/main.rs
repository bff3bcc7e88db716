mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use rescue_workflow::audit::audit_snapshot;
use rescue_workflow::config::WorkflowConfig;
use rescue_workflow::engine::WorkflowEngine;
use rescue_workflow::notify::{
    ChannelDispatcher, DeliveryPolicy, DeliveryWorker, LogSink, WebhookSink,
};
use rescue_workflow::script::{Script, run_script};
use rescue_workflow::store::{InMemoryCaseStore, StoreSnapshot};
use ui::ScriptProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            WorkflowConfig::load_from(path)?
        }
        None => WorkflowConfig::load()?,
    };
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }

    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Demo => run_workflow(&config, Script::demo()?, None, None).await,
        Command::Run {
            file,
            snapshot_in,
            snapshot_out,
        } => {
            let script = Script::load(&file)?;
            let seed = snapshot_in.as_deref().map(read_snapshot).transpose()?;
            run_workflow(&config, script, seed, snapshot_out.as_deref()).await
        }
        Command::Verify { snapshot } => verify(&snapshot),
    }
}

/// `RUST_LOG` wins; otherwise `--verbose`, otherwise the configured filter.
fn init_tracing(config: &WorkflowConfig, verbose: bool) {
    let fallback = if verbose {
        "rescue_workflow=debug"
    } else {
        config.log_filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_workflow(
    config: &WorkflowConfig,
    script: Script,
    seed: Option<StoreSnapshot>,
    snapshot_out: Option<&Path>,
) -> Result<()> {
    let (dispatcher, rx) = ChannelDispatcher::new(config.notifications.queue_capacity);
    let policy = DeliveryPolicy::from(&config.notifications);
    let worker = match &config.notifications.webhook_url {
        Some(url) => {
            info!(url = %url, "delivering notifications to webhook");
            DeliveryWorker::spawn(rx, WebhookSink::new(url.clone())?, policy)
        }
        None => DeliveryWorker::spawn(rx, LogSink, policy),
    };

    let store = seed.map(InMemoryCaseStore::from_snapshot).unwrap_or_default();
    let engine = Arc::new(WorkflowEngine::from_config(store, dispatcher, config));

    let progress = ScriptProgress::start(script.steps.len());
    let run = run_script(engine.clone(), script, |outcome| progress.step(outcome)).await?;
    progress.finish(run.failures());

    for (alias, case_id) in &run.aliases {
        let case = engine.get_case(case_id).await?;
        let timeline = engine.get_timeline(case_id).await?;
        ui::print_timeline(alias, &case, &timeline);
    }

    if let Some(path) = snapshot_out {
        let snapshot = engine.store().snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(path = %path.display(), cases = snapshot.cases.len(), "snapshot written");
    }

    // Dropping the last engine handle closes the queue so the worker can drain it.
    drop(engine);
    let stats = worker.await.context("notification worker panicked")?;
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        "notifications flushed"
    );

    Ok(())
}

fn verify(path: &Path) -> Result<()> {
    let snapshot = read_snapshot(path)?;
    let reports = audit_snapshot(&snapshot);
    let dirty = ui::print_audit(&reports);
    if dirty > 0 {
        bail!("{dirty} inconsistent case(s) in {}", path.display());
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing snapshot {}", path.display()))
}
