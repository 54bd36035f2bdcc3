//! Subcommand handlers.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use pams_core::{NewDataset, SubmitRequest, TaskFilter, TaskStatus};

use crate::{metrics, App};

/// Parse a `key=value` parameter. Values that are not valid JSON are taken
/// as plain strings.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in {raw:?}"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_json_pretty<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn add_dataset(
    app: &App,
    id: String,
    name: Option<String>,
    strain: Option<String>,
    file: Option<String>,
) -> Result<()> {
    let name = name.unwrap_or_else(|| id.clone());
    let mut dataset = NewDataset::new(id, name);
    if let Some(strain) = strain {
        dataset = dataset.with_strain(strain);
    }
    if let Some(file) = file {
        dataset = dataset.with_file_path(file);
    }

    let record = app
        .catalog
        .register(dataset)
        .context("Failed to register dataset")?;
    info!("Registered dataset {}", record.id);
    print_json(&record)
}

pub fn list_datasets(app: &App) -> Result<()> {
    for record in app.catalog.list().context("Failed to list datasets")? {
        print_json(&record)?;
    }
    Ok(())
}

/// Submit a task and stream its events as JSON lines until it is terminal.
///
/// Ctrl-C or SIGTERM cancels the task; the Cancelled event still prints.
pub async fn submit(
    app: &App,
    analysis_type: String,
    dataset_ids: Vec<String>,
    params: Vec<(String, serde_json::Value)>,
    show_metrics: bool,
) -> Result<()> {
    let mut request = SubmitRequest::new(analysis_type, dataset_ids);
    for (key, value) in params {
        request = request.with_parameter(key, value);
    }

    // Subscribe first so the Pending event is not missed.
    let mut events = app.orchestrator.subscribe();
    let task = app.orchestrator.submit(request)?;
    info!(
        "Submitted task {} ({} over {} datasets)",
        task.id,
        task.analysis_type,
        task.dataset_ids.len()
    );

    let interrupt = shutdown_signal();
    tokio::pin!(interrupt);
    let mut interrupted = false;

    let last = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.task_id == task.id => {
                    print_json(&event)?;
                    if event.is_terminal() {
                        break Some(event);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break None,
            },
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                info!("Interrupted, cancelling task {}", task.id);
                app.orchestrator.shutdown();
            }
        }
    };

    if show_metrics {
        eprint!("{}", metrics::encode_metrics(app)?);
    }

    // Fall back to the stored record if the terminal event was lagged away.
    let status = match last {
        Some(event) => event.status,
        None => app
            .orchestrator
            .get(&task.id)?
            .map(|t| t.status)
            .ok_or_else(|| anyhow!("Task {} disappeared", task.id))?,
    };

    match status {
        TaskStatus::Completed => Ok(()),
        TaskStatus::Failed => bail!("Task {} failed", task.id),
        TaskStatus::Cancelled => bail!("Task {} was cancelled", task.id),
        other => bail!("Task {} ended in unexpected state {}", task.id, other),
    }
}

pub fn list_tasks(app: &App, status: Option<TaskStatus>, limit: i64) -> Result<()> {
    let mut filter = TaskFilter::new().with_limit(limit);
    if let Some(status) = status {
        filter = filter.with_status(status);
    }
    for task in app.orchestrator.list(&filter)? {
        print_json(&task)?;
    }
    Ok(())
}

pub fn show_task(app: &App, task_id: &str) -> Result<()> {
    let task = app
        .orchestrator
        .get(task_id)?
        .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
    print_json_pretty(&task)
}

pub fn stats(app: &App, as_metrics: bool) -> Result<()> {
    if as_metrics {
        print!("{}", metrics::encode_metrics(app)?);
        return Ok(());
    }
    print_json_pretty(&app.orchestrator.stats()?)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
