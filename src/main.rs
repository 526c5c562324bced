//! entity-sync command line entry point.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use entity_sync::cli::list::{DocumentListArgs, TaskListArgs, TaskView};
use entity_sync::cli::{Cli, Command, DeleteArgs, Resource};
use entity_sync::config::{AppConfig, ConfigLoader, MutationPolicy, PollConfig};
use entity_sync::dashboard::{DashboardServer, start_server};
use entity_sync::format::{self, OutputFormat};
use entity_sync::gateway::{HttpGateway, RemoteGateway};
use entity_sync::logging::{self, LogTarget};
use entity_sync::mutations::{MutationCoordinator, MutationReport};
use entity_sync::store::EntityStore;
use entity_sync::sync::{PollOutcome, SyncScheduler};
use entity_sync::types::{Document, Entity, NewTask, Task};
use entity_sync::views::{DocumentStats, TaskStats};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let config = load_config(&cli)?;

    match cli.command {
        Command::Tasks(args) => run_tasks(&config, &args).await,
        Command::Documents(args) => run_documents(&config, &args).await,
        Command::Create(args) => {
            let format = args.format.into();
            run_create(&config, NewTask::from(args), format).await
        }
        Command::Move { id, status, format } => {
            let tasks = task_mirror(&config)?;
            refresh(&tasks).await?;
            print_task_report(&tasks.move_to_column(&id, status).await?, format.into())
        }
        Command::Progress {
            id,
            progress,
            notes,
            format,
        } => {
            let tasks = task_mirror(&config)?;
            refresh(&tasks).await?;
            print_task_report(&tasks.update_progress(&id, progress, notes).await?, format.into())
        }
        Command::Delete(args) => run_delete(&config, args).await,
        Command::Watch { resource } => run_watch(&config, resource).await,
        Command::Serve { port } => run_serve(&config, port).await,
    }
}

/// Load tiered configuration, then apply CLI overrides.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let loader = ConfigLoader::load(cli.config.as_ref().map(Into::into))?;

    for (tier, path) in loader.sources() {
        debug!(%tier, path = %path.display(), "config tier loaded");
    }
    if let Some(path) = loader.config_path() {
        info!("Config: {}", path.display());
    }
    debug!(base_url = %loader.config().remote.base_url, "remote service");

    let mut config = loader.into_config();
    if let Some(url) = &cli.base_url {
        config.remote.base_url = url.clone();
    }
    if let Some(user) = &cli.user_id {
        config.remote.user_id = user.clone();
    }
    Ok(config)
}

/// Store, scheduler and coordinator for one resource.
fn mirror<G: RemoteGateway>(
    gateway: G,
    poll: PollConfig,
    policy: &MutationPolicy,
) -> Arc<MutationCoordinator<G>> {
    let scheduler = SyncScheduler::new(Arc::new(gateway), Arc::new(EntityStore::new()), poll);
    Arc::new(MutationCoordinator::new(scheduler, policy.clone()))
}

fn task_mirror(config: &AppConfig) -> Result<Arc<MutationCoordinator<HttpGateway<Task>>>> {
    let gateway = HttpGateway::<Task>::new(&config.remote)?;
    Ok(mirror(gateway, config.sync.tasks.clone(), &config.mutations))
}

fn document_mirror(config: &AppConfig) -> Result<Arc<MutationCoordinator<HttpGateway<Document>>>> {
    let gateway = HttpGateway::<Document>::new(&config.remote)?;
    Ok(mirror(gateway, config.sync.documents.clone(), &config.mutations))
}

/// Fetch once; a failed fetch is fatal for one-shot commands.
async fn refresh<G: RemoteGateway>(coordinator: &MutationCoordinator<G>) -> Result<()> {
    match coordinator.scheduler().poll_once().await {
        PollOutcome::Failed(err) => {
            Err(err).with_context(|| format!("failed to fetch {}", G::Item::RESOURCE))
        }
        _ => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task_report(report: &MutationReport<Task>, format: OutputFormat) -> Result<()> {
    println!(
        "{}",
        format::render(report, format, format::format_task_report_markdown)?
    );
    Ok(())
}

async fn run_tasks(config: &AppConfig, args: &TaskListArgs) -> Result<()> {
    let tasks = task_mirror(config)?;
    refresh(&tasks).await?;

    let snapshot = tasks.scheduler().store().snapshot();
    let projector = args.projector(config.ui.kanban_source);
    debug!(filters = projector.filter.active_count(), view = ?args.view, "projecting tasks");
    let format = OutputFormat::from(args.format);

    let out = match args.view {
        TaskView::List => format::render(
            &projector.list_view(&snapshot.items, entity_sync::views::TASK_SEARCH_KEYS),
            format,
            |list| format::format_tasks_markdown(list),
        )?,
        TaskView::Kanban => format::render(
            &projector.kanban(&snapshot.items),
            format,
            format::format_kanban_markdown,
        )?,
        TaskView::Stats => format::render(
            &TaskStats::from_store_stats(&snapshot.stats),
            format,
            format::format_task_stats_markdown,
        )?,
    };
    println!("{}", out);
    Ok(())
}

#[derive(Serialize)]
struct DocumentsOutput {
    documents: Vec<Document>,
    stats: DocumentStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<entity_sync::sync::RemoteSummary>,
}

async fn run_documents(config: &AppConfig, args: &DocumentListArgs) -> Result<()> {
    let documents = document_mirror(config)?;
    refresh(&documents).await?;

    let snapshot = documents.scheduler().store().snapshot();
    let view = args.projector().project_documents(&snapshot);
    let output = DocumentsOutput {
        documents: view.list,
        stats: view.stats,
        remote: documents.scheduler().summary(),
    };
    let out = format::render(&output, args.format.into(), |o| {
        format::format_documents_markdown(&o.documents, &o.stats, o.remote.as_ref())
    })?;
    println!("{}", out);
    Ok(())
}

async fn run_create(config: &AppConfig, draft: NewTask, format: OutputFormat) -> Result<()> {
    let tasks = task_mirror(config)?;
    let report = tasks.create_task(draft).await?;
    if let Some(err) = &report.remote_error {
        warn!("Task kept locally, server rejected it: {}", err);
    }
    print_task_report(&report, format)
}

async fn run_delete(config: &AppConfig, args: DeleteArgs) -> Result<()> {
    match args.resource {
        Resource::Tasks => delete_from(task_mirror(config)?, args.ids).await,
        Resource::Documents => delete_from(document_mirror(config)?, args.ids).await,
        Resource::All => bail!("--resource must be tasks or documents"),
    }
}

async fn delete_from<G: RemoteGateway>(
    coordinator: Arc<MutationCoordinator<G>>,
    mut ids: Vec<String>,
) -> Result<()> {
    refresh(&coordinator).await?;
    if ids.len() == 1 {
        let id = ids.remove(0);
        print_json(&coordinator.delete(&id).await?)
    } else {
        let report = coordinator.bulk_delete(ids).await?;
        if let Some(partial) = &report.partial_failure {
            warn!("{}", partial);
        }
        print_json(&report)
    }
}

/// Log a line for every snapshot the store publishes.
fn log_changes<G: RemoteGateway>(coordinator: &Arc<MutationCoordinator<G>>) {
    let store = Arc::clone(coordinator.scheduler().store());
    let live = coordinator.scheduler().liveness();
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = live.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = store.snapshot();
                    info!(
                        resource = G::Item::RESOURCE,
                        version = snapshot.version,
                        total = snapshot.stats.total,
                        transient = snapshot.stats.transient,
                        by_status = ?snapshot.stats.by_status,
                        "snapshot changed"
                    );
                }
            }
        }
    });
}

async fn run_watch(config: &AppConfig, resource: Resource) -> Result<()> {
    let tasks = matches!(resource, Resource::Tasks | Resource::All)
        .then(|| task_mirror(config))
        .transpose()?;
    let documents = matches!(resource, Resource::Documents | Resource::All)
        .then(|| document_mirror(config))
        .transpose()?;

    if let Some(tasks) = &tasks {
        log_changes(tasks);
        tasks.scheduler().start();
    }
    if let Some(documents) = &documents {
        log_changes(documents);
        documents.scheduler().start();
    }

    tokio::signal::ctrl_c().await?;
    info!("Stopping");
    if let Some(tasks) = &tasks {
        tasks.scheduler().shutdown();
    }
    if let Some(documents) = &documents {
        documents.scheduler().shutdown();
    }
    Ok(())
}

async fn run_serve(config: &AppConfig, port: Option<u16>) -> Result<()> {
    let tasks = task_mirror(config)?;
    let documents = document_mirror(config)?;
    tasks.scheduler().start();
    documents.scheduler().start();

    let state = DashboardServer::new(
        Arc::clone(&tasks),
        Arc::clone(&documents),
        config.ui.kanban_source,
    );
    let handle = start_server(state, port.unwrap_or(config.ui.port)).await?;
    info!("Dashboard: http://{}/api/health", handle.addr());

    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    tasks.scheduler().shutdown();
    documents.scheduler().shutdown();
    Ok(())
}
