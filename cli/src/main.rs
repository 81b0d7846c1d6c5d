//! Multi-mode entry point (§6): `--mode=worker` runs the processor
//! orchestrator and graph writer side by side, `--mode=api` serves the
//! read-only HTTP API, `--mode=telemetry` runs the ingestion scheduler, and
//! `--mode=cli` drops into one-shot operational subcommands. Grounded on
//! `enhanced_document_processor.py`'s own `run(mode=...)` dispatch.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

mod cli;
mod commands;
mod config;
mod setup;

use cli::{Cli, Mode};
use config::Settings;

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_BUDGET_SHUTDOWN: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    let settings = match Settings::load(&args.config, &args) {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.mode == Mode::Cli && args.command.is_none() {
        error!("--mode=cli requires an operational subcommand (health, query, export, enqueue)");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    run(args, settings).await
}

async fn run(args: Cli, settings: Settings) -> ExitCode {
    let object_store = match setup::build_object_store(&settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("failed to initialise object store: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let coordination = match setup::build_coordination(&settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("failed to initialise coordination store: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let node_id = format!("{}-{}", std::env::var("HOSTNAME").unwrap_or_else(|_| "pipeline".to_string()), std::process::id());
    setup::register_storage_node(coordination.clone(), &node_id, &settings).await;

    let graph = match setup::build_graph(&settings, &object_store).await {
        Ok(graph) => graph,
        Err(e) => {
            error!("failed to restore graph snapshot: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Some(file) = args.single_file.clone() {
        return run_single_file(&settings, object_store, coordination, &file).await;
    }

    match args.mode {
        Mode::Worker => run_worker(&settings, object_store, coordination, graph).await,
        Mode::Api => run_api(&settings, graph, coordination, object_store).await,
        Mode::Telemetry => run_telemetry(&settings, object_store, graph, coordination).await,
        Mode::Cli => run_cli(args, graph, coordination, object_store).await,
    }
}

async fn run_single_file(
    settings: &Settings,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
    file: &std::path::Path,
) -> ExitCode {
    info!(file = %file.display(), "processing single file");
    let extractor = match build_extractor(settings, object_store, coordination) {
        Ok(extractor) => extractor,
        Err(e) => {
            error!("failed to build extractor: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let text = match tokio::fs::read_to_string(file).await {
        Ok(text) => text,
        Err(e) => {
            error!("failed to read {}: {e}", file.display());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match extractor.process(&file.to_string_lossy(), &text).await {
        Ok(processed) => {
            match serde_json::to_string_pretty(&processed) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("failed to serialise result: {e}"),
            }
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            error!("processing failed: {e}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn build_extractor(
    settings: &Settings,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
) -> Result<Arc<pipeline_extract::Extractor>, pipeline_core::errors::CoreError> {
    let llm = setup::build_llm_connector(settings)?;
    let templates = pipeline_extract::TemplateStore::new(settings.storage_path.join("templates"), settings.prompt_hot_reload);
    let vector_index: Arc<dyn pipeline_core::prelude::VectorIndex> =
        Arc::new(pipeline_extract::HttpVectorIndex::new(settings.vector_url.clone(), settings.vector_collection.clone()));
    let embedder: Arc<dyn pipeline_extract::Embedder> = Arc::new(pipeline_extract::HttpEmbedder::new(settings.embed_endpoint.clone()));

    Ok(Arc::new(pipeline_extract::Extractor::new(
        llm,
        templates,
        vector_index,
        embedder,
        object_store,
        coordination,
        settings.storage_path.clone(),
    )))
}

/// Runs the job-processing orchestrator and the graph-writer's stream
/// consumer side by side in one process, matching the original monolithic
/// processor's single `run_worker` loop, which both extracted documents and
/// folded their results into the graph.
async fn run_worker(
    settings: &Settings,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
    graph: Arc<pipeline_adapter_graph_memory::InMemoryGraphStore>,
) -> ExitCode {
    let extractor = match build_extractor(settings, object_store.clone(), coordination.clone()) {
        Ok(extractor) => extractor,
        Err(e) => {
            error!("failed to build extractor: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let cost = Arc::new(pipeline_worker::CostTracker::new(settings.cost_per_hour, settings.max_budget));
    let orchestrator_config = pipeline_worker::OrchestratorConfig {
        batch_size: settings.batch_size,
        max_parallel: settings.max_parallel,
        idle_shutdown: std::time::Duration::from_secs(settings.idle_shutdown_secs),
        ..Default::default()
    };

    let orchestrator = match pipeline_worker::Orchestrator::register(
        coordination.clone(),
        extractor,
        cost,
        orchestrator_config,
        serde_json::json!({"llm_type": format!("{:?}", settings.llm_type)}),
    )
    .await
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("failed to register worker: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let edge_mapper = pipeline_graph_writer::EdgeMapper::new(settings.storage_path.join("edge_mapping.yaml"));
    let writer = pipeline_graph_writer::GraphWriter::new(
        graph as Arc<dyn pipeline_core::prelude::GraphStore>,
        object_store.clone() as Arc<dyn pipeline_core::prelude::ObjectStore>,
        coordination.clone(),
        edge_mapper,
        format!("writer-{}", std::process::id()),
        settings.graph_ipns_key.clone(),
    );

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let housekeeper = pipeline_graph_writer::Housekeeper::new(coordination, settings.pin_lifetime_days, settings.failed_doc_staleness_days);
    let housekeeping_cancel = cancel.clone();
    tokio::spawn(async move { run_housekeeping(housekeeper, housekeeping_cancel).await });

    let writer_cancel = cancel.clone();
    let writer_task = tokio::spawn(async move { writer.run(writer_cancel).await });

    let reason = orchestrator.run(cancel.clone()).await;
    cancel.cancel();
    let _ = writer_task.await;

    info!(?reason, "worker shutting down");
    match reason {
        pipeline_worker::ShutdownReason::Budget => ExitCode::from(EXIT_BUDGET_SHUTDOWN),
        pipeline_worker::ShutdownReason::Idle | pipeline_worker::ShutdownReason::Signal => ExitCode::from(EXIT_OK),
    }
}

async fn run_housekeeping(housekeeper: pipeline_graph_writer::Housekeeper, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                if let Err(e) = housekeeper.run(chrono::Utc::now()).await {
                    error!("housekeeping pass failed: {e}");
                }
            }
        }
    }
}

async fn run_api(
    settings: &Settings,
    graph: Arc<pipeline_adapter_graph_memory::InMemoryGraphStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
) -> ExitCode {
    let mut config = pipeline_api::ReadApiConfig::default();
    if let Some(endpoint) = &settings.web_api_endpoint {
        match endpoint.parse() {
            Ok(addr) => config.bind_address = addr,
            Err(e) => {
                error!("invalid WEB_API_ENDPOINT {endpoint}: {e}");
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    let state = pipeline_api::AppState { graph, coordination, object_store, config: config.clone() };
    let api = pipeline_api::ReadApi::new(config);
    match api.serve(state).await {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("read api server failed: {e}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn run_telemetry(
    settings: &Settings,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
    graph: Arc<pipeline_adapter_graph_memory::InMemoryGraphStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
) -> ExitCode {
    let _ = settings;
    let ingestors: Vec<pipeline_telemetry::ScheduledIngestor> = vec![
        pipeline_telemetry::ScheduledIngestor::new(Arc::new(pipeline_telemetry::TrafficIngestor::new()), pipeline_telemetry::TRAFFIC_INTERVAL),
        pipeline_telemetry::ScheduledIngestor::new(Arc::new(pipeline_telemetry::WeatherIngestor::new()), pipeline_telemetry::WEATHER_INTERVAL),
    ];

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let storage = Arc::new(pipeline_telemetry::StorageConfig::object_store());
    pipeline_telemetry::run_scheduler(
        ingestors,
        object_store as Arc<dyn pipeline_core::prelude::ObjectStore>,
        graph as Arc<dyn pipeline_core::prelude::GraphStore>,
        coordination,
        storage,
        cancel,
    )
    .await;
    ExitCode::from(EXIT_OK)
}

async fn run_cli(
    args: Cli,
    graph: Arc<pipeline_adapter_graph_memory::InMemoryGraphStore>,
    coordination: Arc<dyn pipeline_core::prelude::CoordinationStore>,
    object_store: Arc<pipeline_adapter_object_store::LocalObjectStore>,
) -> ExitCode {
    let command = args.command.expect("checked by caller");
    let object_store_dyn: Arc<dyn pipeline_core::prelude::ObjectStore> = object_store;

    let result = match command {
        cli::Commands::Health => commands::handle_health_command(&graph, &coordination, &object_store_dyn).await,
        cli::Commands::Query { command } => commands::handle_query_command(command, &graph).await,
        cli::Commands::Export { output } => commands::handle_export_command(&graph, &output).await,
        cli::Commands::Enqueue { file } => commands::handle_enqueue_command(coordination, &file).await,
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("command failed: {e}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            cancel.cancel();
        }
    });
}
