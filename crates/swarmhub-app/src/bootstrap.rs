//! Service wiring and the boot sequence.

use std::sync::Arc;
use std::time::Duration;

use swarmhub_api::{ApiServer, ApiServerError, ApiState};
use swarmhub_engine::{EngineConfig, InMemoryEngine};
use swarmhub_events::{EventBusPublisher, PublisherConfig};
use swarmhub_hub::{ConnectionRegistry, EventNotifier};
use swarmhub_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, build_sha, init_logging};
use swarmhub_torrent_core::TorrentWorkflow;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::orchestrator::TorrentOrchestrator;
use crate::webhook::CompletionHook;

const SPEC_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Dependencies required to boot the application.
pub struct BootstrapDependencies {
    /// Validated settings.
    pub config: AppConfig,
    /// Shared metrics registry.
    pub telemetry: Metrics,
    /// Lifecycle event publisher.
    pub publisher: EventBusPublisher,
}

impl BootstrapDependencies {
    /// Construct production dependencies for `config`.
    ///
    /// An unreachable bus yields a disabled publisher rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics registry cannot be built.
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let publisher_config = PublisherConfig {
            queue_capacity: config.bus_queue_capacity,
            ..PublisherConfig::default()
        };
        let publisher = match config.nsq_addr.as_deref() {
            Some(address) => {
                EventBusPublisher::init(address, publisher_config, Some(telemetry.clone())).await
            }
            None => {
                info!("no event bus configured; lifecycle events stay local");
                EventBusPublisher::disabled()
            }
        };
        Ok(Self {
            config,
            telemetry,
            publisher,
        })
    }
}

/// Entry point for the boot sequence, configured from the environment.
///
/// # Errors
///
/// Returns an error if configuration is invalid or startup fails.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    let bind_addr = config.bind_addr;
    let listener = TcpListener::bind(bind_addr).await.map_err(|source| {
        AppError::api_server(
            "api_server.bind",
            ApiServerError::Bind {
                addr: bind_addr,
                source,
            },
        )
    })?;
    let dependencies = BootstrapDependencies::from_config(config).await?;
    run_app_with(dependencies, listener, shutdown_signal()).await
}

/// Boot sequence over injected dependencies and an already bound listener;
/// returns once `shutdown` resolves and the server has drained.
///
/// Logging and the application span are expected to be installed by the
/// caller.
///
/// # Errors
///
/// Returns an error if a dependency cannot be constructed or the server fails.
pub async fn run_app_with<F>(
    dependencies: BootstrapDependencies,
    listener: TcpListener,
    shutdown: F,
) -> AppResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    info!(build = %build_sha(), "swarmhub bootstrap starting");

    let BootstrapDependencies {
        config,
        telemetry,
        publisher,
    } = dependencies;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_err(|source| AppError::io("data_dir.create", Some(config.data_dir.clone()), source))?;

    let spec_client = reqwest::Client::builder()
        .timeout(SPEC_FETCH_TIMEOUT)
        .build()
        .map_err(|source| AppError::HttpClient { source })?;

    let registry = ConnectionRegistry::with_metrics(config.session, telemetry.clone());
    let bus_enabled = publisher.is_enabled();
    let notifier = EventNotifier::new(Arc::clone(&registry), publisher);

    let mut engine_config = EngineConfig::new(config.data_dir.clone());
    engine_config.simulated_rate_bps = config.simulated_rate_bps;
    let engine = Arc::new(InMemoryEngine::new(engine_config));

    let hook = config
        .completion_hook
        .clone()
        .map(CompletionHook::new)
        .transpose()?;
    if let Some(hook) = hook.as_ref() {
        info!(url = %hook.url(), "completion hook enabled");
    }

    let orchestrator = Arc::new(TorrentOrchestrator::new(engine, notifier, hook));
    let event_loop = orchestrator.spawn_event_loop();
    let workflow: Arc<dyn TorrentWorkflow> = orchestrator;

    let state = ApiState::new(
        Arc::clone(&registry),
        workflow,
        telemetry,
        config.default_user.clone(),
    )
    .with_spec_client(spec_client)
    .with_bus_enabled(bus_enabled);
    let api = ApiServer::new(state);
    let serve_result = api.serve_with_shutdown(listener, shutdown).await;

    let open_sessions = registry.session_count();
    if open_sessions > 0 {
        info!(sessions = open_sessions, "closing remaining sessions");
        let mut users: Vec<String> = registry
            .list_users()
            .data
            .into_iter()
            .map(|entry| entry.username)
            .collect();
        users.sort_unstable();
        users.dedup();
        for user in users {
            registry.remove_user(&user).await;
        }
    }

    if !event_loop.is_finished() {
        event_loop.abort();
    }
    if let Err(err) = event_loop.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "engine event loop join failed");
    }

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("swarmhub shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
