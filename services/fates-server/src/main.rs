//! Three Fates Server
//!
//! Petition governance service: accepts petitions, coordinates them
//! through the Three Fates lifecycle, and guarantees every petition
//! terminates in exactly one witnessed fate.
//!
//! # Usage
//!
//! ```bash
//! # In-memory backend (development)
//! fates-server
//!
//! # PostgreSQL backend
//! DATABASE_URL=postgresql://fates@localhost/threefates fates-server
//!
//! # Environment overrides
//! FATES_PORT=9090 MIN_DWELL_TIME_SECONDS=60 fates-server
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fates_api::{create_router, AppState};
use fates_db::{Database, DatabaseConfig};
use fates_engine::{
    AcknowledgmentExecutor, AutoEscalationExecutor, CoSignService, DecisionPackageService,
    EngineConfig, EscalationQueueService, FateCoordinator, NoopFateNotifier, OrphanMonitor,
    RecordingOrchestrator, ReferralTimeoutHandler, SharedHaltGate, StaticRealmRegistry,
    SubmissionService, ThresholdDetector, JOB_TYPE_REFERRAL_TIMEOUT,
};
use fates_ledger::{EventWriter, InMemoryEventLedger};
use fates_scheduler::{InMemoryJobStore, JobRunner, JobStore};
use fates_store::{
    AcknowledgmentRepository, InMemoryAcknowledgmentRepository,
    InMemoryNotificationPreferenceRepository, InMemoryPetitionRepository,
    InMemoryReferralRepository, NotificationPreferenceRepository, PetitionRepository,
    ReferralRepository,
};

use crate::config::ServerConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Three Fates petition governance server
#[derive(Parser, Debug)]
#[command(name = "fates-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "FATES_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "FATES_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FATES_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "FATES_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// PostgreSQL connection URL; omitted = in-memory backend
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Realms available for routing (comma-separated)
    #[arg(long, env = "FATES_REALMS", default_value = "governance,economy")]
    realms: String,

    /// Default realm for submissions that name none
    #[arg(long, env = "FATES_DEFAULT_REALM", default_value = "default")]
    default_realm: String,
}

/// Storage adapters behind the engine, either in-memory or PostgreSQL
struct Backend {
    petitions: Arc<dyn PetitionRepository>,
    acknowledgments: Arc<dyn AcknowledgmentRepository>,
    referrals: Arc<dyn ReferralRepository>,
    notification_prefs: Arc<dyn NotificationPreferenceRepository>,
    event_writer: Arc<dyn EventWriter>,
    job_store: Arc<dyn JobStore>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_level, &args.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Three Fates server"
    );

    let mut server_config = ServerConfig::default();
    if let Some(host) = args.host.clone() {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let engine_config = EngineConfig::from_env();
    tracing::info!(
        min_dwell_seconds = engine_config.min_dwell_seconds,
        cessation_threshold = engine_config.cessation_threshold,
        grievance_threshold = engine_config.grievance_threshold,
        orphan_threshold_hours = engine_config.orphan_threshold_hours,
        "Engine configuration loaded"
    );

    let backend = init_backend(args.database_url.as_deref()).await?;

    // The halt signal is the only legitimate process-wide state.
    let halt = Arc::new(SharedHaltGate::new());

    let realm_registry = Arc::new(StaticRealmRegistry::new(
        args.realms
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        args.default_realm.clone(),
    ));

    // The coordinator refuses to assign a fate without an event writer;
    // the backend always provides one. Outward notification delivery is
    // deployment glue, so the no-op notifier fills that port here.
    let coordinator = FateCoordinator::new(
        backend.petitions.clone(),
        Some(backend.event_writer.clone()),
        halt.clone(),
    )
    .with_fate_notifier(Arc::new(NoopFateNotifier));

    let submission = SubmissionService::new(
        backend.petitions.clone(),
        realm_registry,
        halt.clone(),
        coordinator.clone(),
        Some(backend.event_writer.clone()),
    )
    .with_notification_prefs(backend.notification_prefs.clone());

    let acknowledgments = AcknowledgmentExecutor::new(
        backend.acknowledgments.clone(),
        backend.petitions.clone(),
        coordinator.clone(),
        Some(backend.event_writer.clone()),
        halt.clone(),
        engine_config.clone(),
    );

    let escalation = AutoEscalationExecutor::new(
        backend.petitions.clone(),
        coordinator.clone(),
        Some(backend.event_writer.clone()),
        halt.clone(),
    );
    let cosign = CoSignService::new(
        backend.petitions.clone(),
        ThresholdDetector::new(&engine_config),
        escalation,
        halt.clone(),
    );

    let queue = EscalationQueueService::new(backend.petitions.clone(), halt.clone());
    let packages = DecisionPackageService::new(backend.petitions.clone());

    // Background tasks: job runner (referral deadlines) and the orphan
    // monitor's periodic scan.
    let mut runner = JobRunner::new(backend.job_store.clone())
        .with_poll_interval(Duration::from_secs(server_config.job_poll_interval_secs));
    runner.register(
        JOB_TYPE_REFERRAL_TIMEOUT,
        Arc::new(ReferralTimeoutHandler::new(
            backend.referrals.clone(),
            acknowledgments.clone(),
        )),
    );
    let runner_task = tokio::spawn(Arc::new(runner).run());

    let orphan_monitor = Arc::new(OrphanMonitor::new(
        backend.petitions.clone(),
        Some(backend.event_writer.clone()),
        Arc::new(RecordingOrchestrator::new()),
        halt.clone(),
        engine_config.orphan_threshold_hours,
    ));
    let orphan_task = orphan_monitor.spawn_periodic(Duration::from_secs(
        server_config.orphan_scan_interval_secs,
    ));

    let state = Arc::new(AppState {
        submission,
        cosign,
        acknowledgments,
        queue,
        packages,
        halt_gate: halt.clone(),
    });
    let app = create_router(state);

    let addr = server_config.socket_addr()?;
    tracing::info!(host = %server_config.host, port = server_config.port, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.shutdown_timeout()))
        .await?;

    runner_task.abort();
    orphan_task.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization
// =============================================================================

/// Initialize tracing/logging
fn init_logging(level: &str, format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match format {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber.with(fmt::layer().with_target(true)).init();
        }
    }
}

/// Connect the storage backend.
///
/// With `DATABASE_URL` set, petitions, events, and deadlines persist in
/// PostgreSQL and survive restart; without it everything lives in
/// process memory, which is for development only.
async fn init_backend(database_url: Option<&str>) -> anyhow::Result<Backend> {
    match database_url {
        Some(url) => {
            let db_config = DatabaseConfig {
                postgres_url: url.to_string(),
                ..DatabaseConfig::from_env()
            };
            let db = Database::connect(&db_config).await?;
            db.migrate().await?;
            if !db.health_check().await {
                anyhow::bail!("database health check failed");
            }
            tracing::info!("PostgreSQL backend ready");
            Ok(Backend {
                petitions: Arc::new(db.petition_repo()),
                acknowledgments: Arc::new(db.acknowledgment_repo()),
                referrals: Arc::new(db.referral_repo()),
                notification_prefs: Arc::new(db.notification_repo()),
                event_writer: Arc::new(db.event_writer()),
                job_store: Arc::new(db.job_store()),
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory backend (development only)");
            Ok(Backend {
                petitions: Arc::new(InMemoryPetitionRepository::new()),
                acknowledgments: Arc::new(InMemoryAcknowledgmentRepository::new()),
                referrals: Arc::new(InMemoryReferralRepository::new()),
                notification_prefs: Arc::new(InMemoryNotificationPreferenceRepository::new()),
                event_writer: Arc::new(InMemoryEventLedger::new()),
                job_store: Arc::new(InMemoryJobStore::new()),
            })
        }
    }
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["fates-server", "--port", "9090"]);
        assert_eq!(args.port, Some(9090));
        assert_eq!(args.log_level, "info");
    }

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = init_backend(None).await.unwrap();
        assert_eq!(backend.petitions.get_queue_depth(None).await.unwrap(), 0);
    }
}
