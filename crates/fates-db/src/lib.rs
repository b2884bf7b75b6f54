//! Three Fates Database Layer
//!
//! PostgreSQL persistence for the petition engine. Each repository
//! implements the corresponding `fates-store`, `fates-ledger`, or
//! `fates-scheduler` contract with semantics identical to the in-memory
//! reference adapters.
//!
//! # Architecture
//!
//! - `petitions`: petition rows with atomic CAS fate assignment
//!   (`UPDATE ... WHERE state = expected RETURNING`)
//! - `acknowledgments`: unique index on `petition_id` enforces at most
//!   one acknowledgment per petition
//! - `referrals`: referral rows with status transitions
//! - `events`: append-only witnessed ledger
//! - `scheduled_jobs`: durable timers that survive restart
//! - `notification_preferences`: best-effort observer preferences
//!
//! Enum columns are stored as text and parsed through the domain
//! constructors, so an out-of-range value fails loudly at the boundary.

pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod models;
pub mod repos;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{db_err, DbError, DbResult};
pub use events::PgEventWriter;
pub use jobs::PgJobStore;
pub use models::*;
pub use repos::*;

/// Database connection pool
pub struct Database {
    /// PostgreSQL connection pool
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pg })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok()
    }

    /// Create repository instances
    pub fn petition_repo(&self) -> PgPetitionRepository {
        PgPetitionRepository::new(self.pg.clone())
    }

    pub fn acknowledgment_repo(&self) -> PgAcknowledgmentRepository {
        PgAcknowledgmentRepository::new(self.pg.clone())
    }

    pub fn referral_repo(&self) -> PgReferralRepository {
        PgReferralRepository::new(self.pg.clone())
    }

    pub fn notification_repo(&self) -> PgNotificationPreferenceRepository {
        PgNotificationPreferenceRepository::new(self.pg.clone())
    }

    pub fn event_writer(&self) -> PgEventWriter {
        PgEventWriter::new(self.pg.clone())
    }

    pub fn job_store(&self) -> PgJobStore {
        PgJobStore::new(self.pg.clone())
    }
}
