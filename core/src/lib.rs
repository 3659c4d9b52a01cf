//! # Outpost Core
//!
//! Keeps a read replica of a resource catalog consistent with a primary site.
//! Each replicated resource has a registry row with two independent state
//! machines (sync and verification), driven by:
//!
//! - an append-only, per-type sequenced **event log** consumed through
//!   per-site cursors (incremental resync instead of full rescans),
//! - a **sync scheduler** claiming due rows atomically under a lease, with
//!   exponential backoff and per-type concurrency limits,
//! - a **verification coordinator** reconciling local checksums against the
//!   primary's to catch silent corruption without re-transferring content.
//!
//! The same binary serves both roles: on a primary the scheduler and verifier
//! exist but never claim work.

use crate::config::ReplicationConfig;
use crate::event::{EventConsumer, EventLog};
use crate::registry::RegistryStore;
use crate::replicator::{PrimaryTransport, ReplicatorMap};
use crate::scheduler::SyncScheduler;
use crate::site::SiteRoleResolver;
use crate::verification::VerificationCoordinator;
use anyhow::{anyhow, Result};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod backoff;
pub mod config;
pub mod event;
pub mod infra;
pub mod registry;
pub mod replicator;
pub mod scheduler;
pub mod site;
pub mod verification;

pub use crate::config::{ReplicationConfig as Config, ResourceTypeSettings};
pub use crate::infra::db::entities::event_log::{Event, EventKind, EventPayload};
pub use crate::infra::db::entities::registry::{SyncState, VerificationState};
pub use crate::registry::{RegistryFilter, ReplicationStatus};
pub use crate::site::SiteRole;

/// Wired-up replication engine for one site
pub struct OutpostCore {
	pub config: ReplicationConfig,
	pub db: Arc<DatabaseConnection>,
	pub site: Arc<SiteRoleResolver>,
	pub store: Arc<RegistryStore>,
	pub event_log: Arc<EventLog>,
	pub scheduler: Arc<SyncScheduler>,
	pub verifier: Arc<VerificationCoordinator>,
}

impl OutpostCore {
	/// Connect, migrate, and wire all components. Replicators must be
	/// registered for every enabled resource type.
	pub async fn new(
		config: ReplicationConfig,
		transport: Arc<dyn PrimaryTransport>,
		replicators: ReplicatorMap,
	) -> Result<Arc<Self>> {
		let db = Arc::new(
			crate::infra::db::connect_and_migrate(&config.database_url()).await?,
		);

		let site = Arc::new(SiteRoleResolver::new(&config));

		for settings in &config.resource_types {
			if settings.enabled && !replicators.contains(&settings.name) {
				return Err(anyhow!(
					"resource type '{}' is enabled but has no registered replicator",
					settings.name
				));
			}
		}

		let store = Arc::new(RegistryStore::new(
			db.clone(),
			config.sync.backoff.to_backoff(),
			config.verification.backoff.to_backoff(),
			Duration::from_secs(config.sync.lease_timeout_secs),
		));
		let event_log = Arc::new(EventLog::new(db.clone()));
		let consumer = Arc::new(EventConsumer::new(
			event_log.clone(),
			store.clone(),
			site.clone(),
		));

		let replicators = Arc::new(replicators);
		let types: Vec<(String, u32)> = config
			.resource_types
			.iter()
			.filter(|t| t.enabled)
			.map(|t| (t.name.clone(), t.max_concurrency))
			.collect();

		let scheduler = Arc::new(SyncScheduler::new(
			store.clone(),
			event_log.clone(),
			consumer,
			replicators.clone(),
			site.clone(),
			Duration::from_secs(config.sync.interval_secs),
			config.sync.event_batch_limit,
			types.clone(),
		));

		let verifier = Arc::new(VerificationCoordinator::new(
			store.clone(),
			replicators,
			transport,
			site.clone(),
			Duration::from_secs(config.verification.interval_secs),
			config.verification.mismatch_threshold,
			Duration::from_secs(config.verification.reverify_after_secs),
			types,
		));

		info!(
			site = %config.site_id,
			primary = site.is_primary(),
			types = config.resource_types.len(),
			"Outpost core initialized"
		);

		Ok(Arc::new(Self {
			config,
			db,
			site,
			store,
			event_log,
			scheduler,
			verifier,
		}))
	}

	/// Start the scheduler and verifier loops
	pub fn start(&self) {
		self.scheduler.start();
		self.verifier.start();
	}

	/// Signal all loops to stop
	pub fn shutdown(&self) {
		self.scheduler.shutdown();
		self.verifier.shutdown();
	}
}

/// Install a console tracing subscriber honoring `RUST_LOG`
/// (defaults to `info` for this crate)
pub fn init_logging() {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("warn,outpost_core=info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer())
		.init();
}
