//! Sync scheduler
//!
//! The control loop that turns due registries into replicator invocations.
//! One loop per enabled resource type; each tick reclaims expired leases,
//! consumes the event log, claims due rows up to the type's concurrency
//! limit, and dispatches them to the matching replicator. Outcomes land back
//! on the registry; only invariant violations abort a tick.

use crate::event::{ConsumeError, EventConsumer, EventLog};
use crate::infra::db::entities::registry::{self, SyncState};
use crate::registry::{RegistryError, RegistryStore};
use crate::replicator::{ReplicationError, Replicator, ReplicatorMap};
use crate::site::SiteRoleResolver;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Consume(#[from] ConsumeError),

	#[error(transparent)]
	Replication(#[from] ReplicationError),
}

/// What one tick did, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
	pub reclaimed: u64,
	pub events_consumed: u64,
	pub events_pruned: u64,
	pub claimed: usize,
	pub synced: usize,
	pub failed: usize,
}

enum SyncOutcome {
	Synced,
	Failed,
	/// The lease was lost mid-flight or the row vanished; nothing recorded
	Skipped,
}

pub struct SyncScheduler {
	store: Arc<RegistryStore>,
	log: Arc<EventLog>,
	consumer: Arc<EventConsumer>,
	replicators: Arc<ReplicatorMap>,
	site: Arc<SiteRoleResolver>,

	interval: Duration,
	event_batch_limit: u64,
	/// (resource type, max concurrently started syncs)
	types: Vec<(String, u32)>,

	shutdown: Arc<Notify>,
}

impl SyncScheduler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<RegistryStore>,
		log: Arc<EventLog>,
		consumer: Arc<EventConsumer>,
		replicators: Arc<ReplicatorMap>,
		site: Arc<SiteRoleResolver>,
		interval: Duration,
		event_batch_limit: u64,
		types: Vec<(String, u32)>,
	) -> Self {
		Self {
			store,
			log,
			consumer,
			replicators,
			site,
			interval,
			event_batch_limit,
			types,
			shutdown: Arc::new(Notify::new()),
		}
	}

	/// Spawn one tick loop per configured resource type
	pub fn start(self: &Arc<Self>) {
		for (resource_type, _) in &self.types {
			if !self.replicators.contains(resource_type) {
				warn!(
					resource_type = %resource_type,
					"No replicator registered; type will not sync"
				);
				continue;
			}

			let scheduler = self.clone();
			let resource_type = resource_type.clone();
			tokio::spawn(async move {
				scheduler.run_loop(resource_type).await;
			});
		}
	}

	pub fn shutdown(&self) {
		info!("Stopping sync scheduler");
		self.shutdown.notify_waiters();
	}

	async fn run_loop(self: Arc<Self>, resource_type: String) {
		info!(resource_type = %resource_type, "Starting sync loop");

		let mut interval = tokio::time::interval(self.interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = self.shutdown.notified() => {
					info!(resource_type = %resource_type, "Sync loop stopped");
					break;
				}
				_ = interval.tick() => {
					if let Err(e) = self.tick(&resource_type).await {
						error!(
							resource_type = %resource_type,
							error = %e,
							"Sync tick failed"
						);
					}
				}
			}
		}
	}

	/// One scheduling pass for a resource type.
	///
	/// A no-op on the primary and for disabled types: the scheduler exists on
	/// every site, it just never claims.
	pub async fn tick(&self, resource_type: &str) -> Result<TickSummary, SchedulerError> {
		let mut summary = TickSummary::default();

		if self.site.is_primary() || !self.site.replication_enabled_for(resource_type) {
			return Ok(summary);
		}

		let now = Utc::now();
		summary.reclaimed = self.store.reclaim_expired(resource_type, now).await?;

		summary.events_consumed = self
			.consumer
			.consume(resource_type, self.event_batch_limit)
			.await?
			.consumed;
		summary.events_pruned = self
			.log
			.prune(resource_type)
			.await
			.map_err(ConsumeError::Log)?;

		let capacity = self.concurrency_for(resource_type);
		let claims = self
			.store
			.claim_due_for_sync(resource_type, capacity, now)
			.await?;
		summary.claimed = claims.len();
		if claims.is_empty() {
			return Ok(summary);
		}

		let replicator = self.replicators.get(resource_type)?;

		let mut tasks = JoinSet::new();
		for claim in claims {
			let store = self.store.clone();
			let replicator = replicator.clone();
			tasks.spawn(async move { Self::sync_one(store, replicator, claim).await });
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(SyncOutcome::Synced) => summary.synced += 1,
				Ok(SyncOutcome::Failed) => summary.failed += 1,
				Ok(SyncOutcome::Skipped) => {}
				Err(e) => error!(error = %e, "Sync task panicked"),
			}
		}

		debug!(
			resource_type = %resource_type,
			claimed = summary.claimed,
			synced = summary.synced,
			failed = summary.failed,
			"Sync tick complete"
		);

		Ok(summary)
	}

	fn concurrency_for(&self, resource_type: &str) -> u64 {
		self.types
			.iter()
			.find(|(name, _)| name == resource_type)
			.map(|(_, concurrency)| *concurrency as u64)
			.unwrap_or(1)
	}

	async fn sync_one(
		store: Arc<RegistryStore>,
		replicator: Arc<dyn Replicator>,
		claim: registry::Model,
	) -> SyncOutcome {
		let Some(token) = claim.lease_token else {
			error!(id = claim.id, "Claim without lease token; skipping");
			return SyncOutcome::Skipped;
		};

		let transition = match replicator.fetch_and_apply(claim.resource_id).await {
			Ok(checksum) => {
				debug!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					checksum = %checksum,
					"Synced"
				);
				store
					.transition_sync(
						claim.id,
						SyncState::Started,
						SyncState::Synced,
						Some(token),
						None,
					)
					.await
					.map(|_| SyncOutcome::Synced)
			}
			Err(ReplicationError::Missing) => {
				info!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					"Resource gone on primary; marking for deletion"
				);
				store
					.record_missing(
						claim.id,
						token,
						"resource no longer exists on primary",
					)
					.await
					.map(|_| SyncOutcome::Failed)
			}
			Err(err) => {
				warn!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					error = %err,
					"Sync attempt failed"
				);
				store
					.transition_sync(
						claim.id,
						SyncState::Started,
						SyncState::Failed,
						Some(token),
						Some(&err.to_string()),
					)
					.await
					.map(|_| SyncOutcome::Failed)
			}
		};

		match transition {
			Ok(outcome) => outcome,
			Err(RegistryError::StaleClaim { id }) => {
				// Lease expired mid-flight and the row was reclaimed; the
				// late outcome is discarded
				debug!(id = id, "Lease lost mid-flight; outcome discarded");
				SyncOutcome::Skipped
			}
			Err(err) => {
				error!(id = claim.id, error = %err, "Failed to record sync outcome");
				SyncOutcome::Skipped
			}
		}
	}
}
