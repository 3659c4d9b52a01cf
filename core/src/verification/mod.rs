//! Verification coordinator
//!
//! Independently of sync, reconciles each synced registry's local checksum
//! against the primary's. A match records the verification; a mismatch fails
//! it under backoff and, after enough consecutive mismatches, forces a resync
//! (the local copy is presumed stale or corrupt). Mutual exclusion with sync
//! is structural: verification claims take the same lease.

use crate::infra::db::entities::registry::{self, VerificationState};
use crate::registry::{RegistryError, RegistryStore};
use crate::replicator::{PrimaryTransport, ReplicationError, Replicator, ReplicatorMap, TransportError};
use crate::site::SiteRoleResolver;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Replication(#[from] ReplicationError),
}

/// What one verification tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyTickSummary {
	pub requeued: u64,
	pub claimed: usize,
	pub verified: usize,
	pub mismatched: usize,
	pub failed: usize,
}

enum VerifyOutcome {
	Verified,
	Mismatched,
	Failed,
	Skipped,
}

pub struct VerificationCoordinator {
	store: Arc<RegistryStore>,
	replicators: Arc<ReplicatorMap>,
	transport: Arc<dyn PrimaryTransport>,
	site: Arc<SiteRoleResolver>,

	interval: Duration,
	mismatch_threshold: i32,
	reverify_after: ChronoDuration,
	/// (resource type, max concurrently started verifications)
	types: Vec<(String, u32)>,

	shutdown: Arc<Notify>,
}

impl VerificationCoordinator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<RegistryStore>,
		replicators: Arc<ReplicatorMap>,
		transport: Arc<dyn PrimaryTransport>,
		site: Arc<SiteRoleResolver>,
		interval: Duration,
		mismatch_threshold: i32,
		reverify_after: Duration,
		types: Vec<(String, u32)>,
	) -> Self {
		Self {
			store,
			replicators,
			transport,
			site,
			interval,
			mismatch_threshold,
			reverify_after: ChronoDuration::milliseconds(reverify_after.as_millis() as i64),
			types,
			shutdown: Arc::new(Notify::new()),
		}
	}

	/// Spawn one verification loop per configured resource type
	pub fn start(self: &Arc<Self>) {
		for (resource_type, _) in &self.types {
			if !self.replicators.contains(resource_type) {
				continue;
			}

			let coordinator = self.clone();
			let resource_type = resource_type.clone();
			tokio::spawn(async move {
				coordinator.run_loop(resource_type).await;
			});
		}
	}

	pub fn shutdown(&self) {
		info!("Stopping verification coordinator");
		self.shutdown.notify_waiters();
	}

	async fn run_loop(self: Arc<Self>, resource_type: String) {
		info!(resource_type = %resource_type, "Starting verification loop");

		let mut interval = tokio::time::interval(self.interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = self.shutdown.notified() => {
					info!(resource_type = %resource_type, "Verification loop stopped");
					break;
				}
				_ = interval.tick() => {
					if let Err(e) = self.tick(&resource_type).await {
						error!(
							resource_type = %resource_type,
							error = %e,
							"Verification tick failed"
						);
					}
				}
			}
		}
	}

	/// One verification pass for a resource type; a no-op on the primary and
	/// for types whose verification is disabled
	pub async fn tick(
		&self,
		resource_type: &str,
	) -> Result<VerifyTickSummary, VerificationError> {
		let mut summary = VerifyTickSummary::default();

		if self.site.is_primary() || !self.site.verification_enabled_for(resource_type) {
			return Ok(summary);
		}

		let now = Utc::now();

		// Periodic re-verification: old successes become due again
		summary.requeued = self
			.store
			.requeue_verification(resource_type, now - self.reverify_after)
			.await?;

		let capacity = self.concurrency_for(resource_type);
		let claims = self
			.store
			.claim_due_for_verification(resource_type, capacity, now)
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
			let transport = self.transport.clone();
			let threshold = self.mismatch_threshold;
			tasks.spawn(async move {
				Self::verify_one(store, replicator, transport, claim, threshold).await
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(VerifyOutcome::Verified) => summary.verified += 1,
				Ok(VerifyOutcome::Mismatched) => summary.mismatched += 1,
				Ok(VerifyOutcome::Failed) => summary.failed += 1,
				Ok(VerifyOutcome::Skipped) => {}
				Err(e) => error!(error = %e, "Verification task panicked"),
			}
		}

		debug!(
			resource_type = %resource_type,
			claimed = summary.claimed,
			verified = summary.verified,
			mismatched = summary.mismatched,
			"Verification tick complete"
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

	async fn verify_one(
		store: Arc<RegistryStore>,
		replicator: Arc<dyn Replicator>,
		transport: Arc<dyn PrimaryTransport>,
		claim: registry::Model,
		threshold: i32,
	) -> VerifyOutcome {
		let Some(token) = claim.lease_token else {
			error!(id = claim.id, "Verification claim without lease token; skipping");
			return VerifyOutcome::Skipped;
		};

		let local = replicator.compute_local_checksum(claim.resource_id).await;
		let primary = transport
			.fetch_checksum(&claim.resource_type, claim.resource_id)
			.await;

		let transition = match (local, primary) {
			(Ok(local), Ok(primary)) if local == primary => {
				debug!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					checksum = %local,
					"Verified"
				);
				store
					.transition_verification(
						claim.id,
						VerificationState::Started,
						VerificationState::Succeeded,
						Some(token),
						Some(&local),
					)
					.await
					.map(|_| VerifyOutcome::Verified)
			}
			(Ok(local), Ok(primary)) => {
				warn!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					local = %local,
					primary = %primary,
					"Checksum mismatch"
				);
				store
					.record_checksum_mismatch(claim.id, token, &local, &primary, threshold)
					.await
					.map(|_| VerifyOutcome::Mismatched)
			}
			(_, Err(TransportError::Missing)) => {
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
					.map(|_| VerifyOutcome::Failed)
			}
			(Err(err), _) => {
				warn!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					error = %err,
					"Verification attempt failed"
				);
				store
					.transition_verification(
						claim.id,
						VerificationState::Started,
						VerificationState::Failed,
						Some(token),
						Some(&err.to_string()),
					)
					.await
					.map(|_| VerifyOutcome::Failed)
			}
			(_, Err(err)) => {
				warn!(
					resource_type = %claim.resource_type,
					resource_id = %claim.resource_id,
					error = %err,
					"Primary checksum fetch failed"
				);
				store
					.transition_verification(
						claim.id,
						VerificationState::Started,
						VerificationState::Failed,
						Some(token),
						Some(&err.to_string()),
					)
					.await
					.map(|_| VerifyOutcome::Failed)
			}
		};

		match transition {
			Ok(outcome) => outcome,
			Err(RegistryError::StaleClaim { id }) => {
				debug!(id = id, "Verification lease lost mid-flight; outcome discarded");
				VerifyOutcome::Skipped
			}
			Err(err) => {
				error!(id = claim.id, error = %err, "Failed to record verification outcome");
				VerifyOutcome::Skipped
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backoff::Backoff;
	use crate::config::{ReplicationConfig, ResourceTypeSettings};
	use crate::infra::db;
	use crate::infra::db::entities::registry::SyncState;
	use crate::replicator::Replicator;
	use crate::site::SiteRole;
	use async_trait::async_trait;
	use std::collections::HashMap;
	use tempfile::TempDir;
	use tokio::sync::Mutex;
	use uuid::Uuid;

	/// Replicator/transport pair with independently settable checksums
	struct ChecksumPair {
		local: Mutex<HashMap<Uuid, String>>,
		primary: Mutex<HashMap<Uuid, String>>,
	}

	impl ChecksumPair {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				local: Mutex::new(HashMap::new()),
				primary: Mutex::new(HashMap::new()),
			})
		}

		async fn set(&self, resource_id: Uuid, local: &str, primary: &str) {
			self.local
				.lock()
				.await
				.insert(resource_id, local.to_string());
			self.primary
				.lock()
				.await
				.insert(resource_id, primary.to_string());
		}
	}

	#[async_trait]
	impl Replicator for ChecksumPair {
		fn resource_type(&self) -> &'static str {
			"widget"
		}

		async fn fetch_and_apply(&self, _resource_id: Uuid) -> Result<String, ReplicationError> {
			Ok("unused".to_string())
		}

		async fn compute_local_checksum(
			&self,
			resource_id: Uuid,
		) -> Result<String, ReplicationError> {
			self.local
				.lock()
				.await
				.get(&resource_id)
				.cloned()
				.ok_or_else(|| ReplicationError::Transient("local copy missing".to_string()))
		}
	}

	#[async_trait]
	impl PrimaryTransport for ChecksumPair {
		async fn fetch_checksum(
			&self,
			_resource_type: &str,
			resource_id: Uuid,
		) -> Result<String, TransportError> {
			self.primary
				.lock()
				.await
				.get(&resource_id)
				.cloned()
				.ok_or(TransportError::Missing)
		}

		async fn fetch_payload(
			&self,
			_resource_type: &str,
			_resource_id: Uuid,
		) -> Result<Vec<u8>, TransportError> {
			Err(TransportError::Transient("not used".to_string()))
		}
	}

	struct Fixture {
		coordinator: VerificationCoordinator,
		store: Arc<RegistryStore>,
		pair: Arc<ChecksumPair>,
		conn: Arc<sea_orm::DatabaseConnection>,
		_temp: TempDir,
	}

	async fn fixture(role: SiteRole) -> Fixture {
		let temp = TempDir::new().unwrap();
		let url = db::sqlite_url(temp.path());
		let conn = Arc::new(db::connect_and_migrate(&url).await.unwrap());

		let store = Arc::new(RegistryStore::new(
			conn.clone(),
			Backoff::default(),
			Backoff {
				jitter: 0.0,
				..Backoff::default()
			},
			Duration::from_secs(300),
		));

		let mut config = ReplicationConfig::secondary("site-a", temp.path())
			.with_resource_type(ResourceTypeSettings::new("widget"));
		config.role = role;
		let site = Arc::new(SiteRoleResolver::new(&config));

		let pair = ChecksumPair::new();
		let replicators =
			Arc::new(ReplicatorMap::new().register(pair.clone() as Arc<dyn Replicator>));

		Fixture {
			coordinator: VerificationCoordinator::new(
				store.clone(),
				replicators,
				pair.clone(),
				site,
				Duration::from_secs(60),
				3,
				Duration::from_secs(7 * 24 * 3600),
				vec![("widget".to_string(), 4)],
			),
			store,
			pair,
			conn,
			_temp: temp,
		}
	}

	async fn synced_row(store: &RegistryStore) -> registry::Model {
		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let claim = &store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap()[0];
		store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Synced,
				claim.lease_token,
				None,
			)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn matching_checksums_verify() {
		let f = fixture(SiteRole::Secondary).await;

		let row = synced_row(&f.store).await;
		f.pair.set(row.resource_id, "abc", "abc").await;

		let summary = f.coordinator.tick("widget").await.unwrap();
		assert_eq!(summary.claimed, 1);
		assert_eq!(summary.verified, 1);

		let row = f.store.get_by_id(row.id).await.unwrap();
		assert_eq!(row.verification_state, "succeeded");
		assert_eq!(row.verification_checksum.as_deref(), Some("abc"));
		assert!(row.verified_at.is_some());
	}

	#[tokio::test]
	async fn mismatch_fails_and_eventually_forces_resync() {
		let f = fixture(SiteRole::Secondary).await;

		let row = synced_row(&f.store).await;
		f.pair.set(row.resource_id, "abc", "def").await;

		// First mismatch
		let summary = f.coordinator.tick("widget").await.unwrap();
		assert_eq!(summary.mismatched, 1);

		let current = f.store.get_by_id(row.id).await.unwrap();
		assert_eq!(current.verification_state, "failed");
		assert_eq!(current.verification_retry_count, 1);
		assert_eq!(current.mismatch_count, 1);
		assert_eq!(current.sync_state, "synced");

		// Clear the backoff and mismatch twice more: the third forces resync
		use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
		for _ in 0..2 {
			registry::Entity::update_many()
				.filter(registry::Column::Id.eq(current.id))
				.col_expr(
					registry::Column::VerificationRetryAt,
					sea_orm::sea_query::Expr::value(Utc::now()),
				)
				.exec(f.conn.as_ref())
				.await
				.unwrap();
			f.coordinator.tick("widget").await.unwrap();
		}

		let current = f.store.get_by_id(row.id).await.unwrap();
		assert_eq!(current.sync_state, "pending");
		assert_eq!(current.mismatch_count, 0);
	}

	#[tokio::test]
	async fn transient_failures_do_not_count_as_mismatches() {
		let f = fixture(SiteRole::Secondary).await;

		// Local checksum unavailable (no entry in the pair)
		let row = synced_row(&f.store).await;
		f.pair
			.primary
			.lock()
			.await
			.insert(row.resource_id, "abc".to_string());

		let summary = f.coordinator.tick("widget").await.unwrap();
		assert_eq!(summary.failed, 1);

		let current = f.store.get_by_id(row.id).await.unwrap();
		assert_eq!(current.verification_state, "failed");
		assert_eq!(current.mismatch_count, 0);
		assert!(current.verification_retry_at.unwrap() > Utc::now());
	}

	#[tokio::test]
	async fn primary_ticks_are_noops() {
		let f = fixture(SiteRole::Primary).await;

		let summary = f.coordinator.tick("widget").await.unwrap();
		assert_eq!(summary, VerifyTickSummary::default());
	}
}
