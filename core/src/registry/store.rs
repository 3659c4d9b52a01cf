//! Registry store
//!
//! Single source of truth for replication state. All mutation goes through
//! validated transitions or atomic lock-and-claim statements; no component
//! caches registry rows across ticks.
//!
//! Claims are single `UPDATE ... WHERE id IN (SELECT ...) RETURNING *`
//! statements. SQLite serializes writers, so two concurrent callers can never
//! claim the same row.

use crate::backoff::Backoff;
use crate::infra::db::entities::registry::{self, SyncState, VerificationState};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{
	sea_query::{Expr, OnConflict},
	ActiveValue, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
	EntityTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registry store errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("database error: {0}")]
	Database(#[from] DbErr),

	#[error("registry row {id} not found")]
	NotFound { id: i32 },

	/// Programming error; fails the calling tick and is never retried
	#[error("illegal {kind} transition {from} -> {to}")]
	IllegalTransition {
		kind: &'static str,
		from: String,
		to: String,
	},

	#[error("registry row {id} is in {kind} state {actual}, expected {expected}")]
	StateConflict {
		id: i32,
		kind: &'static str,
		expected: String,
		actual: String,
	},

	/// The worker's lease was lost (expired and reclaimed, or never held)
	#[error("claim on registry row {id} is no longer held by this worker")]
	StaleClaim { id: i32 },
}

/// Filter for the administrative listing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFilter {
	All,
	Sync(SyncState),
	Verification(VerificationState),
}

/// Aggregate per-type counts for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStatus {
	pub resource_type: String,
	pub total: u64,
	pub pending: u64,
	pub started: u64,
	pub synced: u64,
	pub failed: u64,
	pub verification_pending: u64,
	pub verification_started: u64,
	pub verified: u64,
	pub verification_failed: u64,
	pub verification_disabled: u64,
	pub marked_for_deletion: u64,
}

pub struct RegistryStore {
	db: Arc<DatabaseConnection>,
	sync_backoff: Backoff,
	verification_backoff: Backoff,
	lease_timeout: ChronoDuration,
}

impl RegistryStore {
	pub fn new(
		db: Arc<DatabaseConnection>,
		sync_backoff: Backoff,
		verification_backoff: Backoff,
		lease_timeout: Duration,
	) -> Self {
		Self {
			db,
			sync_backoff,
			verification_backoff,
			lease_timeout: ChronoDuration::milliseconds(lease_timeout.as_millis() as i64),
		}
	}

	/// Create a registry row for a newly observed resource (idempotent)
	pub async fn create(
		&self,
		resource_type: &str,
		resource_id: Uuid,
		verification_enabled: bool,
	) -> Result<registry::Model, RegistryError> {
		let now = Utc::now();

		let initial_verification = if verification_enabled {
			VerificationState::Pending
		} else {
			VerificationState::Disabled
		};

		let active = registry::ActiveModel {
			id: ActiveValue::NotSet,
			resource_id: ActiveValue::Set(resource_id),
			resource_type: ActiveValue::Set(resource_type.to_string()),
			sync_state: ActiveValue::Set(SyncState::Pending.as_str().to_string()),
			retry_count: ActiveValue::Set(0),
			retry_at: ActiveValue::Set(None),
			last_sync_failure: ActiveValue::Set(None),
			last_synced_at: ActiveValue::Set(None),
			verification_state: ActiveValue::Set(initial_verification.as_str().to_string()),
			verification_checksum: ActiveValue::Set(None),
			verified_at: ActiveValue::Set(None),
			verification_failure: ActiveValue::Set(None),
			verification_retry_count: ActiveValue::Set(0),
			verification_retry_at: ActiveValue::Set(None),
			mismatch_count: ActiveValue::Set(0),
			lease_token: ActiveValue::Set(None),
			lease_expires_at: ActiveValue::Set(None),
			marked_for_deletion: ActiveValue::Set(false),
			created_at: ActiveValue::Set(now),
			updated_at: ActiveValue::Set(now),
		};

		registry::Entity::insert(active)
			.on_conflict(
				OnConflict::columns([
					registry::Column::ResourceType,
					registry::Column::ResourceId,
				])
				.do_nothing()
				.to_owned(),
			)
			.exec_without_returning(self.db.as_ref())
			.await?;

		self.get(resource_type, resource_id)
			.await?
			.ok_or(RegistryError::NotFound { id: 0 })
	}

	pub async fn get(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<Option<registry::Model>, RegistryError> {
		Ok(registry::Entity::find()
			.filter(registry::Column::ResourceType.eq(resource_type))
			.filter(registry::Column::ResourceId.eq(resource_id))
			.one(self.db.as_ref())
			.await?)
	}

	pub async fn get_by_id(&self, id: i32) -> Result<registry::Model, RegistryError> {
		registry::Entity::find_by_id(id)
			.one(self.db.as_ref())
			.await?
			.ok_or(RegistryError::NotFound { id })
	}

	/// Read-only listing for the administrative surface
	pub async fn list(
		&self,
		resource_type: &str,
		filter: RegistryFilter,
		page: u64,
		per_page: u64,
	) -> Result<Vec<registry::Model>, RegistryError> {
		let mut query = registry::Entity::find()
			.filter(registry::Column::ResourceType.eq(resource_type));

		match filter {
			RegistryFilter::All => {}
			RegistryFilter::Sync(state) => {
				query = query.filter(registry::Column::SyncState.eq(state.as_str()));
			}
			RegistryFilter::Verification(state) => {
				query = query.filter(registry::Column::VerificationState.eq(state.as_str()));
			}
		}

		Ok(query
			.order_by_asc(registry::Column::CreatedAt)
			.order_by_asc(registry::Column::Id)
			.offset(page.saturating_mul(per_page))
			.limit(per_page)
			.all(self.db.as_ref())
			.await?)
	}

	/// Aggregate counts per state for one resource type
	pub async fn status(&self, resource_type: &str) -> Result<ReplicationStatus, RegistryError> {
		let mut status = ReplicationStatus {
			resource_type: resource_type.to_string(),
			..Default::default()
		};

		let rows = self
			.db
			.query_all(Statement::from_sql_and_values(
				DbBackend::Sqlite,
				r#"
				SELECT sync_state, verification_state, marked_for_deletion, COUNT(*) AS count
				FROM registry
				WHERE resource_type = ?
				GROUP BY sync_state, verification_state, marked_for_deletion
				"#,
				vec![resource_type.into()],
			))
			.await?;

		for row in rows {
			let sync_state: String = row.try_get("", "sync_state")?;
			let verification_state: String = row.try_get("", "verification_state")?;
			let marked: bool = row.try_get("", "marked_for_deletion")?;
			let count: i64 = row.try_get("", "count")?;
			let count = count as u64;

			status.total += count;
			if marked {
				status.marked_for_deletion += count;
			}
			match SyncState::from_str(&sync_state) {
				Some(SyncState::Pending) => status.pending += count,
				Some(SyncState::Started) => status.started += count,
				Some(SyncState::Synced) => status.synced += count,
				Some(SyncState::Failed) => status.failed += count,
				None => {}
			}
			match VerificationState::from_str(&verification_state) {
				Some(VerificationState::Pending) => status.verification_pending += count,
				Some(VerificationState::Started) => status.verification_started += count,
				Some(VerificationState::Succeeded) => status.verified += count,
				Some(VerificationState::Failed) => status.verification_failed += count,
				Some(VerificationState::Disabled) => status.verification_disabled += count,
				None => {}
			}
		}

		Ok(status)
	}

	/// Atomically claim up to `limit` rows due for sync, marking them
	/// `started` under a fresh lease in the same statement.
	///
	/// Due: `pending` or `failed` with backoff elapsed, lease free or
	/// expired, not marked for deletion. Oldest retry deadline first, nulls
	/// (never attempted) ahead of everything.
	pub async fn claim_due_for_sync(
		&self,
		resource_type: &str,
		limit: u64,
		now: DateTime<Utc>,
	) -> Result<Vec<registry::Model>, RegistryError> {
		if limit == 0 {
			return Ok(Vec::new());
		}

		let token = Uuid::new_v4();
		let expires = now + self.lease_timeout;

		let claimed = registry::Entity::find()
			.from_raw_sql(Statement::from_sql_and_values(
				DbBackend::Sqlite,
				r#"
				UPDATE registry
				SET sync_state = 'started',
					lease_token = ?,
					lease_expires_at = ?,
					updated_at = ?
				WHERE id IN (
					SELECT id FROM registry
					WHERE resource_type = ?
						AND marked_for_deletion = 0
						AND sync_state IN ('pending', 'failed')
						AND (retry_at IS NULL OR retry_at <= ?)
						AND (lease_expires_at IS NULL OR lease_expires_at <= ?)
					ORDER BY retry_at ASC NULLS FIRST, created_at ASC
					LIMIT ?
				)
				RETURNING *
				"#,
				vec![
					token.into(),
					expires.into(),
					now.into(),
					resource_type.into(),
					now.into(),
					now.into(),
					(limit as i64).into(),
				],
			))
			.all(self.db.as_ref())
			.await?;

		debug!(
			resource_type = %resource_type,
			claimed = claimed.len(),
			"Claimed registries for sync"
		);

		Ok(claimed)
	}

	/// Atomically claim up to `limit` rows due for verification.
	///
	/// Due: `synced` rows whose verification is `pending` or `failed` with
	/// backoff elapsed. The claim takes the same lease as sync claims, so a
	/// row is never synced and verified concurrently.
	pub async fn claim_due_for_verification(
		&self,
		resource_type: &str,
		limit: u64,
		now: DateTime<Utc>,
	) -> Result<Vec<registry::Model>, RegistryError> {
		if limit == 0 {
			return Ok(Vec::new());
		}

		let token = Uuid::new_v4();
		let expires = now + self.lease_timeout;

		let claimed = registry::Entity::find()
			.from_raw_sql(Statement::from_sql_and_values(
				DbBackend::Sqlite,
				r#"
				UPDATE registry
				SET verification_state = 'started',
					lease_token = ?,
					lease_expires_at = ?,
					updated_at = ?
				WHERE id IN (
					SELECT id FROM registry
					WHERE resource_type = ?
						AND marked_for_deletion = 0
						AND sync_state = 'synced'
						AND verification_state IN ('pending', 'failed')
						AND (verification_retry_at IS NULL OR verification_retry_at <= ?)
						AND (lease_expires_at IS NULL OR lease_expires_at <= ?)
					ORDER BY verification_retry_at ASC NULLS FIRST, created_at ASC
					LIMIT ?
				)
				RETURNING *
				"#,
				vec![
					token.into(),
					expires.into(),
					now.into(),
					resource_type.into(),
					now.into(),
					now.into(),
					(limit as i64).into(),
				],
			))
			.all(self.db.as_ref())
			.await?;

		debug!(
			resource_type = %resource_type,
			claimed = claimed.len(),
			"Claimed registries for verification"
		);

		Ok(claimed)
	}

	/// Validated sync state transition.
	///
	/// Transitions out of `started` carry the claiming worker's lease token;
	/// a token mismatch means the lease expired and the row was reclaimed, in
	/// which case the late worker's outcome is discarded with
	/// [`RegistryError::StaleClaim`].
	pub async fn transition_sync(
		&self,
		id: i32,
		from: SyncState,
		to: SyncState,
		token: Option<Uuid>,
		reason: Option<&str>,
	) -> Result<registry::Model, RegistryError> {
		if !from.can_transition_to(to) {
			return Err(RegistryError::IllegalTransition {
				kind: "sync",
				from: from.to_string(),
				to: to.to_string(),
			});
		}

		let now = Utc::now();
		let row = self.get_by_id(id).await?;

		if row.sync_state != from.as_str() {
			return Err(RegistryError::StateConflict {
				id,
				kind: "sync",
				expected: from.to_string(),
				actual: row.sync_state.clone(),
			});
		}
		if from == SyncState::Started && row.lease_token != token {
			return Err(RegistryError::StaleClaim { id });
		}

		let mut update = registry::Entity::update_many()
			.filter(registry::Column::Id.eq(id))
			.filter(registry::Column::SyncState.eq(from.as_str()))
			.col_expr(registry::Column::SyncState, Expr::value(to.as_str()))
			.col_expr(registry::Column::UpdatedAt, Expr::value(now));

		if from == SyncState::Started {
			update = update.filter(registry::Column::LeaseToken.eq(token));
		}

		match to {
			SyncState::Started => {
				let token = token.ok_or(RegistryError::StaleClaim { id })?;
				update = update
					.col_expr(registry::Column::LeaseToken, Expr::value(token))
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(now + self.lease_timeout),
					);
			}
			SyncState::Synced => {
				update = update
					.col_expr(registry::Column::RetryCount, Expr::value(0))
					.col_expr(
						registry::Column::RetryAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					)
					.col_expr(
						registry::Column::LastSyncFailure,
						Expr::value(Option::<String>::None),
					)
					.col_expr(registry::Column::LastSyncedAt, Expr::value(now))
					.col_expr(
						registry::Column::LeaseToken,
						Expr::value(Option::<Uuid>::None),
					)
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					);

				// Every fresh copy is queued for re-verification
				if row.verification_state != VerificationState::Disabled.as_str() {
					update = update
						.col_expr(
							registry::Column::VerificationState,
							Expr::value(VerificationState::Pending.as_str()),
						)
						.col_expr(registry::Column::VerificationRetryCount, Expr::value(0))
						.col_expr(
							registry::Column::VerificationRetryAt,
							Expr::value(Option::<DateTime<Utc>>::None),
						);
				}
			}
			SyncState::Failed => {
				update = update
					.col_expr(
						registry::Column::RetryCount,
						Expr::value(row.retry_count + 1),
					)
					.col_expr(
						registry::Column::RetryAt,
						Expr::value(self.sync_backoff.next_retry_at(now, row.retry_count)),
					)
					.col_expr(
						registry::Column::LastSyncFailure,
						Expr::value(reason.map(str::to_string)),
					)
					.col_expr(
						registry::Column::LeaseToken,
						Expr::value(Option::<Uuid>::None),
					)
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					);
			}
			SyncState::Pending => {
				update = update.col_expr(registry::Column::RetryAt, Expr::value(now));
			}
		}

		let result = update.exec(self.db.as_ref()).await?;
		if result.rows_affected == 0 {
			return Err(RegistryError::StaleClaim { id });
		}

		self.get_by_id(id).await
	}

	/// Validated verification state transition.
	///
	/// `detail` carries the failure reason for `Failed` and the verified
	/// checksum for `Succeeded`.
	pub async fn transition_verification(
		&self,
		id: i32,
		from: VerificationState,
		to: VerificationState,
		token: Option<Uuid>,
		detail: Option<&str>,
	) -> Result<registry::Model, RegistryError> {
		if !from.can_transition_to(to) {
			return Err(RegistryError::IllegalTransition {
				kind: "verification",
				from: from.to_string(),
				to: to.to_string(),
			});
		}

		let now = Utc::now();
		let row = self.get_by_id(id).await?;

		if row.verification_state != from.as_str() {
			return Err(RegistryError::StateConflict {
				id,
				kind: "verification",
				expected: from.to_string(),
				actual: row.verification_state.clone(),
			});
		}
		if from == VerificationState::Started && row.lease_token != token {
			return Err(RegistryError::StaleClaim { id });
		}
		// A resource that is not synced cannot be verified
		if to == VerificationState::Started && row.sync_state != SyncState::Synced.as_str() {
			return Err(RegistryError::IllegalTransition {
				kind: "verification",
				from: format!("{from} (sync_state {})", row.sync_state),
				to: to.to_string(),
			});
		}

		let mut update = registry::Entity::update_many()
			.filter(registry::Column::Id.eq(id))
			.filter(registry::Column::VerificationState.eq(from.as_str()))
			.col_expr(
				registry::Column::VerificationState,
				Expr::value(to.as_str()),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now));

		if from == VerificationState::Started {
			update = update.filter(registry::Column::LeaseToken.eq(token));
		}

		match to {
			VerificationState::Started => {
				let token = token.ok_or(RegistryError::StaleClaim { id })?;
				update = update
					.col_expr(registry::Column::LeaseToken, Expr::value(token))
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(now + self.lease_timeout),
					);
			}
			VerificationState::Succeeded => {
				update = update
					.col_expr(
						registry::Column::VerificationChecksum,
						Expr::value(detail.map(str::to_string)),
					)
					.col_expr(registry::Column::VerifiedAt, Expr::value(now))
					.col_expr(
						registry::Column::VerificationFailure,
						Expr::value(Option::<String>::None),
					)
					.col_expr(registry::Column::VerificationRetryCount, Expr::value(0))
					.col_expr(
						registry::Column::VerificationRetryAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					)
					.col_expr(registry::Column::MismatchCount, Expr::value(0))
					.col_expr(
						registry::Column::LeaseToken,
						Expr::value(Option::<Uuid>::None),
					)
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					);
			}
			VerificationState::Failed => {
				update = update
					.col_expr(
						registry::Column::VerificationRetryCount,
						Expr::value(row.verification_retry_count + 1),
					)
					.col_expr(
						registry::Column::VerificationRetryAt,
						Expr::value(
							self.verification_backoff
								.next_retry_at(now, row.verification_retry_count),
						),
					)
					.col_expr(
						registry::Column::VerificationFailure,
						Expr::value(detail.map(str::to_string)),
					)
					.col_expr(
						registry::Column::LeaseToken,
						Expr::value(Option::<Uuid>::None),
					)
					.col_expr(
						registry::Column::LeaseExpiresAt,
						Expr::value(Option::<DateTime<Utc>>::None),
					);
			}
			VerificationState::Pending => {
				update = update.col_expr(
					registry::Column::VerificationRetryAt,
					Expr::value(Option::<DateTime<Utc>>::None),
				);
			}
			VerificationState::Disabled => {}
		}

		let result = update.exec(self.db.as_ref()).await?;
		if result.rows_affected == 0 {
			return Err(RegistryError::StaleClaim { id });
		}

		self.get_by_id(id).await
	}

	/// Record a checksum mismatch found during verification.
	///
	/// Fails the verification with its own backoff and counts the mismatch.
	/// Once `threshold` consecutive mismatches accumulate, the sync state is
	/// forced back to `pending` (the local copy is presumed stale or corrupt)
	/// and the counter starts over for the fresh copy.
	///
	/// Returns the updated row and whether a resync was forced.
	pub async fn record_checksum_mismatch(
		&self,
		id: i32,
		token: Uuid,
		local: &str,
		primary: &str,
		threshold: i32,
	) -> Result<(registry::Model, bool), RegistryError> {
		let now = Utc::now();
		let row = self.get_by_id(id).await?;

		if row.verification_state != VerificationState::Started.as_str()
			|| row.lease_token != Some(token)
		{
			return Err(RegistryError::StaleClaim { id });
		}

		let mismatches = row.mismatch_count + 1;
		let escalate = mismatches >= threshold.max(1);
		let reason = format!("checksum mismatch: local {local} != primary {primary}");

		let mut update = registry::Entity::update_many()
			.filter(registry::Column::Id.eq(id))
			.filter(
				registry::Column::VerificationState.eq(VerificationState::Started.as_str()),
			)
			.filter(registry::Column::LeaseToken.eq(token))
			.col_expr(
				registry::Column::VerificationState,
				Expr::value(VerificationState::Failed.as_str()),
			)
			.col_expr(
				registry::Column::VerificationFailure,
				Expr::value(reason.clone()),
			)
			.col_expr(
				registry::Column::VerificationRetryCount,
				Expr::value(row.verification_retry_count + 1),
			)
			.col_expr(
				registry::Column::VerificationRetryAt,
				Expr::value(
					self.verification_backoff
						.next_retry_at(now, row.verification_retry_count),
				),
			)
			.col_expr(
				registry::Column::MismatchCount,
				Expr::value(if escalate { 0 } else { mismatches }),
			)
			.col_expr(
				registry::Column::LeaseToken,
				Expr::value(Option::<Uuid>::None),
			)
			.col_expr(
				registry::Column::LeaseExpiresAt,
				Expr::value(Option::<DateTime<Utc>>::None),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now));

		if escalate {
			warn!(
				id = id,
				mismatches = mismatches,
				"Mismatch threshold reached; forcing resync"
			);
			update = update
				.col_expr(
					registry::Column::SyncState,
					Expr::value(SyncState::Pending.as_str()),
				)
				.col_expr(registry::Column::RetryCount, Expr::value(0))
				.col_expr(registry::Column::RetryAt, Expr::value(now));
		}

		let result = update.exec(self.db.as_ref()).await?;
		if result.rows_affected == 0 {
			return Err(RegistryError::StaleClaim { id });
		}

		Ok((self.get_by_id(id).await?, escalate))
	}

	/// Record that the primary reports the resource as gone (terminal).
	///
	/// The row is excluded from all future claims and surfaced to operators
	/// instead of being retried forever.
	pub async fn record_missing(
		&self,
		id: i32,
		token: Uuid,
		reason: &str,
	) -> Result<registry::Model, RegistryError> {
		let now = Utc::now();
		let row = self.get_by_id(id).await?;

		if row.lease_token != Some(token) {
			return Err(RegistryError::StaleClaim { id });
		}

		let mut update = registry::Entity::update_many()
			.filter(registry::Column::Id.eq(id))
			.filter(registry::Column::LeaseToken.eq(token))
			.col_expr(registry::Column::MarkedForDeletion, Expr::value(true))
			.col_expr(
				registry::Column::LeaseToken,
				Expr::value(Option::<Uuid>::None),
			)
			.col_expr(
				registry::Column::LeaseExpiresAt,
				Expr::value(Option::<DateTime<Utc>>::None),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now));

		if row.sync_state == SyncState::Started.as_str() {
			update = update
				.col_expr(
					registry::Column::SyncState,
					Expr::value(SyncState::Failed.as_str()),
				)
				.col_expr(
					registry::Column::LastSyncFailure,
					Expr::value(reason.to_string()),
				);
		}
		if row.verification_state == VerificationState::Started.as_str() {
			update = update
				.col_expr(
					registry::Column::VerificationState,
					Expr::value(VerificationState::Failed.as_str()),
				)
				.col_expr(
					registry::Column::VerificationFailure,
					Expr::value(reason.to_string()),
				);
		}

		let result = update.exec(self.db.as_ref()).await?;
		if result.rows_affected == 0 {
			return Err(RegistryError::StaleClaim { id });
		}

		self.get_by_id(id).await
	}

	/// Reclaim `started` rows whose lease expired (crashed or hung worker).
	///
	/// Each becomes `failed` with a synthetic reason and enters normal
	/// backoff; no operator intervention needed. Returns the reclaimed count.
	pub async fn reclaim_expired(
		&self,
		resource_type: &str,
		now: DateTime<Utc>,
	) -> Result<u64, RegistryError> {
		let mut reclaimed = 0;

		let stale_syncs = registry::Entity::find()
			.filter(registry::Column::ResourceType.eq(resource_type))
			.filter(registry::Column::SyncState.eq(SyncState::Started.as_str()))
			.filter(registry::Column::LeaseExpiresAt.lte(now))
			.all(self.db.as_ref())
			.await?;

		for row in stale_syncs {
			let result = registry::Entity::update_many()
				.filter(registry::Column::Id.eq(row.id))
				.filter(registry::Column::SyncState.eq(SyncState::Started.as_str()))
				.filter(registry::Column::LeaseToken.eq(row.lease_token))
				.col_expr(
					registry::Column::SyncState,
					Expr::value(SyncState::Failed.as_str()),
				)
				.col_expr(
					registry::Column::RetryCount,
					Expr::value(row.retry_count + 1),
				)
				.col_expr(
					registry::Column::RetryAt,
					Expr::value(self.sync_backoff.next_retry_at(now, row.retry_count)),
				)
				.col_expr(
					registry::Column::LastSyncFailure,
					Expr::value("sync lease expired; attempt abandoned".to_string()),
				)
				.col_expr(
					registry::Column::LeaseToken,
					Expr::value(Option::<Uuid>::None),
				)
				.col_expr(
					registry::Column::LeaseExpiresAt,
					Expr::value(Option::<DateTime<Utc>>::None),
				)
				.col_expr(registry::Column::UpdatedAt, Expr::value(now))
				.exec(self.db.as_ref())
				.await?;
			reclaimed += result.rows_affected;
		}

		let stale_verifications = registry::Entity::find()
			.filter(registry::Column::ResourceType.eq(resource_type))
			.filter(
				registry::Column::VerificationState.eq(VerificationState::Started.as_str()),
			)
			.filter(registry::Column::LeaseExpiresAt.lte(now))
			.all(self.db.as_ref())
			.await?;

		for row in stale_verifications {
			let result = registry::Entity::update_many()
				.filter(registry::Column::Id.eq(row.id))
				.filter(
					registry::Column::VerificationState
						.eq(VerificationState::Started.as_str()),
				)
				.filter(registry::Column::LeaseToken.eq(row.lease_token))
				.col_expr(
					registry::Column::VerificationState,
					Expr::value(VerificationState::Failed.as_str()),
				)
				.col_expr(
					registry::Column::VerificationRetryCount,
					Expr::value(row.verification_retry_count + 1),
				)
				.col_expr(
					registry::Column::VerificationRetryAt,
					Expr::value(
						self.verification_backoff
							.next_retry_at(now, row.verification_retry_count),
					),
				)
				.col_expr(
					registry::Column::VerificationFailure,
					Expr::value("verification lease expired; attempt abandoned".to_string()),
				)
				.col_expr(
					registry::Column::LeaseToken,
					Expr::value(Option::<Uuid>::None),
				)
				.col_expr(
					registry::Column::LeaseExpiresAt,
					Expr::value(Option::<DateTime<Utc>>::None),
				)
				.col_expr(registry::Column::UpdatedAt, Expr::value(now))
				.exec(self.db.as_ref())
				.await?;
			reclaimed += result.rows_affected;
		}

		if reclaimed > 0 {
			warn!(
				resource_type = %resource_type,
				reclaimed = reclaimed,
				"Reclaimed expired leases"
			);
		}

		Ok(reclaimed)
	}

	/// Force one registry back to `pending` with an immediate retry,
	/// bypassing backoff. Rows under a live lease are left alone; their
	/// outcome lands first and the next tick picks them up.
	pub async fn resync(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<bool, RegistryError> {
		let updated = self
			.force_pending(
				registry::Entity::update_many()
					.filter(registry::Column::ResourceType.eq(resource_type))
					.filter(registry::Column::ResourceId.eq(resource_id)),
			)
			.await?;

		Ok(updated > 0)
	}

	/// Force every registry of a type back to `pending` (operator action,
	/// also the effect of a `cache_invalidated` event)
	pub async fn resync_all(&self, resource_type: &str) -> Result<u64, RegistryError> {
		self.force_pending(
			registry::Entity::update_many()
				.filter(registry::Column::ResourceType.eq(resource_type)),
		)
		.await
	}

	async fn force_pending(
		&self,
		update: sea_orm::UpdateMany<registry::Entity>,
	) -> Result<u64, RegistryError> {
		let now = Utc::now();

		let result = update
			.filter(registry::Column::MarkedForDeletion.eq(false))
			.filter(registry::Column::SyncState.is_in([
				SyncState::Pending.as_str(),
				SyncState::Synced.as_str(),
				SyncState::Failed.as_str(),
			]))
			.filter(
				Condition::any()
					.add(registry::Column::LeaseExpiresAt.is_null())
					.add(registry::Column::LeaseExpiresAt.lte(now)),
			)
			.col_expr(
				registry::Column::SyncState,
				Expr::value(SyncState::Pending.as_str()),
			)
			.col_expr(registry::Column::RetryCount, Expr::value(0))
			.col_expr(registry::Column::RetryAt, Expr::value(now))
			.col_expr(
				registry::Column::LastSyncFailure,
				Expr::value(Option::<String>::None),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now))
			.exec(self.db.as_ref())
			.await?;

		Ok(result.rows_affected)
	}

	/// Force one synced registry's verification back to `pending`,
	/// bypassing backoff
	pub async fn reverify(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<bool, RegistryError> {
		let updated = self
			.force_verification_pending(
				registry::Entity::update_many()
					.filter(registry::Column::ResourceType.eq(resource_type))
					.filter(registry::Column::ResourceId.eq(resource_id)),
			)
			.await?;

		Ok(updated > 0)
	}

	/// Force verification of every synced registry of a type
	pub async fn reverify_all(&self, resource_type: &str) -> Result<u64, RegistryError> {
		self.force_verification_pending(
			registry::Entity::update_many()
				.filter(registry::Column::ResourceType.eq(resource_type)),
		)
		.await
	}

	async fn force_verification_pending(
		&self,
		update: sea_orm::UpdateMany<registry::Entity>,
	) -> Result<u64, RegistryError> {
		let now = Utc::now();

		let result = update
			.filter(registry::Column::MarkedForDeletion.eq(false))
			.filter(registry::Column::SyncState.eq(SyncState::Synced.as_str()))
			.filter(registry::Column::VerificationState.is_in([
				VerificationState::Pending.as_str(),
				VerificationState::Succeeded.as_str(),
				VerificationState::Failed.as_str(),
			]))
			.filter(
				Condition::any()
					.add(registry::Column::LeaseExpiresAt.is_null())
					.add(registry::Column::LeaseExpiresAt.lte(now)),
			)
			.col_expr(
				registry::Column::VerificationState,
				Expr::value(VerificationState::Pending.as_str()),
			)
			.col_expr(registry::Column::VerificationRetryCount, Expr::value(0))
			.col_expr(
				registry::Column::VerificationRetryAt,
				Expr::value(Option::<DateTime<Utc>>::None),
			)
			.col_expr(
				registry::Column::VerificationFailure,
				Expr::value(Option::<String>::None),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now))
			.exec(self.db.as_ref())
			.await?;

		Ok(result.rows_affected)
	}

	/// Requeue verifications that succeeded before `cutoff` (periodic
	/// re-verification)
	pub async fn requeue_verification(
		&self,
		resource_type: &str,
		cutoff: DateTime<Utc>,
	) -> Result<u64, RegistryError> {
		let now = Utc::now();

		let result = registry::Entity::update_many()
			.filter(registry::Column::ResourceType.eq(resource_type))
			.filter(registry::Column::MarkedForDeletion.eq(false))
			.filter(registry::Column::SyncState.eq(SyncState::Synced.as_str()))
			.filter(
				registry::Column::VerificationState.eq(VerificationState::Succeeded.as_str()),
			)
			.filter(registry::Column::VerifiedAt.lte(cutoff))
			.filter(
				Condition::any()
					.add(registry::Column::LeaseExpiresAt.is_null())
					.add(registry::Column::LeaseExpiresAt.lte(now)),
			)
			.col_expr(
				registry::Column::VerificationState,
				Expr::value(VerificationState::Pending.as_str()),
			)
			.col_expr(
				registry::Column::VerificationRetryAt,
				Expr::value(Option::<DateTime<Utc>>::None),
			)
			.col_expr(registry::Column::UpdatedAt, Expr::value(now))
			.exec(self.db.as_ref())
			.await?;

		Ok(result.rows_affected)
	}

	/// Remove the registry row for a deleted resource (idempotent)
	pub async fn delete(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<bool, RegistryError> {
		let result = registry::Entity::delete_many()
			.filter(registry::Column::ResourceType.eq(resource_type))
			.filter(registry::Column::ResourceId.eq(resource_id))
			.exec(self.db.as_ref())
			.await?;

		Ok(result.rows_affected > 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infra::db;
	use sea_orm::DatabaseConnection;
	use std::collections::HashSet;
	use tempfile::TempDir;

	async fn create_test_db() -> (Arc<DatabaseConnection>, TempDir) {
		let temp_dir = TempDir::new().unwrap();
		let url = db::sqlite_url(temp_dir.path());
		let conn = db::connect_and_migrate(&url).await.unwrap();

		(Arc::new(conn), temp_dir)
	}

	fn store(db: Arc<DatabaseConnection>) -> RegistryStore {
		RegistryStore::new(
			db,
			Backoff {
				base: Duration::from_secs(30),
				max_delay: Duration::from_secs(3600),
				exponent_cap: 10,
				jitter: 0.0,
			},
			Backoff {
				base: Duration::from_secs(60),
				max_delay: Duration::from_secs(3600),
				exponent_cap: 10,
				jitter: 0.0,
			},
			Duration::from_secs(300),
		)
	}

	#[tokio::test]
	async fn create_is_idempotent() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let resource_id = Uuid::new_v4();
		let first = store.create("widget", resource_id, true).await.unwrap();
		let second = store.create("widget", resource_id, true).await.unwrap();

		assert_eq!(first.id, second.id);
		assert_eq!(first.sync_state, "pending");
		assert_eq!(first.verification_state, "pending");
	}

	#[tokio::test]
	async fn create_with_verification_disabled() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let row = store.create("blob", Uuid::new_v4(), false).await.unwrap();
		assert_eq!(row.verification_state, "disabled");
	}

	#[tokio::test]
	async fn claim_marks_started_under_a_lease() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		for _ in 0..3 {
			store.create("widget", Uuid::new_v4(), true).await.unwrap();
		}

		let claimed = store
			.claim_due_for_sync("widget", 2, Utc::now())
			.await
			.unwrap();
		assert_eq!(claimed.len(), 2);
		for row in &claimed {
			assert_eq!(row.sync_state, "started");
			assert!(row.lease_token.is_some());
			assert!(row.lease_expires_at.unwrap() > Utc::now());
		}

		// Only the unclaimed row remains due
		let rest = store
			.claim_due_for_sync("widget", 10, Utc::now())
			.await
			.unwrap();
		assert_eq!(rest.len(), 1);
	}

	#[tokio::test]
	async fn concurrent_claims_are_disjoint() {
		let (db, _temp) = create_test_db().await;
		let store = Arc::new(store(db));

		for _ in 0..10 {
			store.create("widget", Uuid::new_v4(), true).await.unwrap();
		}

		let mut handles = Vec::new();
		for _ in 0..4 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store
					.claim_due_for_sync("widget", 5, Utc::now())
					.await
					.unwrap()
			}));
		}

		let mut seen = HashSet::new();
		let mut total = 0;
		for handle in handles {
			for row in handle.await.unwrap() {
				assert!(seen.insert(row.id), "row {} claimed twice", row.id);
				total += 1;
			}
		}

		// 4 claimers x limit 5 = capacity 20, but only 10 rows were due
		assert_eq!(total, 10);
	}

	#[tokio::test]
	async fn claim_respects_backoff_and_ordering() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);
		let now = Utc::now();

		let fresh = store.create("widget", Uuid::new_v4(), true).await.unwrap();

		// One failed row still inside backoff, one past it
		let waiting = store.create("widget", Uuid::new_v4(), true).await.unwrap();
		registry::Entity::update_many()
			.filter(registry::Column::Id.eq(waiting.id))
			.col_expr(registry::Column::SyncState, Expr::value("failed"))
			.col_expr(registry::Column::RetryAt, Expr::value(now + ChronoDuration::hours(1)))
			.exec(store.db.as_ref())
			.await
			.unwrap();

		let due = store.create("widget", Uuid::new_v4(), true).await.unwrap();
		registry::Entity::update_many()
			.filter(registry::Column::Id.eq(due.id))
			.col_expr(registry::Column::SyncState, Expr::value("failed"))
			.col_expr(registry::Column::RetryAt, Expr::value(now - ChronoDuration::minutes(5)))
			.exec(store.db.as_ref())
			.await
			.unwrap();

		let claimed = store.claim_due_for_sync("widget", 10, now).await.unwrap();
		let ids: Vec<i32> = claimed.iter().map(|r| r.id).collect();

		// The never-attempted row (NULL retry_at) sorts first; the row inside
		// backoff is not claimed at all.
		assert_eq!(ids, vec![fresh.id, due.id]);
	}

	#[tokio::test]
	async fn sync_success_resets_retries_and_queues_verification() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let claimed = store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap();
		let claim = &claimed[0];

		let row = store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Synced,
				claim.lease_token,
				None,
			)
			.await
			.unwrap();

		assert_eq!(row.sync_state, "synced");
		assert_eq!(row.retry_count, 0);
		assert!(row.retry_at.is_none());
		assert!(row.last_sync_failure.is_none());
		assert!(row.last_synced_at.is_some());
		assert_eq!(row.verification_state, "pending");
		assert!(row.lease_token.is_none());
	}

	#[tokio::test]
	async fn sync_failures_accumulate_with_backoff() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();

		// First failure: retry_count 1, retry_at 30s out
		let claim = &store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap()[0];
		let before = Utc::now();
		let row = store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Failed,
				claim.lease_token,
				Some("connection reset"),
			)
			.await
			.unwrap();
		assert_eq!(row.retry_count, 1);
		assert_eq!(row.last_sync_failure.as_deref(), Some("connection reset"));
		let first_retry_at = row.retry_at.unwrap();
		assert!(first_retry_at >= before + ChronoDuration::seconds(29));

		// Second failure (claim once backoff has passed): retry_count 2,
		// delay doubled
		let later = first_retry_at + ChronoDuration::seconds(1);
		let claim = &store.claim_due_for_sync("widget", 1, later).await.unwrap()[0];
		let row = store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Failed,
				claim.lease_token,
				Some("timeout"),
			)
			.await
			.unwrap();
		assert_eq!(row.retry_count, 2);
		assert!(row.retry_at.unwrap() > first_retry_at);
		assert!(row.retry_at.unwrap() >= Utc::now() + ChronoDuration::seconds(59));
	}

	#[tokio::test]
	async fn illegal_transitions_fail_fast() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let row = store.create("widget", Uuid::new_v4(), true).await.unwrap();

		let err = store
			.transition_sync(row.id, SyncState::Pending, SyncState::Synced, None, None)
			.await
			.unwrap_err();
		assert!(matches!(err, RegistryError::IllegalTransition { .. }));

		// Verifying a non-synced resource is a programming error
		let err = store
			.transition_verification(
				row.id,
				VerificationState::Pending,
				VerificationState::Started,
				Some(Uuid::new_v4()),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, RegistryError::IllegalTransition { .. }));
	}

	#[tokio::test]
	async fn stale_tokens_cannot_finish_a_claim() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let claim = &store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap()[0];

		let err = store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Synced,
				Some(Uuid::new_v4()),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, RegistryError::StaleClaim { .. }));

		// The rightful owner still can
		store
			.transition_sync(
				claim.id,
				SyncState::Started,
				SyncState::Synced,
				claim.lease_token,
				None,
			)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn expired_leases_are_reclaimed_as_failed() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let claim = &store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap()[0];

		// Nothing to reclaim while the lease is live
		assert_eq!(
			store.reclaim_expired("widget", Utc::now()).await.unwrap(),
			0
		);

		let past_expiry = claim.lease_expires_at.unwrap() + ChronoDuration::seconds(1);
		assert_eq!(
			store.reclaim_expired("widget", past_expiry).await.unwrap(),
			1
		);

		let row = store.get_by_id(claim.id).await.unwrap();
		assert_eq!(row.sync_state, "failed");
		assert_eq!(row.retry_count, 1);
		assert!(row.lease_token.is_none());
		assert_eq!(
			row.last_sync_failure.as_deref(),
			Some("sync lease expired; attempt abandoned")
		);
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
	async fn verification_claims_only_synced_rows() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		// One pending row, one synced row
		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let synced = synced_row(&store).await;

		let claimed = store
			.claim_due_for_verification("widget", 10, Utc::now())
			.await
			.unwrap();
		assert_eq!(claimed.len(), 1);
		assert_eq!(claimed[0].id, synced.id);
		assert_eq!(claimed[0].verification_state, "started");
	}

	#[tokio::test]
	async fn verification_success_records_checksum() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let synced = synced_row(&store).await;
		let claim = &store
			.claim_due_for_verification("widget", 1, Utc::now())
			.await
			.unwrap()[0];

		let row = store
			.transition_verification(
				claim.id,
				VerificationState::Started,
				VerificationState::Succeeded,
				claim.lease_token,
				Some("abc123"),
			)
			.await
			.unwrap();

		assert_eq!(row.id, synced.id);
		assert_eq!(row.verification_state, "succeeded");
		assert_eq!(row.verification_checksum.as_deref(), Some("abc123"));
		assert!(row.verified_at.is_some());
		assert_eq!(row.verification_retry_count, 0);
		assert_eq!(row.mismatch_count, 0);
	}

	#[tokio::test]
	async fn mismatches_escalate_to_forced_resync() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		synced_row(&store).await;

		// Two mismatches fail verification but keep the sync state
		for expected_count in 1..=2 {
			let claim = &store
				.claim_due_for_verification("widget", 1, Utc::now() + ChronoDuration::days(1))
				.await
				.unwrap()[0];
			let (row, escalated) = store
				.record_checksum_mismatch(claim.id, claim.lease_token.unwrap(), "abc", "def", 3)
				.await
				.unwrap();
			assert!(!escalated);
			assert_eq!(row.mismatch_count, expected_count);
			assert_eq!(row.verification_state, "failed");
			assert_eq!(row.verification_retry_count, expected_count);
			assert_eq!(row.sync_state, "synced");
			assert!(row
				.verification_failure
				.as_deref()
				.unwrap()
				.contains("checksum mismatch"));
		}

		// The third consecutive mismatch forces a resync
		let claim = &store
			.claim_due_for_verification("widget", 1, Utc::now() + ChronoDuration::days(1))
			.await
			.unwrap()[0];
		let (row, escalated) = store
			.record_checksum_mismatch(claim.id, claim.lease_token.unwrap(), "abc", "def", 3)
			.await
			.unwrap();
		assert!(escalated);
		assert_eq!(row.sync_state, "pending");
		assert_eq!(row.retry_count, 0);
		assert_eq!(row.mismatch_count, 0);
	}

	#[tokio::test]
	async fn resync_all_forces_pending_regardless_of_backoff() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		for _ in 0..5 {
			synced_row(&store).await;
		}

		let forced = store.resync_all("widget").await.unwrap();
		assert_eq!(forced, 5);

		let now = Utc::now();
		for row in store
			.list("widget", RegistryFilter::All, 0, 100)
			.await
			.unwrap()
		{
			assert_eq!(row.sync_state, "pending");
			assert!(row.retry_at.unwrap() <= now);
		}
	}

	#[tokio::test]
	async fn resync_skips_rows_under_a_live_lease() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let row = store.create("widget", Uuid::new_v4(), true).await.unwrap();
		store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap();

		assert!(!store.resync("widget", row.resource_id).await.unwrap());

		let current = store.get_by_id(row.id).await.unwrap();
		assert_eq!(current.sync_state, "started");
	}

	#[tokio::test]
	async fn reverify_all_requeues_synced_rows() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let synced = synced_row(&store).await;
		let claim = &store
			.claim_due_for_verification("widget", 1, Utc::now())
			.await
			.unwrap()[0];
		store
			.transition_verification(
				claim.id,
				VerificationState::Started,
				VerificationState::Succeeded,
				claim.lease_token,
				Some("abc"),
			)
			.await
			.unwrap();

		assert_eq!(store.reverify_all("widget").await.unwrap(), 1);

		let row = store.get_by_id(synced.id).await.unwrap();
		assert_eq!(row.verification_state, "pending");
		assert_eq!(row.verification_retry_count, 0);
	}

	#[tokio::test]
	async fn requeue_verification_by_age() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		let synced = synced_row(&store).await;
		let claim = &store
			.claim_due_for_verification("widget", 1, Utc::now())
			.await
			.unwrap()[0];
		store
			.transition_verification(
				claim.id,
				VerificationState::Started,
				VerificationState::Succeeded,
				claim.lease_token,
				Some("abc"),
			)
			.await
			.unwrap();

		// Cutoff before the verification: nothing to requeue
		let requeued = store
			.requeue_verification("widget", Utc::now() - ChronoDuration::hours(1))
			.await
			.unwrap();
		assert_eq!(requeued, 0);

		// Cutoff after it: requeued
		let requeued = store
			.requeue_verification("widget", Utc::now() + ChronoDuration::hours(1))
			.await
			.unwrap();
		assert_eq!(requeued, 1);
		assert_eq!(
			store.get_by_id(synced.id).await.unwrap().verification_state,
			"pending"
		);
	}

	#[tokio::test]
	async fn missing_resources_leave_the_claim_pool() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		let claim = &store
			.claim_due_for_sync("widget", 1, Utc::now())
			.await
			.unwrap()[0];

		let row = store
			.record_missing(
				claim.id,
				claim.lease_token.unwrap(),
				"resource no longer exists on primary",
			)
			.await
			.unwrap();
		assert!(row.marked_for_deletion);
		assert_eq!(row.sync_state, "failed");

		// Never claimed again, for sync or verification
		assert!(store
			.claim_due_for_sync("widget", 10, Utc::now() + ChronoDuration::days(1))
			.await
			.unwrap()
			.is_empty());
		assert!(store
			.claim_due_for_verification("widget", 10, Utc::now() + ChronoDuration::days(1))
			.await
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn status_counts_by_state() {
		let (db, _temp) = create_test_db().await;
		let store = store(db);

		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		store.create("widget", Uuid::new_v4(), true).await.unwrap();
		synced_row(&store).await;
		store.create("gadget", Uuid::new_v4(), true).await.unwrap();

		let status = store.status("widget").await.unwrap();
		assert_eq!(status.total, 3);
		assert_eq!(status.pending, 2);
		assert_eq!(status.synced, 1);
		assert_eq!(status.verification_pending, 3);
		assert_eq!(status.marked_for_deletion, 0);
	}
}
