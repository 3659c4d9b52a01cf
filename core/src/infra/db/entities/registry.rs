//! Registry entity
//!
//! One row per replicated resource instance on a secondary site, tracking two
//! independent state machines: sync (is the local copy up to date?) and
//! verification (does the local copy still match the primary byte-for-byte?).

use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registry")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	/// UUID of the replicated resource on the primary
	pub resource_id: Uuid,

	/// Resource type identifier ("widget", "blob", ...)
	pub resource_type: String,

	/// Sync state: "pending", "started", "synced", "failed"
	pub sync_state: String,

	pub retry_count: i32,
	pub retry_at: Option<DateTimeUtc>,
	pub last_sync_failure: Option<String>,
	pub last_synced_at: Option<DateTimeUtc>,

	/// Verification state: "pending", "started", "succeeded", "failed", "disabled"
	pub verification_state: String,

	/// Locally computed checksum recorded by the last successful verification
	pub verification_checksum: Option<String>,
	pub verified_at: Option<DateTimeUtc>,
	pub verification_failure: Option<String>,
	pub verification_retry_count: i32,
	pub verification_retry_at: Option<DateTimeUtc>,

	/// Consecutive checksum mismatches since the last successful verification
	pub mismatch_count: i32,

	/// Exclusive claim shared by sync and verification workers. A row whose
	/// lease has not expired may only be transitioned by the token holder.
	pub lease_token: Option<Uuid>,
	pub lease_expires_at: Option<DateTimeUtc>,

	/// Primary reported the resource gone; excluded from all future claims
	pub marked_for_deletion: bool,

	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Sync lifecycle of a registry row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
	/// Known but not yet replicated (or queued for resync)
	Pending,
	/// Claimed by a worker under a lease
	Started,
	/// Local copy applied successfully
	Synced,
	/// Last attempt failed; retried after backoff
	Failed,
}

impl SyncState {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Started => "started",
			Self::Synced => "synced",
			Self::Failed => "failed",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"pending" => Some(Self::Pending),
			"started" => Some(Self::Started),
			"synced" => Some(Self::Synced),
			"failed" => Some(Self::Failed),
			_ => None,
		}
	}

	/// Transition table for the sync state machine.
	///
	/// `pending -> started -> {synced | failed}`; `failed -> started` is
	/// permitted (the claim path enforces that backoff has elapsed); a synced
	/// or failed row may be forced back to `pending` (events, operator
	/// resync). Everything else is rejected.
	pub fn can_transition_to(&self, to: SyncState) -> bool {
		matches!(
			(self, to),
			(Self::Pending, Self::Started)
				| (Self::Started, Self::Synced)
				| (Self::Started, Self::Failed)
				| (Self::Failed, Self::Started)
				| (Self::Failed, Self::Pending)
				| (Self::Synced, Self::Pending)
		)
	}
}

impl std::fmt::Display for SyncState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Verification lifecycle of a registry row, independent of sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
	/// Due for checksum reconciliation (requires `sync_state = synced`)
	Pending,
	/// Claimed by a verification worker under a lease
	Started,
	/// Local and primary checksums matched
	Succeeded,
	/// Checksum mismatch or transient failure; retried after backoff
	Failed,
	/// Verification switched off for this resource
	Disabled,
}

impl VerificationState {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Started => "started",
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::Disabled => "disabled",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"pending" => Some(Self::Pending),
			"started" => Some(Self::Started),
			"succeeded" => Some(Self::Succeeded),
			"failed" => Some(Self::Failed),
			"disabled" => Some(Self::Disabled),
			_ => None,
		}
	}

	/// Transition table for the verification state machine.
	///
	/// `pending -> started -> {succeeded | failed}`; `failed -> started`
	/// after its own backoff; `succeeded -> pending` on re-verification or
	/// after any new sync.
	pub fn can_transition_to(&self, to: VerificationState) -> bool {
		matches!(
			(self, to),
			(Self::Pending, Self::Started)
				| (Self::Started, Self::Succeeded)
				| (Self::Started, Self::Failed)
				| (Self::Failed, Self::Started)
				| (Self::Failed, Self::Pending)
				| (Self::Succeeded, Self::Pending)
		)
	}
}

impl std::fmt::Display for VerificationState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl Model {
	pub fn sync_state(&self) -> Option<SyncState> {
		SyncState::from_str(&self.sync_state)
	}

	pub fn verification_state(&self) -> Option<VerificationState> {
		VerificationState::from_str(&self.verification_state)
	}

	/// Whether the row is currently held by a worker whose lease has not expired
	pub fn lease_live(&self, now: DateTimeUtc) -> bool {
		self.lease_token.is_some()
			&& self.lease_expires_at.map(|at| at > now).unwrap_or(false)
	}

	pub fn lease_live_now(&self) -> bool {
		self.lease_live(Utc::now())
	}
}
