//! Event log entity
//!
//! Append-only, per-resource-type sequenced record of change notifications
//! emitted by the primary. Secondaries consume it through per-site cursors and
//! never mutate entries.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "event_log")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	/// Monotonic sequence number, strictly increasing per resource type
	pub sequence: i64,

	pub resource_type: String,

	/// Event kind: "created", "updated", "deleted", "cache_invalidated"
	pub event_name: String,

	/// JSON payload (resource reference + correlation id)
	#[sea_orm(column_type = "Text")]
	pub payload: String,

	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Kind of change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	Created,
	Updated,
	Deleted,
	/// Carries no resource id; forces a re-scan of every row of the type
	CacheInvalidated,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::Updated => "updated",
			Self::Deleted => "deleted",
			Self::CacheInvalidated => "cache_invalidated",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"created" => Some(Self::Created),
			"updated" => Some(Self::Updated),
			"deleted" => Some(Self::Deleted),
			"cache_invalidated" => Some(Self::CacheInvalidated),
			_ => None,
		}
	}
}

impl std::fmt::Display for EventKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Event payload: which resource the event refers to
///
/// `resource_id` is absent for `cache_invalidated` events. `correlation_id`
/// ties the event back to the primary-side mutation that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub correlation_id: Option<Uuid>,
}

impl EventPayload {
	pub fn for_resource(resource_id: Uuid) -> Self {
		Self {
			resource_id: Some(resource_id),
			correlation_id: None,
		}
	}
}

/// High-level event (for application use)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub sequence: i64,
	pub resource_type: String,
	pub kind: EventKind,
	pub payload: EventPayload,
	pub created_at: DateTime<Utc>,
}

impl Event {
	/// Convert from SeaORM model to application type
	pub fn from_model(model: Model) -> Result<Self, serde_json::Error> {
		Ok(Self {
			sequence: model.sequence,
			kind: EventKind::from_str(&model.event_name).unwrap_or(EventKind::Updated),
			resource_type: model.resource_type,
			payload: serde_json::from_str(&model.payload)?,
			created_at: model.created_at,
		})
	}
}
