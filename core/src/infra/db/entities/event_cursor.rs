//! Event cursor entity
//!
//! Per-site, per-resource-type consumption progress over the event log.
//! Advances monotonically, and only after the corresponding registry effects
//! have been durably applied.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "event_cursor")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	/// Consuming site identifier
	pub site: String,

	pub resource_type: String,

	/// Sequence of the last event whose effects are durably applied
	pub last_sequence: i64,

	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
