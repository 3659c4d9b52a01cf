//! Event log store
//!
//! Append-only log of change notifications, sequenced per resource type, with
//! per-site read cursors. The primary appends; secondaries read and advance
//! their cursor, never mutating entries. Entries are pruned once every known
//! cursor has passed them.

use crate::infra::db::entities::event_cursor;
use crate::infra::db::entities::event_log::{self, Event, EventKind, EventPayload};
use chrono::Utc;
use sea_orm::{
	ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
	QueryOrder, QuerySelect, Statement,
};
use std::sync::Arc;
use tracing::debug;

/// Event log errors
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
	#[error("database error: {0}")]
	Database(#[from] DbErr),

	#[error("payload error: {0}")]
	Payload(#[from] serde_json::Error),
}

pub struct EventLog {
	db: Arc<DatabaseConnection>,
}

impl EventLog {
	pub fn new(db: Arc<DatabaseConnection>) -> Self {
		Self { db }
	}

	/// Append an event, assigning the next sequence for the type inside the
	/// insert itself so concurrent producers cannot interleave
	pub async fn append(
		&self,
		resource_type: &str,
		kind: EventKind,
		payload: &EventPayload,
	) -> Result<i64, EventLogError> {
		let payload_json = serde_json::to_string(payload)?;
		let now = Utc::now();

		let row = self
			.db
			.query_one(Statement::from_sql_and_values(
				DbBackend::Sqlite,
				r#"
				INSERT INTO event_log (resource_type, event_name, payload, created_at, sequence)
				VALUES (?, ?, ?, ?, (
					SELECT COALESCE(MAX(sequence), 0) + 1 FROM event_log WHERE resource_type = ?
				))
				RETURNING sequence
				"#,
				vec![
					resource_type.into(),
					kind.as_str().into(),
					payload_json.into(),
					now.into(),
					resource_type.into(),
				],
			))
			.await?
			.ok_or_else(|| DbErr::Custom("append returned no row".to_string()))?;

		let sequence: i64 = row.try_get("", "sequence")?;

		debug!(
			resource_type = %resource_type,
			event = %kind,
			sequence = sequence,
			"Appended event"
		);

		Ok(sequence)
	}

	/// Read events in the inclusive-exclusive range `(cursor, cursor + limit]`,
	/// ordered by sequence
	pub async fn read_after(
		&self,
		resource_type: &str,
		cursor: i64,
		limit: u64,
	) -> Result<Vec<Event>, EventLogError> {
		let models = event_log::Entity::find()
			.filter(event_log::Column::ResourceType.eq(resource_type))
			.filter(event_log::Column::Sequence.gt(cursor))
			.order_by_asc(event_log::Column::Sequence)
			.limit(limit)
			.all(self.db.as_ref())
			.await?;

		models
			.into_iter()
			.map(|m| Event::from_model(m).map_err(EventLogError::Payload))
			.collect()
	}

	/// Last consumed sequence for a site (0 when the site has never consumed)
	pub async fn cursor(&self, site: &str, resource_type: &str) -> Result<i64, EventLogError> {
		Ok(event_cursor::Entity::find()
			.filter(event_cursor::Column::Site.eq(site))
			.filter(event_cursor::Column::ResourceType.eq(resource_type))
			.one(self.db.as_ref())
			.await?
			.map(|c| c.last_sequence)
			.unwrap_or(0))
	}

	/// Advance a site's cursor (monotonic; an older sequence is ignored).
	///
	/// Called only after the registry effects of the sequence are durably
	/// applied, so a crash between apply and advance replays the event —
	/// at-least-once, made safe by idempotent consumption.
	pub async fn advance_cursor(
		&self,
		site: &str,
		resource_type: &str,
		sequence: i64,
	) -> Result<(), EventLogError> {
		self.db
			.execute(Statement::from_sql_and_values(
				DbBackend::Sqlite,
				r#"
				INSERT INTO event_cursor (site, resource_type, last_sequence, updated_at)
				VALUES (?, ?, ?, ?)
				ON CONFLICT (site, resource_type)
				DO UPDATE SET
					last_sequence = excluded.last_sequence,
					updated_at = excluded.updated_at
				WHERE excluded.last_sequence > event_cursor.last_sequence
				"#,
				vec![
					site.into(),
					resource_type.into(),
					sequence.into(),
					Utc::now().into(),
				],
			))
			.await?;

		Ok(())
	}

	/// Delete events every known cursor has passed. Returns the pruned count;
	/// a no-op while no cursor exists for the type.
	pub async fn prune(&self, resource_type: &str) -> Result<u64, EventLogError> {
		let cursors = event_cursor::Entity::find()
			.filter(event_cursor::Column::ResourceType.eq(resource_type))
			.all(self.db.as_ref())
			.await?;

		let Some(min_cursor) = cursors.iter().map(|c| c.last_sequence).min() else {
			return Ok(0);
		};

		let result = event_log::Entity::delete_many()
			.filter(event_log::Column::ResourceType.eq(resource_type))
			.filter(event_log::Column::Sequence.lte(min_cursor))
			.exec(self.db.as_ref())
			.await?;

		if result.rows_affected > 0 {
			debug!(
				resource_type = %resource_type,
				below = min_cursor,
				pruned = result.rows_affected,
				"Pruned consumed events"
			);
		}

		Ok(result.rows_affected)
	}
}
