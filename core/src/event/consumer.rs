//! Event consumption
//!
//! Applies the event log to the registry, strictly ordered per resource type.
//! The cursor advances only after each event's registry effects are durably
//! applied, so consumption is at-least-once; every application is idempotent,
//! making the replay after a crash harmless.

use crate::event::log::{EventLog, EventLogError};
use crate::infra::db::entities::event_log::{Event, EventKind};
use crate::registry::{RegistryError, RegistryStore};
use crate::site::SiteRoleResolver;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
	#[error(transparent)]
	Log(#[from] EventLogError),

	#[error(transparent)]
	Registry(#[from] RegistryError),
}

/// Per-call consumption summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
	pub consumed: u64,
	pub last_sequence: i64,
}

pub struct EventConsumer {
	log: Arc<EventLog>,
	store: Arc<RegistryStore>,
	site: Arc<SiteRoleResolver>,
}

impl EventConsumer {
	pub fn new(
		log: Arc<EventLog>,
		store: Arc<RegistryStore>,
		site: Arc<SiteRoleResolver>,
	) -> Self {
		Self { log, store, site }
	}

	/// Consume up to `limit` events for one resource type, in sequence order
	pub async fn consume(
		&self,
		resource_type: &str,
		limit: u64,
	) -> Result<ConsumeSummary, ConsumeError> {
		let site_id = self.site.site_id().to_string();
		let cursor = self.log.cursor(&site_id, resource_type).await?;
		let events = self.log.read_after(resource_type, cursor, limit).await?;

		let mut summary = ConsumeSummary {
			consumed: 0,
			last_sequence: cursor,
		};

		for event in events {
			self.apply(&event).await?;
			self.log
				.advance_cursor(&site_id, resource_type, event.sequence)
				.await?;

			summary.consumed += 1;
			summary.last_sequence = event.sequence;
		}

		if summary.consumed > 0 {
			debug!(
				resource_type = %resource_type,
				consumed = summary.consumed,
				cursor = summary.last_sequence,
				"Consumed events"
			);
		}

		Ok(summary)
	}

	/// Apply one event to the registry (idempotent).
	///
	/// Rows holding a live lease are never touched here; the claim owner's
	/// outcome lands first and the next tick re-claims.
	async fn apply(&self, event: &Event) -> Result<(), ConsumeError> {
		let resource_type = event.resource_type.as_str();

		match event.kind {
			EventKind::Created | EventKind::Updated => {
				let Some(resource_id) = event.payload.resource_id else {
					warn!(
						resource_type = %resource_type,
						sequence = event.sequence,
						event = %event.kind,
						"Event without resource id; skipping"
					);
					return Ok(());
				};

				self.store
					.create(
						resource_type,
						resource_id,
						self.site.verification_enabled_for(resource_type),
					)
					.await?;

				// Fast path: a synced (or backed-off failed) copy becomes due
				// immediately instead of waiting out a stale polling cycle
				if event.kind == EventKind::Updated {
					self.store.resync(resource_type, resource_id).await?;
				}
			}
			EventKind::Deleted => {
				let Some(resource_id) = event.payload.resource_id else {
					warn!(
						resource_type = %resource_type,
						sequence = event.sequence,
						"Deleted event without resource id; skipping"
					);
					return Ok(());
				};

				self.store.delete(resource_type, resource_id).await?;
			}
			EventKind::CacheInvalidated => {
				let forced = self.store.resync_all(resource_type).await?;
				debug!(
					resource_type = %resource_type,
					forced = forced,
					"Cache invalidated; re-scanning type"
				);
			}
		}

		Ok(())
	}
}
