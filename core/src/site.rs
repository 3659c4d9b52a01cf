//! Site role resolution
//!
//! A single injected object answers "am I the primary?" and "does replication
//! run for this resource type here?". Every component consults it before
//! claiming work; on a primary the scheduler and verifier exist but never
//! claim, so the same binary serves both roles.

use crate::config::ReplicationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deployment role of the running process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteRole {
	/// Source of truth; appends to the event log, never replicates
	Primary,
	/// Read replica; consumes events, syncs and verifies
	Secondary,
}

#[derive(Debug, Clone, Copy)]
struct TypeCapabilities {
	enabled: bool,
	verification_enabled: bool,
}

/// Pure predicates over the site's configuration; no I/O
#[derive(Debug, Clone)]
pub struct SiteRoleResolver {
	site_id: String,
	role: SiteRole,
	types: HashMap<String, TypeCapabilities>,
}

impl SiteRoleResolver {
	pub fn new(config: &ReplicationConfig) -> Self {
		let types = config
			.resource_types
			.iter()
			.map(|t| {
				(
					t.name.clone(),
					TypeCapabilities {
						enabled: t.enabled,
						verification_enabled: t.verification_enabled,
					},
				)
			})
			.collect();

		Self {
			site_id: config.site_id.clone(),
			role: config.role,
			types,
		}
	}

	/// Identifier of this site; the event cursor key
	pub fn site_id(&self) -> &str {
		&self.site_id
	}

	pub fn is_primary(&self) -> bool {
		self.role == SiteRole::Primary
	}

	/// Whether this site replicates the given resource type. Always false on
	/// the primary and for unconfigured types.
	pub fn replication_enabled_for(&self, resource_type: &str) -> bool {
		!self.is_primary()
			&& self
				.types
				.get(resource_type)
				.map(|t| t.enabled)
				.unwrap_or(false)
	}

	/// Whether checksum verification runs for the given resource type
	pub fn verification_enabled_for(&self, resource_type: &str) -> bool {
		self.replication_enabled_for(resource_type)
			&& self
				.types
				.get(resource_type)
				.map(|t| t.verification_enabled)
				.unwrap_or(false)
	}
}
