//! Replication configuration
//!
//! Loaded from `outpost.json` in the data directory. Every tunable the
//! scheduler, verifier and registry store consume lives here.

use crate::backoff::Backoff;
use crate::site::SiteRole;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
	/// Config schema version
	pub version: u32,

	/// Identifier of this site; used as the event cursor key
	pub site_id: String,

	/// Whether this process runs as the primary or a secondary
	pub role: SiteRole,

	/// Data directory (database file, local blob storage)
	pub data_dir: PathBuf,

	/// Overrides the default `<data_dir>/outpost.db` SQLite URL
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub database_url: Option<String>,

	#[serde(default)]
	pub sync: SyncSettings,

	#[serde(default)]
	pub verification: VerificationSettings,

	/// Replicated resource types and their per-type limits
	#[serde(default)]
	pub resource_types: Vec<ResourceTypeSettings>,
}

/// Sync scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
	/// Seconds between scheduler ticks per resource type
	pub interval_secs: u64,

	/// Seconds a claim may stay in `started` before it is reclaimed
	pub lease_timeout_secs: u64,

	/// Maximum events consumed from the log per tick
	pub event_batch_limit: u64,

	pub backoff: BackoffSettings,
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			interval_secs: 10,
			lease_timeout_secs: 300,
			event_batch_limit: 100,
			backoff: BackoffSettings::default(),
		}
	}
}

/// Verification coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
	/// Seconds between verification ticks per resource type
	pub interval_secs: u64,

	/// Consecutive checksum mismatches before a forced resync
	pub mismatch_threshold: i32,

	/// Age in seconds after which a succeeded verification is requeued
	pub reverify_after_secs: u64,

	pub backoff: BackoffSettings,
}

impl Default for VerificationSettings {
	fn default() -> Self {
		Self {
			interval_secs: 60,
			mismatch_threshold: 3,
			reverify_after_secs: 7 * 24 * 3600,
			backoff: BackoffSettings {
				base_secs: 60,
				..BackoffSettings::default()
			},
		}
	}
}

/// Backoff tunables, converted to [`Backoff`] at component construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
	pub base_secs: u64,
	pub max_delay_secs: u64,
	pub exponent_cap: u32,
	pub jitter: f64,
}

impl Default for BackoffSettings {
	fn default() -> Self {
		Self {
			base_secs: 30,
			max_delay_secs: 3600,
			exponent_cap: 10,
			jitter: 0.2,
		}
	}
}

impl BackoffSettings {
	pub fn to_backoff(&self) -> Backoff {
		Backoff {
			base: Duration::from_secs(self.base_secs),
			max_delay: Duration::from_secs(self.max_delay_secs),
			exponent_cap: self.exponent_cap,
			jitter: self.jitter.clamp(0.0, 1.0),
		}
	}
}

/// Per-resource-type replication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTypeSettings {
	/// Resource type identifier, must match a registered replicator
	pub name: String,

	/// Whether replication runs for this type at all
	#[serde(default = "default_true")]
	pub enabled: bool,

	/// Maximum concurrently started syncs (and verifications) per tick
	#[serde(default = "default_concurrency")]
	pub max_concurrency: u32,

	/// Whether checksum verification runs for this type
	#[serde(default = "default_true")]
	pub verification_enabled: bool,
}

fn default_true() -> bool {
	true
}

fn default_concurrency() -> u32 {
	4
}

impl ResourceTypeSettings {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			enabled: true,
			max_concurrency: default_concurrency(),
			verification_enabled: true,
		}
	}
}

impl ReplicationConfig {
	/// A secondary-site config rooted at `data_dir`, suitable as a starting
	/// point before types are added
	pub fn secondary(site_id: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
		Self {
			version: 1,
			site_id: site_id.into(),
			role: SiteRole::Secondary,
			data_dir: data_dir.into(),
			database_url: None,
			sync: SyncSettings::default(),
			verification: VerificationSettings::default(),
			resource_types: Vec::new(),
		}
	}

	pub fn with_resource_type(mut self, settings: ResourceTypeSettings) -> Self {
		self.resource_types.push(settings);
		self
	}

	/// SQLite URL, derived from the data dir unless overridden
	pub fn database_url(&self) -> String {
		self.database_url
			.clone()
			.unwrap_or_else(|| crate::infra::db::sqlite_url(&self.data_dir))
	}

	pub fn resource_type(&self, name: &str) -> Option<&ResourceTypeSettings> {
		self.resource_types.iter().find(|t| t.name == name)
	}

	/// Load configuration from a specific data directory
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join("outpost.json");

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let contents = fs::read_to_string(&config_path)
				.with_context(|| format!("Failed to read config at {config_path:?}"))?;
			let mut config: Self = serde_json::from_str(&contents)
				.with_context(|| format!("Failed to parse config at {config_path:?}"))?;
			config.data_dir = data_dir.to_path_buf();

			Ok(config)
		} else {
			info!("No config at {:?}, using defaults", config_path);

			Ok(Self::secondary("secondary", data_dir))
		}
	}

	/// Persist configuration to its data directory
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)
			.with_context(|| format!("Failed to create data dir {:?}", self.data_dir))?;

		let config_path = self.data_dir.join("outpost.json");
		let contents = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, contents)
			.with_context(|| format!("Failed to write config at {config_path:?}"))?;

		Ok(())
	}
}
