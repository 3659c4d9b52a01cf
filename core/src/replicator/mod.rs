//! Replicators: per-resource-type fetch/apply and checksum computation
//!
//! A replicator knows how to pull one resource type's payload from the
//! primary, apply it locally, and compute a checksum over the local copy.
//! Implementations are registered in a [`ReplicatorMap`] at startup and
//! resolved by resource type identifier.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub mod blob;
pub mod checksum;
pub mod transport;

pub use blob::BlobReplicator;
pub use transport::{PrimaryTransport, TransportError};

/// Replication errors, classified so the scheduler can pick a retry policy
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
	/// Retried under backoff (timeouts, connection resets, partial I/O)
	#[error("transient: {0}")]
	Transient(String),

	/// Terminal: the primary reports the resource gone; the registry is
	/// marked for deletion instead of retrying forever
	#[error("resource no longer exists on primary")]
	Missing,

	/// Startup configuration error; fails fast, never retried
	#[error("no replicator registered for resource type '{0}'")]
	UnknownResourceType(String),
}

impl ReplicationError {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Missing | Self::UnknownResourceType(_))
	}
}

impl From<TransportError> for ReplicationError {
	fn from(err: TransportError) -> Self {
		match err {
			TransportError::Transient(reason) => Self::Transient(reason),
			TransportError::Missing => Self::Missing,
		}
	}
}

impl From<std::io::Error> for ReplicationError {
	fn from(err: std::io::Error) -> Self {
		Self::Transient(err.to_string())
	}
}

/// Per-resource-type replication behavior
#[async_trait]
pub trait Replicator: Send + Sync {
	/// Resource type identifier this replicator serves
	fn resource_type(&self) -> &'static str;

	/// Fetch the resource's payload from the primary and apply it locally,
	/// returning the checksum of the applied copy.
	///
	/// Must be retriable: a partial failure leaves the replica stale, never
	/// corrupt-but-applied.
	async fn fetch_and_apply(&self, resource_id: Uuid) -> Result<String, ReplicationError>;

	/// Compute the checksum of the local copy
	async fn compute_local_checksum(&self, resource_id: Uuid)
		-> Result<String, ReplicationError>;
}

impl std::fmt::Debug for dyn Replicator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Replicator")
			.field("resource_type", &self.resource_type())
			.finish()
	}
}

/// Resource type identifier -> replicator, resolved at startup
#[derive(Default)]
pub struct ReplicatorMap {
	inner: HashMap<&'static str, Arc<dyn Replicator>>,
}

impl ReplicatorMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(mut self, replicator: Arc<dyn Replicator>) -> Self {
		self.inner.insert(replicator.resource_type(), replicator);
		self
	}

	pub fn get(&self, resource_type: &str) -> Result<Arc<dyn Replicator>, ReplicationError> {
		self.inner
			.get(resource_type)
			.cloned()
			.ok_or_else(|| ReplicationError::UnknownResourceType(resource_type.to_string()))
	}

	pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.inner.keys().copied()
	}

	pub fn contains(&self, resource_type: &str) -> bool {
		self.inner.contains_key(resource_type)
	}
}
