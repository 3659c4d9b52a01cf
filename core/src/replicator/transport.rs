//! Primary-side transport contract
//!
//! The byte transport that fetches payloads and checksums from the primary is
//! an external collaborator; the core consumes it through this trait and only
//! cares about the classification of its failures.

use async_trait::async_trait;
use uuid::Uuid;

/// Transport failures, typed so the core can tell retriable from terminal
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	/// Timeout, connection reset, and friends; retried under backoff
	#[error("transient transport error: {0}")]
	Transient(String),

	/// The primary reports the resource does not exist (terminal)
	#[error("resource missing on primary")]
	Missing,
}

/// Fetches payloads and checksums from the primary site
#[async_trait]
pub trait PrimaryTransport: Send + Sync {
	/// Checksum of the resource as the primary computes it
	async fn fetch_checksum(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<String, TransportError>;

	/// Full payload of the resource
	async fn fetch_payload(
		&self,
		resource_type: &str,
		resource_id: Uuid,
	) -> Result<Vec<u8>, TransportError>;
}
