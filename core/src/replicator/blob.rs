//! Filesystem-backed replicator
//!
//! Stores each resource's payload as a file under a per-type directory. The
//! payload is written to a temp file and renamed into place, so an attempt
//! that dies mid-write leaves the previous copy intact: the replica can be
//! stale, never corrupt-but-applied.

use crate::replicator::checksum::{checksum_bytes, checksum_file};
use crate::replicator::transport::PrimaryTransport;
use crate::replicator::{ReplicationError, Replicator};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct BlobReplicator {
	resource_type: &'static str,
	root: PathBuf,
	transport: Arc<dyn PrimaryTransport>,
}

impl BlobReplicator {
	pub fn new(
		resource_type: &'static str,
		root: impl Into<PathBuf>,
		transport: Arc<dyn PrimaryTransport>,
	) -> Self {
		Self {
			resource_type,
			root: root.into(),
			transport,
		}
	}

	fn type_dir(&self) -> PathBuf {
		self.root.join(self.resource_type)
	}

	fn blob_path(&self, resource_id: Uuid) -> PathBuf {
		self.type_dir().join(resource_id.to_string())
	}
}

#[async_trait]
impl Replicator for BlobReplicator {
	fn resource_type(&self) -> &'static str {
		self.resource_type
	}

	async fn fetch_and_apply(&self, resource_id: Uuid) -> Result<String, ReplicationError> {
		let payload = self
			.transport
			.fetch_payload(self.resource_type, resource_id)
			.await?;
		let checksum = checksum_bytes(&payload);

		let path = self.blob_path(resource_id);
		let dir = self.type_dir();
		tokio::fs::create_dir_all(&dir).await?;

		// Unique temp name so a concurrent late writer for the same resource
		// cannot clobber this attempt's partial file
		let tmp = dir.join(format!(".{resource_id}.{}.incoming", Uuid::new_v4()));
		if let Err(err) = tokio::fs::write(&tmp, &payload).await {
			let _ = tokio::fs::remove_file(&tmp).await;
			return Err(err.into());
		}
		tokio::fs::rename(&tmp, &path).await?;

		debug!(
			resource_type = %self.resource_type,
			resource_id = %resource_id,
			bytes = payload.len(),
			"Applied payload"
		);

		Ok(checksum)
	}

	async fn compute_local_checksum(
		&self,
		resource_id: Uuid,
	) -> Result<String, ReplicationError> {
		let path = self.blob_path(resource_id);

		checksum_file(&path).await.map_err(|err| {
			if err.kind() == std::io::ErrorKind::NotFound {
				ReplicationError::Transient("local copy missing".to_string())
			} else {
				err.into()
			}
		})
	}
}
