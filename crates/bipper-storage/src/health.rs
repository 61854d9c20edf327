//! Storage readiness checks

use bipper_core::{BipperError, BipperResult};
use opendal::Operator;

use crate::metadata::SqliteMetadataStore;

/// Verify the blob backend is reachable by listing the root
pub async fn check_blob_health(op: &Operator) -> BipperResult<()> {
    // A root listing is the lightest call every backend supports
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| BipperError::StorageIo(format!("blob health check failed: {e}")))
}

/// Both halves of the store answer. Non-panicking; failures are logged.
pub async fn is_ready(metadata: &SqliteMetadataStore, op: &Operator) -> bool {
    if let Err(e) = metadata.ping().await {
        tracing::warn!(error = %e, "metadata store not ready");
        return false;
    }
    if let Err(e) = check_blob_health(op).await {
        tracing::warn!(error = %e, "blob store not ready");
        return false;
    }
    true
}
