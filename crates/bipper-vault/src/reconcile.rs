//! Reconcile the blob store against the metadata store
//!
//! Reads happen in commit order: blobs are listed, then stage rows are read,
//! then records. A commit stages its address before writing the blob and
//! trades the stage row for a record in one transaction, so a listed blob is
//! staged at the time stage rows are read, or recorded by the time records
//! are read. Only blobs that are neither are orphans.
//!
//! Stale uploads are claimed by removing their stage row before the blob is
//! deleted. A late insert for a claimed address then fails instead of
//! publishing a record whose blob is gone.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bipper_core::{BipperResult, BlobAddress};
use bipper_storage::{BlobStore, MetadataStore};
use tracing::{error, info, warn};

/// What a reconciliation pass found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Blobs with neither a record nor a stage row, deleted
    pub orphan_blobs_removed: usize,
    /// Stage rows older than the cutoff without a record, claimed and their blob deleted
    pub stale_uploads_cleared: usize,
    /// Records whose blob is gone. Reported only; the content is unrecoverable.
    pub missing_blobs: Vec<BlobAddress>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_blobs_removed == 0
            && self.stale_uploads_cleared == 0
            && self.missing_blobs.is_empty()
    }
}

/// One reconciliation pass. Deletion failures are logged and skipped; the next
/// pass retries them. Listing failures abort the pass.
pub async fn reconcile<M, B>(
    metadata: &M,
    blobs: &B,
    stale_after: Duration,
) -> BipperResult<ReconcileReport>
where
    M: MetadataStore,
    B: BlobStore,
{
    let stored: HashSet<BlobAddress> = blobs.list().await?.into_iter().collect();
    let staged = metadata.staged_uploads().await?;
    let recorded: HashSet<BlobAddress> = metadata.recorded_addresses().await?.into_iter().collect();
    let staged_set: HashSet<&BlobAddress> = staged.iter().map(|s| &s.address).collect();

    let mut report = ReconcileReport::default();

    for address in &stored {
        if recorded.contains(address) || staged_set.contains(address) {
            continue;
        }
        match blobs.delete(address).await {
            Ok(()) => {
                info!(address = %address.short(), "removed orphan blob");
                report.orphan_blobs_removed += 1;
            }
            Err(e) => warn!(address = %address.short(), error = %e, "orphan blob delete failed"),
        }
    }

    let cutoff = unix_now().saturating_sub(stale_after.as_secs());
    for upload in &staged {
        if upload.staged_at > cutoff || recorded.contains(&upload.address) {
            continue;
        }
        match metadata.abandon_upload(&upload.address).await {
            Ok(true) => {}
            // A record consumed the stage row after it was read
            Ok(false) => continue,
            Err(e) => {
                warn!(address = %upload.address.short(), error = %e, "stage clear failed");
                continue;
            }
        }
        // Unstaged from here on; a failed delete leaves an orphan for the next pass
        match blobs.delete(&upload.address).await {
            Ok(()) => {
                info!(address = %upload.address.short(), "cleared stale upload");
                report.stale_uploads_cleared += 1;
            }
            Err(e) => warn!(address = %upload.address.short(), error = %e, "stale upload delete failed"),
        }
    }

    let mut candidates: Vec<&BlobAddress> = recorded.difference(&stored).collect();
    candidates.sort();
    for address in candidates {
        // Commits that finished after the listing are recorded but unlisted
        if blobs.read(address).await?.is_some() {
            continue;
        }
        error!(address = %address.short(), "vault record has no backing blob");
        report.missing_blobs.push(address.clone());
    }

    info!(
        orphans = report.orphan_blobs_removed,
        stale = report.stale_uploads_cleared,
        missing = report.missing_blobs.len(),
        "reconciliation finished"
    );
    Ok(report)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
