//! Sealed blob storage, addressed by the hex of the encrypted filename

use std::future::Future;

use bipper_core::{BipperError, BipperResult, BlobAddress};
use opendal::{ErrorKind, Operator};

/// Durable write-once byte store keyed by `BlobAddress`.
pub trait BlobStore: Send + Sync {
    /// Store `content` at `address`. Any failure is `StorageIo`.
    fn write(
        &self,
        address: &BlobAddress,
        content: Vec<u8>,
    ) -> impl Future<Output = BipperResult<()>> + Send;

    /// Fetch the blob, `None` if nothing is stored at `address`.
    fn read(
        &self,
        address: &BlobAddress,
    ) -> impl Future<Output = BipperResult<Option<Vec<u8>>>> + Send;

    /// Remove the blob. Removing an absent blob succeeds.
    fn delete(&self, address: &BlobAddress) -> impl Future<Output = BipperResult<()>> + Send;

    /// Every well-formed address currently stored.
    fn list(&self) -> impl Future<Output = BipperResult<Vec<BlobAddress>>> + Send;
}

/// `BlobStore` over any OpenDAL backend; blobs sit flat at the operator root.
#[derive(Clone, Debug)]
pub struct OpendalBlobStore {
    op: Operator,
}

impl OpendalBlobStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

fn storage_err(action: &str, address: &BlobAddress, e: opendal::Error) -> BipperError {
    BipperError::StorageIo(format!("blob {action} {}: {e}", address.short()))
}

impl BlobStore for OpendalBlobStore {
    async fn write(&self, address: &BlobAddress, content: Vec<u8>) -> BipperResult<()> {
        let len = content.len();
        self.op
            .write(address.as_str(), content)
            .await
            .map_err(|e| storage_err("write", address, e))?;
        tracing::debug!(address = %address.short(), bytes = len, "blob written");
        Ok(())
    }

    async fn read(&self, address: &BlobAddress) -> BipperResult<Option<Vec<u8>>> {
        match self.op.read(address.as_str()).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read", address, e)),
        }
    }

    async fn delete(&self, address: &BlobAddress) -> BipperResult<()> {
        match self.op.delete(address.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("delete", address, e)),
        }
    }

    async fn list(&self) -> BipperResult<Vec<BlobAddress>> {
        let entries = self
            .op
            .list("/")
            .await
            .map_err(|e| BipperError::StorageIo(format!("blob list: {e}")))?;

        Ok(entries
            .iter()
            .filter(|entry| entry.metadata().is_file())
            .filter_map(|entry| BlobAddress::parse(entry.name()))
            .collect())
    }
}
