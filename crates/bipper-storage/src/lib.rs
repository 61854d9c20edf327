//! bipper-storage: vault metadata (SQLite) and sealed blobs (OpenDAL)

pub mod blob;
pub mod health;
pub mod metadata;
pub mod migrations;
pub mod operator;

pub use blob::{BlobStore, OpendalBlobStore};
pub use health::{check_blob_health, is_ready};
pub use metadata::{MetadataStore, SqliteMetadataStore};
pub use operator::{build_operator, memory_operator};
