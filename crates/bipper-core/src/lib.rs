pub mod config;
pub mod error;
pub mod types;

pub use error::{BipperError, BipperResult, Outcome};
pub use types::{BlobAddress, LookupKey, StagedUpload, VaultRecord};
