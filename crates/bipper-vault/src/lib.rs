//! bipper-vault: commit/reveal orchestration over the metadata and blob stores

pub mod reconcile;
pub mod service;

pub use reconcile::{reconcile, ReconcileReport};
pub use service::{Revealed, VaultOptions, VaultService};
