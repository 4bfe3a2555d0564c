//! # toastr-store
//!
//! Durable local state for the bridge. Everything here is a small JSON
//! document (or JSONL archive) under the data directory, read fully and
//! rewritten fully on mutation — no database, no partial updates. The crate
//! is synchronous; the documents are tiny and only ever touched by the one
//! task that owns the current cycle.

pub mod archive;
pub mod document;
pub mod identity;
pub mod ledger;
pub mod profiles;
pub mod watermark;

mod error;

pub use archive::TweetArchive;
pub use document::{Document, FileDocument, MemoryDocument};
pub use error::{Result, StoreError};
pub use identity::{FileIdentityRepo, IdentityRepo, MemoryIdentityRepo, ProfileData, SigningIdentity};
pub use ledger::{ledger_document, PostedLedger, PublicationRecord};
pub use profiles::ProfileLog;
pub use watermark::WatermarkStore;
