//! # Hashguard Core
//!
//! A content-addressed file store keyed by cryptographic digests.
//!
//! Uploads are streamed to a scratch file while being hashed, then moved to
//! `<root>/<digest[0..2]>/<digest><extension>`. The digest is the only handle
//! to a stored file: callers present it to read the file back or delete it.
//!
//! ## Features
//!
//! - Single-pass hash-while-writing ingestion with bounded memory
//! - At most one stored copy per distinct content, enforced by a no-clobber rename
//! - Empty uploads rejected by reading, not by trusting a declared size
//! - Caller digests format-checked before any disk access
//! - Empty shard directories removed after deletion
//!
//! ## Example
//!
//! ```no_run
//! use hashguard_core::{Store, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(StoreConfig::new("./files"))?;
//!
//! let digest = store.save("notes.txt", &b"some initial text data"[..])?;
//!
//! let object = store.lookup(digest.as_str())?;
//! println!("{} -> {}", digest, object.path().display());
//!
//! store.remove(digest.as_str())?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod hash;
mod sanitize;
mod store;

pub use config::{SCRATCH_DIR_NAME, StoreConfig};
pub use error::{Error, ErrorKind, Result};
pub use hash::{
    Algorithm, DEFAULT_BUFFER_SIZE, Digest, DigestWriter, compute_digest,
    compute_digest_with_buffer, is_well_formed, validate,
};
pub use sanitize::{extension, sanitize_file_name};
pub use store::{Store, StoredObject};
