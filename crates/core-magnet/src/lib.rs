//! Version manifest ("magnet") data structures for Comet
//!
//! A magnet describes one published version: the files it contains (name,
//! size and strong digest of each) and a pointer to the next version in the
//! update chain. Clients walk the chain from the version they have installed
//! until a magnet can no longer be fetched.
//!
//! # Key Concepts
//!
//! - **Magnet**: a version's file listing plus the `next_version` pointer
//! - **Digest**: 32-byte SHA-256 identity of a file's content; its lowercase
//!   hex form names the content-addressed artifacts on the mirror
//!
//! # Example
//!
//! ```no_run
//! use comet_core_magnet::Magnet;
//! use std::path::Path;
//!
//! let magnet = Magnet::load(Path::new("/srv/game/1.0.3.magnet")).unwrap();
//! for file in &magnet.files {
//!     println!("{} ({} bytes) -> {}", file.name, file.size, file.digest);
//! }
//! ```

pub mod digest;
pub mod error;
pub mod magnet;
pub mod validate;

pub use digest::{Digest, DIGEST_SIZE};
pub use error::{Error, Result};
pub use magnet::{FileEntry, Magnet};
pub use validate::{validate_file_name, validate_magnet};

/// File extension appended to a version label to name its magnet
pub const MAGNET_EXT: &str = ".magnet";
