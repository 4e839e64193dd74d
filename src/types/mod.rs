//! Core value types shared by the engine.
//!
//! - `Hash`: 32-byte SHA3-256 digests
//! - `Address`: 20-byte account and contract identifiers
//! - `encoding`: deterministic binary codec used for storage and ABI blobs

pub mod address;
pub mod encoding;
pub mod hash;
