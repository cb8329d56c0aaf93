//! Create/update semantics layered over the unconditional `KeyStore`.
//!
//! The store only knows `set`; this layer turns "create" into
//! conflict-on-existing and "update" into not-found-on-missing.

pub mod service;

pub use service::{validate_key, KeyService};
