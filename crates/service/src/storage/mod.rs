//! Storage abstractions for service layer
//!
//! Holds the concurrent key/value map and its JSON snapshot helpers.

pub mod key_store;

pub use key_store::KeyStore;
