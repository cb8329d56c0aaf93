//! Service layer for the breach notifier.
//! - `lookup`: bounded breach queries against the upstream API.
//! - `storage`: the concurrent key/value store and its JSON snapshots.
//! - `keys`: create/update policy on top of the store.
//! - `delivery` and `notify`: message channels and the batch driver.

pub mod errors;
pub mod runtime;
pub mod storage;
pub mod keys;
pub mod lookup;
pub mod delivery;
pub mod notify;
