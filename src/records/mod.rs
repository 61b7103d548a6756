//! Per-identity record backend.
//!
//! Each identity owns one document in the `users` collection. The store only
//! ever writes the `cart` and `wishlist` fields and merges them, so other
//! fields of the document belong to whoever else writes there.
//!
//! [`DocStore`] serves embedded deployments directly; [`Router`] exposes it over
//! TCP for the record daemon and [`RecordClient`] talks to that daemon.
pub mod client;
pub mod docstore;
pub mod persistence;
pub mod server;

pub use client::RecordClient;
pub use docstore::DocStore;
pub use persistence::Persistence;
pub use server::Router;

/// Collection holding one document per identity.
pub const USERS: &str = "users";

/// Whether `token` may name a collection or document: non-empty ASCII letters,
/// digits, `_` and `-`. Collection names become file names.
pub fn valid_identifier(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
