//! Storage contract shared by the encrypted file store and test doubles.

mod profile_store;

pub use profile_store::{InMemoryProfileStore, ProfileStore, ProfileStoreError};
