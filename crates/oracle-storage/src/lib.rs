//! Concrete profile storage with encryption at rest.
//! Uses AES-GCM with key material supplied by process configuration, a
//! crash-safe atomic file writer, and a named mutex registry for writers.

pub mod atomic_file;
pub mod container;
pub mod crypto;
pub mod key_material;
pub mod named_mutex;
pub mod profile_file_store;

pub use key_material::KeyMaterial;
pub use named_mutex::{LockHandle, NamedMutexRegistry};
pub use profile_file_store::EncryptedProfileStore;
