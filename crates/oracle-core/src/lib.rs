//! Core abstractions for the Oracle profile store: the profile record model,
//! the `ProfileStore` contract and its error taxonomy, and key validation.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod keys;
pub mod profile;
pub mod storage;
