//! # filevault core
//!
//! Pure logic shared by the `filevault` application: content identities,
//! tracked-file records, the record store abstraction, typed index
//! metadata, hit resolution, and the embedding trait.
//!
//! This crate performs no filesystem or database I/O beyond hashing an
//! already-open reader. The SQLite store, directory scanning, extraction,
//! and the index engine live in the application crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`identity`] | SHA-256 content identity |
//! | [`models`] | `TrackedFileRecord`, `ContentKind`, observations |
//! | [`metadata`] | Per-entry index metadata |
//! | [`store`] | `RecordStore` trait + in-memory backend |
//! | [`index`] | Index engine seam (`IndexQuery`, `QueryHit`) |
//! | [`resolve`] | Hit → current location |
//! | [`embedding`] | `Embedder` trait, hashing embedder, cosine similarity |

pub mod embedding;
pub mod identity;
pub mod index;
pub mod metadata;
pub mod models;
pub mod resolve;
pub mod store;
