//! # filevault
//!
//! Tracks files by the SHA-256 of their content, keeps a durable
//! identity → location table in SQLite, and follows files across moves and
//! renames. Admitted files are extracted to text and embedded into a flat
//! vector index; query hits are resolved back to wherever their content
//! lives now.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────────┐
//! │   scan    │──▶│ reconcile  │──▶│ SQLite store  │
//! │ + hashing │   │  (sync)    │   │ tracked_files │
//! └───────────┘   └────────────┘   └───────┬───────┘
//!       │                                  │
//!       ▼                                  ▼
//! ┌───────────┐   ┌────────────┐   ┌───────────────┐
//! │  admit +  │──▶│ flat index │──▶│ search +      │
//! │  extract  │   │ (embedded) │   │ resolve       │
//! └───────────┘   └────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fvault init
//! fvault sync ~/Documents          # confirm, invalidate, detect moves
//! fvault index ~/Documents         # admit new files, build the index
//! fvault search "quarterly budget"
//! fvault serve                     # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | `VaultError` kinds |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | `RecordStore` over SQLite |
//! | [`tracker`] | Path-facing record operations |
//! | [`scan`] | Directory discovery |
//! | [`hashing`] | File content identity |
//! | [`reconcile`] | Two-pass reconciliation (`fvault sync`) |
//! | [`extract`] | Text extraction strategies per content kind |
//! | [`admit`] | Admission into the corpus (`fvault index`) |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Flat vector index engine |
//! | [`search`] | Query + resolution |
//! | [`files`] / [`status`] | Listing, deletion, overview |
//! | [`server`] | HTTP API |
//! | [`progress`] | Progress reporting for long commands |

pub mod admit;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod files;
pub mod hashing;
pub mod index;
pub mod migrate;
pub mod progress;
pub mod reconcile;
pub mod scan;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod status;
pub mod tracker;

pub use filevault_core::{identity, metadata, models, resolve, store};
