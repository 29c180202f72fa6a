//! proctor-report — output persistence for exam runs.
//!
//! Two on-disk formats carry the same flat records: JSONL for incremental
//! per-row appends during a run, CSV for the final table. A [`manifest`]
//! records what produced an output directory.

pub mod csv;
pub mod jsonl;
pub mod manifest;

pub use manifest::RunManifest;
