//! Transcript-Flow: browser-driven ingestion of academic result portals into a
//! monotonic per-student record store.

pub mod config;
pub mod engine;
pub mod network;
pub mod ops;
pub mod persistence;
pub mod refinery;
