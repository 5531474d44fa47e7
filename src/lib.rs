//! Entity-resolution matching engine.
//!
//! reunite pairs records from two growing collections (for example "lost" and
//! "found" reports) that likely describe the same real-world subject. Each
//! record carries one or more embedding vectors and an optional location. A
//! background scheduler periodically scans every unresolved record against the
//! resolved pool, persists each new match exactly once, and hands it to a
//! notification dispatcher and a report generator.
//!
//! # Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | Kernel | [`matching::kernel`] | Cosine similarity, haversine distance |
//! | Scanner | [`matching::scanner`] | Brute-force candidate search above thresholds |
//! | Gate | [`matching::gate`] | Record each (subject, counterpart) pair once |
//! | Fan-out | [`matching::fanout`] | Notify + report, failures isolated per match |
//! | Scheduler | [`matching::scheduler`] | Startup pass, fixed cadence, no overlap |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`matching`]: Core engine: record types, stores, and the pipeline stages
//! - [`notify`]: Notification dispatcher and report generator adapters

pub mod config;
pub mod db;
pub mod matching;
pub mod notify;
