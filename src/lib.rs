//! wispmail library entrypoint.
//!
//! Modules:
//! - `app`: startup, configuration, shared state
//! - `http`: Axum router and handlers
//! - `smtp`: inbound SMTP listener (admission + ingestion)
//! - `db`: migrations and SQLite helpers
//! - `models`: typed records used across layers
//! - `risk`: bot-detection heuristic for inbox creation
//! - `ratelimit`: sliding-window creation limiter
//! - `inbox`: inbox lifecycle (create, lookup, expiry)
//! - `admission`: pre-acceptance decision for inbound recipients
//! - `ingest`: message storage after admission accepts
//! - `sweep`: expired-inbox garbage collection
//! - `metrics`: store-backed counters and gauges
//! - `cache`: bounded TTL cache for the read path
//! - `util`: helpers for parsing and tracing setup

pub mod admission;
pub mod app;
pub mod cache;
pub mod db;
pub mod error;
pub mod http;
pub mod inbox;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod ratelimit;
pub mod risk;
pub mod smtp;
pub mod sweep;
pub mod util;
