//! Predictive file intelligence: learn how files are used together and predict the
//! next ones.
//!
//! Exocortex records file operations into an append-only log, mines them into
//! patterns, and serves ranked predictions of the files a user is likely to open
//! next. Predictions that come true reinforce the patterns behind them; ones that
//! expire weaken them; unused patterns decay over time.
//!
//! | Kind | Learned from | Predicts |
//! |------|--------------|----------|
//! | **Co-access** | Two paths touched within a short window | The partner of a recent path |
//! | **Sequential** | One path reliably followed by another | The successor of a recent path |
//! | **Directory affinity** | File types used in a directory | Typical files of the current directory |
//! | **Frequency** | Accesses per day and hour | Busy files, optionally for the time of day |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (`file_operations`, `patterns`, `pattern_log`), or in-memory
//!   stores behind the same traits
//! - **Learning**: incremental per event, on a background task
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`events`]: Event Store, the append-only operation log
//! - [`mining`]: Pattern Miner, incremental learning from new events
//! - [`patterns`]: Pattern Store with the confidence model, decay, and storage
//! - [`predict`]: Prediction Engine, blended ranking and the prediction cache
//! - [`feedback`]: Feedback Loop, hit/miss settlement of served predictions
//! - [`service`]: Async facade wiring everything together

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod feedback;
pub mod mining;
pub mod patterns;
pub mod predict;
pub mod service;

pub use error::{Error, Result};
