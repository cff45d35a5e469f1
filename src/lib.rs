//! Botgate workspace-level test utilities.
//!
//! This crate exists solely to host the workspace integration tests in
//! `tests/integration/`, which drive the full pipeline across crate
//! boundaries.
//!
//! The actual botgate functionality is in the workspace member crates:
//! - `botgate-types`: shared types, config, and JSON schemas
//! - `botgate-stats`: weighted aggregation and variance clamping
//! - `botgate-significance`: Welch's t-test, effect sizes, corrections
//! - `botgate-health`: crash/timeout accounting per bot
//! - `botgate-server`: game-server runners (subprocess, embedded, fallback)
//! - `botgate-strategy`: per-mode seating, metrics, and stopping rules
//! - `botgate-orchestrator`: the batch loop
//! - `botgate-app`: use cases, aggregation, verdicts, reports
//! - `botgate` (botgate-cli): the command line
