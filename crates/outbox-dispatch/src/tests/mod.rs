//! Behavior tests for the dispatch pipeline.
//!
//! - `harness.rs`    - FakeStore, TestHarness and record builders
//! - `delivery.rs`   - what gets marked after success, source failure and flush failure
//! - `packing.rs`    - batch packing order, ceiling handling, oversized events
//! - `commit.rs`     - chunked commits and idempotent re-marking
//! - `malformed.rs`  - missing field policies inside a full cycle
//! - `scheduling.rs` - overlap prevention and graceful shutdown
//! - `sqlite.rs`     - full cycles against a real SQLite outbox

mod commit;
mod sqlite;
