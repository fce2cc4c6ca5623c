//! Ingestion and lifecycle pipeline tests.
//!
//! Runs the whole pipeline against an in-memory SQLite catalog and a scripted
//! in-memory engine; no MySQL server is needed.
//!
//! Run with: cargo test --test pipeline

mod fake_engine;

mod test_delete;
mod test_ingestion;
mod test_rename;
