//! Sitedock server library.
//!
//! Ingests zipped web projects, provisions a database for each one from the
//! bundled SQL dumps, deploys the files under a public web root and keeps a
//! catalog of projects and their deployment logs.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
