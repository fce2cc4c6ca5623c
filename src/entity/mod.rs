//! SeaORM entity definitions for the project catalog.

pub mod deployment_log;
pub mod project;
