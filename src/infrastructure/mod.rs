//! Infrastructure layer modules
//!
//! - `config`: Application configuration and settings
//! - `error`: Database error type
//! - `metrics`: Prometheus metrics helpers
//! - `postgres`: PostgreSQL connector for the pool

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
