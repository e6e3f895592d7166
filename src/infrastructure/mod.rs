//! Infrastructure layer module
//!
//! This module contains all infrastructure adapters and external integrations:
//! - Database implementations (SQLite with sqlx) and in-memory repositories
//! - Claude API client used as a reflection capability
//! - Built-in offline capabilities
//! - Configuration management
//! - Logging infrastructure
//! - Project setup
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod capabilities;
pub mod claude;
pub mod config;
pub mod database;
pub mod logging;
pub mod memory;
pub mod setup;
