//! Data models for configuration.

pub mod config;
