//! MultiPost Core Library
//!
//! This crate provides the publish-session core for MultiPost: media rehosting,
//! destination resolution, per-page automation dispatch, and session lifecycle control
//! on top of an abstract browser page host.

pub mod config;
pub mod content;
mod dirs_compat;
pub mod host;
pub mod persistence;
pub mod platform;
pub mod rehost;
pub mod session;
pub mod telemetry;
