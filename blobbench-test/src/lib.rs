//! Test utilities for the benchmark harness and its storage clients.
//!
//! This crate provides utilities to facilitate testing of blobbench and its clients. See the
//! modules for all available utilities.

pub mod server;
pub mod stub;
pub mod tracing;
