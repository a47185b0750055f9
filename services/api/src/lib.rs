//! services/api/src/lib.rs
//!
//! The library surface of the `api` service: configuration, error type,
//! concrete adapters for the core's ports, and the web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
