//! # DMX
//!
//! The application around the core: HTTP and websocket API, CLI and
//! configuration. The binary in `main.rs` only wires these together.

pub mod api;
pub mod cli;
pub mod config;
