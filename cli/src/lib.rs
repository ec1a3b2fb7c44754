//! hut - command-line client for sr.ht
//!
//! This crate provides the account export/import engine behind the `hut`
//! CLI, plus live build-log following.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`client`] - GraphQL and download access to a service
//! - [`export`] - Per-service exporters, markers, pagination and the driver
//! - [`builds`] - Job states and `builds follow`
//! - [`config`] - Instance configuration
//! - [`shutdown`] - Ctrl+C cancellation shared by every remote call
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builds;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod shutdown;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
