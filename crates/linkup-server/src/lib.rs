//! # linkup-server
//!
//! HTTP host for LinkUp Bluetooth presence tracking.
//!
//! This library provides the API handlers, logging setup and application
//! state shared by the `linkup-server` binary and the OpenAPI generator.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

#[cfg(test)]
mod test_support;
