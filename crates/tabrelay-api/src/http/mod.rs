//! HTTP interface module.
//!
//! Provides the tool-call surface:
//! - Operation execution against the connected extension
//! - Event buffer reads and clears
//! - Filter mode control
//! - Connection listing, drain and health

pub mod handlers;
pub mod routes;
