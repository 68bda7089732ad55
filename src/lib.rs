//! # busflow-loading
//!
//! Busy-indicator engine for the BusFlow dashboard.
//!
//! Tracks concurrently in-flight "busy" operations (page loads, session
//! bootstrap, route saves, CSV imports) and derives one debounced,
//! flicker-resistant decision about whether and what busy UI to show.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod model;
pub mod scenario;
pub mod telemetry;
