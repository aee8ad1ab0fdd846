//! Shared library surface for the run-home server and its tests.

pub mod api;
pub mod config;
pub mod jobs;
pub mod loops;
pub mod state;
