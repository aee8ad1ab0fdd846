//! Background work spawned by request handlers.

pub mod search_job;
