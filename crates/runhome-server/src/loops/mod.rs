//! Background loops for continuous processing.

pub mod session_expiry_loop;
