//! Wire message records for both services.

pub mod calculator;
pub mod greet;
