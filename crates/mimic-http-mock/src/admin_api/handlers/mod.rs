//! Admin API endpoint handlers.

pub mod lookup;
pub mod scenarios;
pub mod system;
