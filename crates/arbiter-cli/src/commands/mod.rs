//! CLI command implementations for the Arbiter decision logger.

pub mod check;
pub mod inspect;
pub mod replay;
