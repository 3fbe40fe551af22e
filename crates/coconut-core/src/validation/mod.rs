//! Validation modules

pub mod associative;

pub use associative::{AssociativeError, AssociativeValidator};
