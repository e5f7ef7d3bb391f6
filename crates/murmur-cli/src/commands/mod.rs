//! Command modules

pub mod models;

pub use models::*;
