//! Side-effecting pieces: configuration loading and statistics artifacts.

pub mod config;
pub mod stats;
