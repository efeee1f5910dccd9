//! Utility functions for the collector

pub mod file;
pub mod retry;
pub mod time;
