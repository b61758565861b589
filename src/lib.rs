//! Command-line front ends for creating, inspecting and aggregating whisper files.

pub mod cli;
pub mod config;
