//! File processors that feed a running translation server

pub mod srt;
