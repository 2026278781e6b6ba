//! Core translation service

pub mod config;
pub mod errors;
pub mod models;
pub mod prompt;
pub mod translator;
pub mod usage;
pub mod validator;
