//! HTTP service exposing the translator

pub mod api;
