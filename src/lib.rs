//! Vetrina: a personal blog and project portfolio service.
//!
//! Layers follow the dependency direction domain ← application ← infra,
//! with the cache subsystem shared between application and infra.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
