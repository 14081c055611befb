//! Admin-facing services: sessions and content mutations.

pub mod articles;
pub mod projects;
pub mod session;
