//! Application services layer.

pub mod admin;
pub mod articles;
pub mod error;
pub mod projects;
pub mod repos;
pub mod seo;
pub mod sitemap;
pub mod views;
