//! Vetrina cache system.
//!
//! Two tiers behind one façade:
//!
//! - **Object cache**: domain entities, list pages and sitemap documents
//! - **Response cache**: serialized HTTP responses for public routes
//!
//! Each tier reads through an optional Redis backend; when Redis is down
//! the in-process stores keep serving and the backend is retried after a
//! cooldown.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `vetrina.toml`:
//!
//! ```toml
//! [cache]
//! enable_object_cache = true
//! enable_response_cache = true
//! article_limit = 500
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
pub mod deps;
mod events;
mod facade;
mod keys;
mod lock;
mod middleware;
mod planner;
mod registry;
mod remote;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::{CacheConsumer, WarmSources};
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use facade::CacheStore;
pub use keys::{
    CacheKey, EntityKey, ObjectKey, ResponseKey, hash_page_request, hash_query, hash_value,
};
pub use middleware::{CacheState, response_cache_layer};
pub use planner::ConsumptionPlan;
pub use registry::CacheRegistry;
pub use remote::{RemoteCache, RemoteCacheError, RemoteHealth};
pub use store::CachedResponse;
pub use trigger::CacheTrigger;
