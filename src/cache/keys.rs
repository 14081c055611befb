//! Cache key definitions.
//!
//! `EntityKey` names a domain entity or derived collection for invalidation;
//! `CacheKey` names a single stored cache entry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use uuid::Uuid;

use crate::application::repos::PageRequest;

/// Identifies a domain entity or derived collection for cache invalidation.
///
/// When an entity changes, every cache entry registered against it must be
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// An article identified by its database ID.
    Article(Uuid),
    /// An article identified by its URL slug.
    ArticleSlug(String),
    /// A project identified by its database ID.
    Project(Uuid),
    /// View counter for one article slug.
    ArticleViews(String),

    // Derived collections, invalidated when any member changes.
    /// Paginated article listings.
    ArticlesIndex,
    /// Paginated project listings.
    ProjectsIndex,
    /// XML sitemaps and robots directives.
    Sitemap,
}

/// Object/query cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    ArticleById(Uuid),
    ArticleBySlug(String),
    ProjectById(Uuid),
    ViewCount(String),

    // List pages keyed by pagination hash
    ArticleList { page_hash: u64 },
    ProjectList { page_hash: u64 },

    Sitemap,
    ImageSitemap,
}

/// Response cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseKey {
    Response { path: String, query_hash: u64 },
}

/// Unified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Object(ObjectKey),
    Response(ResponseKey),
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash a query string for response cache key generation.
pub fn hash_query(query: &str) -> u64 {
    hash_value(&query)
}

/// Hash a pagination request for list cache keys.
pub fn hash_page_request(request: &PageRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.page().hash(&mut hasher);
    request.per_page().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_equality() {
        let key1 = EntityKey::Article(Uuid::nil());
        let key2 = EntityKey::Article(Uuid::nil());
        assert_eq!(key1, key2);

        let key3 = EntityKey::ArticleSlug("hello".to_string());
        let key4 = EntityKey::ArticleSlug("hello".to_string());
        assert_eq!(key3, key4);

        assert_ne!(key1, EntityKey::Project(Uuid::nil()));
    }

    #[test]
    fn cache_key_hash_consistency() {
        let key1 = CacheKey::Object(ObjectKey::ArticleBySlug("test".to_string()));
        let key2 = CacheKey::Object(ObjectKey::ArticleBySlug("test".to_string()));
        assert_eq!(hash_value(&key1), hash_value(&key2));
    }

    #[test]
    fn page_request_hash_tracks_both_fields() {
        let a = hash_page_request(&PageRequest::new(Some(1), Some(6)));
        let b = hash_page_request(&PageRequest::new(Some(2), Some(6)));
        let c = hash_page_request(&PageRequest::new(Some(1), Some(12)));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn different_queries_produce_different_hashes() {
        assert_ne!(hash_query("page=1"), hash_query("page=2"));
    }
}
