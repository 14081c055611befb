//! Dependency collector for response cache invalidation.
//!
//! Uses `tokio::task_local!` so the service layer can record which entities
//! a response was built from without threading state through every call.
//! The middleware collects the set at request end and registers it in the
//! `CacheRegistry`.

use std::cell::RefCell;
use std::collections::HashSet;

use super::keys::EntityKey;

tokio::task_local! {
    static DEPS: RefCell<HashSet<EntityKey>>;
}

/// Record an entity dependency (called from the service layer).
///
/// Call before reading data that shapes the response. If no collector is
/// active, the call is silently ignored.
pub fn record(entity: EntityKey) {
    let _ = DEPS.try_with(|deps| {
        deps.borrow_mut().insert(entity);
    });
}

/// Collect all dependencies recorded so far in the active collector.
///
/// Returns an empty set when no collector is active.
pub fn collect() -> HashSet<EntityKey> {
    DEPS.try_with(|deps| deps.borrow().clone())
        .unwrap_or_default()
}

/// Run an async block with a dependency collector.
///
/// Every `record` call made while the future runs is captured; the result
/// and the collected set are returned together.
pub async fn with_collector<F, R>(f: F) -> (R, HashSet<EntityKey>)
where
    F: std::future::Future<Output = R>,
{
    DEPS.scope(RefCell::new(HashSet::new()), async move {
        let result = f.await;
        let collected = DEPS.with(|deps| deps.borrow().clone());
        (result, collected)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_without_collector_is_no_op() {
        record(EntityKey::Sitemap);
        let deps = collect();
        assert!(deps.is_empty());
    }

    #[tokio::test]
    async fn with_collector_captures_dependencies() {
        let (_, deps) = with_collector(async {
            record(EntityKey::Sitemap);
            record(EntityKey::ArticlesIndex);
            record(EntityKey::ArticleSlug("test-article".to_string()));
        })
        .await;

        assert_eq!(deps.len(), 3);
        assert!(deps.contains(&EntityKey::Sitemap));
        assert!(deps.contains(&EntityKey::ArticleSlug("test-article".to_string())));
    }

    #[tokio::test]
    async fn record_deduplicates() {
        let (_, deps) = with_collector(async {
            record(EntityKey::Sitemap);
            record(EntityKey::Sitemap);
            record(EntityKey::Sitemap);
        })
        .await;

        assert_eq!(deps.len(), 1);
    }

    #[tokio::test]
    async fn nested_collectors_are_independent() {
        let (_, outer) = with_collector(async {
            record(EntityKey::ArticlesIndex);
            let (_, inner) = with_collector(async {
                record(EntityKey::ProjectsIndex);
            })
            .await;
            assert_eq!(inner.len(), 1);
        })
        .await;

        assert!(outer.contains(&EntityKey::ArticlesIndex));
        assert!(!outer.contains(&EntityKey::ProjectsIndex));
    }
}
