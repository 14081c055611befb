//! Consumption plan generation.
//!
//! Merges a batch of cache events into one deduplicated execution plan.

use std::collections::{HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use super::events::{CacheEvent, EventKind};
use super::keys::EntityKey;

/// Actions to execute for cache consistency.
///
/// The planner merges multiple events into a single plan, deduplicating and
/// keeping only the latest state for each entity.
#[derive(Debug, Default)]
pub struct ConsumptionPlan {
    /// Entities to invalidate from cache.
    pub invalidate_entities: HashSet<EntityKey>,

    /// Specific articles to warm by ID.
    pub warm_articles: HashSet<Uuid>,
    /// Specific projects to warm by ID.
    pub warm_projects: HashSet<Uuid>,
    /// View counters to refresh by slug.
    pub warm_view_counts: HashSet<String>,
    /// Whether to warm the first article listing page.
    pub warm_article_index: bool,
    /// Whether to warm the first project listing page.
    pub warm_project_index: bool,
    /// Whether to warm the sitemap documents.
    pub warm_sitemap: bool,
}

impl fmt::Display for ConsumptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConsumptionPlan {{ invalidate: {}, warm_articles: {}, warm_projects: {}, \
             warm_views: {}, warm_article_index: {}, warm_project_index: {}, \
             warm_sitemap: {} }}",
            self.invalidate_entities.len(),
            self.warm_articles.len(),
            self.warm_projects.len(),
            self.warm_view_counts.len(),
            self.warm_article_index,
            self.warm_project_index,
            self.warm_sitemap,
        )
    }
}

impl ConsumptionPlan {
    /// Merge multiple events into an optimized plan.
    ///
    /// - Deduplicates by event ID
    /// - Groups by entity, keeping the latest epoch
    /// - Derives collection invalidation and warm actions
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        let events: Vec<_> = events
            .into_iter()
            .filter(|e| seen_ids.insert(e.id))
            .collect();

        // Track the latest event per entity
        let mut article_epochs: HashMap<Uuid, (u64, EventKind)> = HashMap::new();
        let mut project_epochs: HashMap<Uuid, (u64, EventKind)> = HashMap::new();

        for event in events {
            match &event.kind {
                EventKind::ArticleUpserted { article_id, .. }
                | EventKind::ArticleDeleted { article_id, .. } => {
                    let entry = article_epochs.entry(*article_id);
                    entry
                        .and_modify(|(e, k)| {
                            if event.epoch > *e {
                                *e = event.epoch;
                                *k = event.kind.clone();
                            }
                        })
                        .or_insert((event.epoch, event.kind.clone()));
                }
                EventKind::ProjectUpserted { project_id }
                | EventKind::ProjectDeleted { project_id } => {
                    let entry = project_epochs.entry(*project_id);
                    entry
                        .and_modify(|(e, k)| {
                            if event.epoch > *e {
                                *e = event.epoch;
                                *k = event.kind.clone();
                            }
                        })
                        .or_insert((event.epoch, event.kind.clone()));
                }
                EventKind::ArticleViewed { slug } => {
                    plan.invalidate_entities
                        .insert(EntityKey::ArticleViews(slug.clone()));
                    plan.warm_view_counts.insert(slug.clone());
                }
                EventKind::WarmupOnStartup => {
                    plan.warm_article_index = true;
                    plan.warm_project_index = true;
                    plan.warm_sitemap = true;
                }
            }
        }

        let mut any_article_changed = false;
        for (article_id, (_, kind)) in article_epochs {
            any_article_changed = true;
            match kind {
                EventKind::ArticleDeleted { slug, .. } => {
                    plan.invalidate_entities
                        .insert(EntityKey::Article(article_id));
                    plan.invalidate_entities
                        .insert(EntityKey::ArticleSlug(slug.clone()));
                }
                EventKind::ArticleUpserted { slug, .. } => {
                    plan.invalidate_entities
                        .insert(EntityKey::Article(article_id));
                    plan.invalidate_entities
                        .insert(EntityKey::ArticleSlug(slug.clone()));
                    plan.warm_articles.insert(article_id);
                }
                _ => {}
            }
        }

        // Any article change touches the listings and the sitemaps
        if any_article_changed {
            plan.invalidate_entities.insert(EntityKey::ArticlesIndex);
            plan.invalidate_entities.insert(EntityKey::Sitemap);
            plan.warm_article_index = true;
            plan.warm_sitemap = true;
        }

        let mut any_project_changed = false;
        for (project_id, (_, kind)) in project_epochs {
            any_project_changed = true;
            match kind {
                EventKind::ProjectDeleted { .. } => {
                    plan.invalidate_entities
                        .insert(EntityKey::Project(project_id));
                }
                EventKind::ProjectUpserted { .. } => {
                    plan.invalidate_entities
                        .insert(EntityKey::Project(project_id));
                    plan.warm_projects.insert(project_id);
                }
                _ => {}
            }
        }

        if any_project_changed {
            plan.invalidate_entities.insert(EntityKey::ProjectsIndex);
            plan.warm_project_index = true;
        }

        plan
    }

    /// Check if the plan has any actions to execute.
    pub fn is_empty(&self) -> bool {
        self.invalidate_entities.is_empty()
            && self.warm_articles.is_empty()
            && self.warm_projects.is_empty()
            && self.warm_view_counts.is_empty()
            && !self.warm_article_index
            && !self.warm_project_index
            && !self.warm_sitemap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::CacheEvent;

    fn make_event(kind: EventKind, epoch: u64) -> CacheEvent {
        CacheEvent::new(kind, epoch)
    }

    #[test]
    fn article_upsert_triggers_derived_invalidation() {
        let article_id = Uuid::new_v4();
        let events = vec![make_event(
            EventKind::ArticleUpserted {
                article_id,
                slug: "test".to_string(),
            },
            0,
        )];
        let plan = ConsumptionPlan::from_events(events);

        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::Article(article_id))
        );
        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::ArticleSlug("test".to_string()))
        );
        assert!(plan.invalidate_entities.contains(&EntityKey::ArticlesIndex));
        assert!(plan.invalidate_entities.contains(&EntityKey::Sitemap));
        assert!(plan.warm_articles.contains(&article_id));
        assert!(plan.warm_article_index);
        assert!(plan.warm_sitemap);
    }

    #[test]
    fn article_delete_does_not_warm_article() {
        let article_id = Uuid::new_v4();
        let events = vec![make_event(
            EventKind::ArticleDeleted {
                article_id,
                slug: "test".to_string(),
            },
            0,
        )];
        let plan = ConsumptionPlan::from_events(events);

        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::Article(article_id))
        );
        assert!(!plan.warm_articles.contains(&article_id));
        assert!(plan.warm_article_index);
    }

    #[test]
    fn project_upsert() {
        let project_id = Uuid::new_v4();
        let events = vec![make_event(EventKind::ProjectUpserted { project_id }, 0)];
        let plan = ConsumptionPlan::from_events(events);

        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::Project(project_id))
        );
        assert!(plan.invalidate_entities.contains(&EntityKey::ProjectsIndex));
        assert!(plan.warm_projects.contains(&project_id));
        assert!(plan.warm_project_index);
        assert!(!plan.warm_sitemap);
    }

    #[test]
    fn view_event_refreshes_counter_only() {
        let events = vec![make_event(
            EventKind::ArticleViewed {
                slug: "test".to_string(),
            },
            0,
        )];
        let plan = ConsumptionPlan::from_events(events);

        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::ArticleViews("test".to_string()))
        );
        assert!(plan.warm_view_counts.contains("test"));
        assert!(!plan.invalidate_entities.contains(&EntityKey::ArticlesIndex));
    }

    #[test]
    fn warmup_on_startup() {
        let events = vec![make_event(EventKind::WarmupOnStartup, 0)];
        let plan = ConsumptionPlan::from_events(events);

        assert!(plan.warm_article_index);
        assert!(plan.warm_project_index);
        assert!(plan.warm_sitemap);
        assert!(plan.invalidate_entities.is_empty());
    }

    #[test]
    fn dedupe_by_event_id() {
        let article_id = Uuid::new_v4();
        let event = make_event(
            EventKind::ArticleUpserted {
                article_id,
                slug: "test".to_string(),
            },
            0,
        );

        let events = vec![event.clone(), event];
        let plan = ConsumptionPlan::from_events(events);

        assert_eq!(plan.warm_articles.len(), 1);
    }

    #[test]
    fn keeps_latest_epoch() {
        let article_id = Uuid::new_v4();

        // Upsert first, then delete; the delete wins
        let events = vec![
            make_event(
                EventKind::ArticleUpserted {
                    article_id,
                    slug: "test".to_string(),
                },
                0,
            ),
            make_event(
                EventKind::ArticleDeleted {
                    article_id,
                    slug: "test".to_string(),
                },
                1,
            ),
        ];
        let plan = ConsumptionPlan::from_events(events);

        assert!(!plan.warm_articles.contains(&article_id));
        assert!(
            plan.invalidate_entities
                .contains(&EntityKey::Article(article_id))
        );
    }

    #[test]
    fn display_format() {
        let plan = ConsumptionPlan::default();
        let display = format!("{}", plan);
        assert!(display.contains("ConsumptionPlan"));
        assert!(display.contains("invalidate: 0"));
    }

    #[test]
    fn is_empty() {
        let plan = ConsumptionPlan::default();
        assert!(plan.is_empty());

        let events = vec![make_event(EventKind::WarmupOnStartup, 0)];
        let plan = ConsumptionPlan::from_events(events);
        assert!(!plan.is_empty());
    }
}
