//! Best-effort view tracking.
//!
//! A failed insert must never break article delivery, so errors are logged
//! and swallowed here.

use std::sync::Arc;

use tracing::warn;

use crate::application::repos::{RecordViewParams, ViewsRepo};
use crate::cache::CacheTrigger;

const SOURCE: &str = "application::views";

#[derive(Clone)]
pub struct ViewTracker {
    views: Arc<dyn ViewsRepo>,
    trigger: Option<Arc<CacheTrigger>>,
}

impl ViewTracker {
    pub fn new(views: Arc<dyn ViewsRepo>, trigger: Option<Arc<CacheTrigger>>) -> Self {
        Self { views, trigger }
    }

    /// Record one view for the (slug, ip) pair. Returns whether the view was
    /// newly counted; repeat visits from the same address are ignored.
    pub async fn track(&self, params: RecordViewParams) -> bool {
        let slug = params.article_slug.clone();

        let recorded = match self.views.record_view(params).await {
            Ok(recorded) => recorded,
            Err(err) => {
                warn!(target: SOURCE, slug = %slug, error = %err, "failed to record article view");
                return false;
            }
        };

        if recorded && let Some(trigger) = &self.trigger {
            trigger.article_viewed(&slug).await;
        }

        recorded
    }
}
