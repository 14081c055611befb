//! Sitemap and robots.txt generation.
//!
//! Keeps the XML assembly out of the HTTP layer. Generated documents are
//! cached whole; any article change invalidates them through the consumer.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::application::repos::{ArticlesRepo, RepoError};
use crate::cache::{CacheStore, EntityKey, deps};
use crate::config::SiteSettings;
use crate::domain::content;

const PORTRAIT_IMAGE_PATH: &str = "/static/portrait.webp";

struct StaticEntry {
    path: &'static str,
    changefreq: &'static str,
    priority: &'static str,
}

const STATIC_ENTRIES: [StaticEntry; 5] = [
    StaticEntry {
        path: "/",
        changefreq: "weekly",
        priority: "1.0",
    },
    StaticEntry {
        path: "/about",
        changefreq: "monthly",
        priority: "0.9",
    },
    StaticEntry {
        path: "/blog",
        changefreq: "daily",
        priority: "0.9",
    },
    StaticEntry {
        path: "/projects",
        changefreq: "weekly",
        priority: "0.8",
    },
    StaticEntry {
        path: "/talks",
        changefreq: "monthly",
        priority: "0.6",
    },
];

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct SitemapService {
    articles: Arc<dyn ArticlesRepo>,
    site: SiteSettings,
    cache: Option<Arc<CacheStore>>,
}

impl SitemapService {
    pub fn new(
        articles: Arc<dyn ArticlesRepo>,
        site: SiteSettings,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        Self {
            articles,
            site,
            cache,
        }
    }

    fn base(&self) -> String {
        self.site.public_url.as_str().trim_end_matches('/').to_string()
    }

    /// Generate sitemap.xml, serving the cached document when present.
    pub async fn sitemap_xml(&self) -> Result<String, SitemapError> {
        deps::record(EntityKey::Sitemap);
        deps::record(EntityKey::ArticlesIndex);

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_sitemap().await
        {
            return Ok(cached);
        }

        let base = self.base();
        let today = format_date(OffsetDateTime::now_utc());
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );

        for entry in &STATIC_ENTRIES {
            let loc = escape_xml(&canonical_url(&base, entry.path));
            xml.push_str(&format!(
                "  <url><loc>{loc}</loc><lastmod>{today}</lastmod>\
                 <changefreq>{}</changefreq><priority>{}</priority></url>\n",
                entry.changefreq, entry.priority
            ));
        }

        for article in self.articles.list_published_slugs().await? {
            let lastmod = article.published_at.unwrap_or(article.updated_at);
            let lastmod = if article.updated_at > lastmod {
                article.updated_at
            } else {
                lastmod
            };
            let loc = escape_xml(&canonical_url(&base, &format!("/blog/{}", article.slug)));
            xml.push_str(&format!(
                "  <url><loc>{loc}</loc><lastmod>{}</lastmod>\
                 <changefreq>monthly</changefreq><priority>0.7</priority></url>\n",
                format_date(lastmod)
            ));
        }

        xml.push_str("</urlset>\n");

        if let Some(cache) = &self.cache {
            cache.set_sitemap(xml.clone()).await;
        }

        Ok(xml)
    }

    /// Generate the Google image sitemap: site portraits plus the first
    /// image of each published article.
    pub async fn image_sitemap_xml(&self) -> Result<String, SitemapError> {
        deps::record(EntityKey::Sitemap);
        deps::record(EntityKey::ArticlesIndex);

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_image_sitemap().await
        {
            return Ok(cached);
        }

        let base = self.base();
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\" \
             xmlns:image=\"http://www.google.com/schemas/sitemap-image/1.1\">\n",
        );

        let home = canonical_url(&base, "/");
        xml.push_str(&image_entry(
            &home,
            &format!("{base}{PORTRAIT_IMAGE_PATH}"),
            &self.site.title,
            &self.site.description,
        ));
        xml.push_str(&image_entry(
            &home,
            &format!("{base}{}", self.site.social_image),
            &self.site.title,
            "Social media preview image",
        ));

        for article in self.articles.list_published_slugs().await? {
            let Some(image) = content::first_image_url(&article.content) else {
                continue;
            };
            let image = if image.starts_with("http") {
                image
            } else {
                format!("{base}/static/{}", image.trim_start_matches('/'))
            };
            let page = canonical_url(&base, &format!("/blog/{}", article.slug));
            xml.push_str(&image_entry(
                &page,
                &image,
                &article.title,
                &content::summarize(&article.content),
            ));
        }

        xml.push_str("</urlset>\n");

        if let Some(cache) = &self.cache {
            cache.set_image_sitemap(xml.clone()).await;
        }

        Ok(xml)
    }

    pub fn robots_txt(&self) -> String {
        let base = self.base();
        format!("User-agent: *\nAllow: /\n\nSitemap: {base}/sitemap.xml\n")
    }
}

fn canonical_url(base: &str, path: &str) -> String {
    if path == "/" {
        format!("{base}/")
    } else {
        format!("{base}{path}")
    }
}

fn image_entry(page_url: &str, image_url: &str, title: &str, caption: &str) -> String {
    format!(
        "  <url><loc>{}</loc>\
         <image:image><image:loc>{}</image:loc>\
         <image:title>{}</image:title>\
         <image:caption>{}</image:caption></image:image></url>\n",
        escape_xml(page_url),
        escape_xml(image_url),
        escape_xml(title),
        escape_xml(caption)
    )
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_date(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .map(|formatted| formatted[..10].to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_keeps_root_slash() {
        assert_eq!(canonical_url("https://example.com", "/"), "https://example.com/");
        assert_eq!(
            canonical_url("https://example.com", "/blog/post"),
            "https://example.com/blog/post"
        );
    }

    #[test]
    fn xml_escaping_covers_markup_characters() {
        assert_eq!(escape_xml("a & b <c>"), "a &amp; b &lt;c&gt;");
    }

    #[test]
    fn image_entry_escapes_the_page_location_too() {
        let entry = image_entry(
            "https://example.com/blog/a?x=1&y=2",
            "https://example.com/cover.jpg",
            "Title",
            "Caption",
        );
        assert!(entry.contains("<loc>https://example.com/blog/a?x=1&amp;y=2</loc>"));
    }
}
