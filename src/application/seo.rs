//! Structured metadata builders for articles.
//!
//! Open Graph tag maps and JSON-LD `BlogPosting` documents, returned as
//! `serde_json::Value` so the HTTP layer can embed them directly.

use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

use crate::config::SiteSettings;
use crate::domain::content;
use crate::domain::entities::ArticleRecord;

pub const OG_IMAGE_WIDTH: u32 = 1200;
pub const OG_IMAGE_HEIGHT: u32 = 630;

/// Open Graph and Twitter card tags for an article page.
pub fn og_meta(site: &SiteSettings, article: &ArticleRecord) -> Value {
    let base = site.public_url.as_str().trim_end_matches('/');
    let summary = content::summarize(&article.content);
    let image_url = content::first_image_url(&article.content)
        .map(|image| {
            if image.starts_with("http") {
                image
            } else {
                format!("{base}/static/{}", image.trim_start_matches('/'))
            }
        })
        .unwrap_or_else(|| format!("{base}{}", site.social_image));

    json!({
        "og:type": "article",
        "og:title": article.title,
        "og:description": summary,
        "og:url": format!("{base}/blog/{}", article.slug),
        "og:site_name": site.title,
        "og:image": image_url,
        "og:image:width": OG_IMAGE_WIDTH.to_string(),
        "og:image:height": OG_IMAGE_HEIGHT.to_string(),
        "og:image:alt": article.title,
        "og:image:type": "image/jpeg",
        "twitter:card": "summary_large_image",
        "twitter:title": article.title,
        "twitter:description": summary,
        "twitter:image": image_url,
        "twitter:image:alt": article.title,
    })
}

/// JSON-LD `BlogPosting` document for an article page.
pub fn blog_posting_json_ld(site: &SiteSettings, article: &ArticleRecord) -> Value {
    let base = site.public_url.as_str().trim_end_matches('/');
    let words = content::word_count(&article.content);
    let minutes = content::reading_time_minutes(&article.content);

    let mut document = json!({
        "@context": "https://schema.org",
        "@type": "BlogPosting",
        "headline": article.title,
        "description": content::summarize(&article.content),
        "url": format!("{base}/blog/{}", article.slug),
        "wordCount": words,
        "timeRequired": format!("PT{minutes}M"),
        "author": {
            "@type": "Person",
            "name": site.author,
            "url": format!("{base}/"),
        },
        "publisher": {
            "@type": "Person",
            "name": site.author,
            "url": format!("{base}/"),
        },
        "mainEntityOfPage": {
            "@type": "WebPage",
            "@id": format!("{base}/blog/{}", article.slug),
        },
    });

    if let Some(published_at) = article.published_at
        && let Ok(formatted) = published_at.format(&Rfc3339)
    {
        document["datePublished"] = Value::String(formatted);
    }
    if let Ok(formatted) = article.updated_at.format(&Rfc3339) {
        document["dateModified"] = Value::String(formatted);
    }
    if let Some(image) = content::first_image_url(&article.content) {
        let image = if image.starts_with("http") {
            image
        } else {
            format!("{base}/static/{}", image.trim_start_matches('/'))
        };
        document["image"] = Value::String(image);
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use url::Url;
    use uuid::Uuid;

    fn site() -> SiteSettings {
        SiteSettings {
            public_url: Url::parse("https://example.com").unwrap(),
            title: "Example".to_string(),
            description: "An example site".to_string(),
            author: "Example".to_string(),
            social_image: "/static/social-card.jpg".to_string(),
        }
    }

    fn article() -> ArticleRecord {
        let now = OffsetDateTime::now_utc();
        ArticleRecord {
            id: Uuid::new_v4(),
            slug: "hello-world".to_string(),
            title: "Hello World".to_string(),
            content: "<p>Body text.</p><img src=\"pic.png\" alt=\"a pic\">".to_string(),
            is_published: true,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn og_meta_uses_first_article_image() {
        let meta = og_meta(&site(), &article());
        assert_eq!(meta["og:image"], "https://example.com/static/pic.png");
        assert_eq!(meta["og:image:width"], "1200");
        assert_eq!(meta["og:image:height"], "630");
        assert_eq!(meta["twitter:card"], "summary_large_image");
    }

    #[test]
    fn og_meta_falls_back_to_social_card() {
        let mut record = article();
        record.content = "<p>No images here.</p>".to_string();
        let meta = og_meta(&site(), &record);
        assert_eq!(meta["og:image"], "https://example.com/static/social-card.jpg");
    }

    #[test]
    fn json_ld_carries_reading_time_duration() {
        let document = blog_posting_json_ld(&site(), &article());
        assert_eq!(document["@type"], "BlogPosting");
        assert_eq!(document["timeRequired"], "PT1M");
        assert!(document["datePublished"].is_string());
        assert_eq!(
            document["url"],
            "https://example.com/blog/hello-world"
        );
    }
}
