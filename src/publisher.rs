//! Publishing to a social page through the Graph API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::PublisherConfig;
use crate::models::ProductRecord;
use crate::pacing::{DelayWindow, Pacer};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Link,
    Photo,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub message: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
}

impl Post {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            image_url: None,
            link_url: None,
        }
    }

    /// Link preview first, then photo, then plain text.
    pub fn kind(&self) -> PostKind {
        if self.link_url.is_some() {
            PostKind::Link
        } else if self.image_url.is_some() {
            PostKind::Photo
        } else {
            PostKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub post_id: String,
    pub kind: PostKind,
    pub fell_back: bool,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    id: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

pub struct PagePublisher<P> {
    client: Client,
    api_base: String,
    page_id: String,
    access_token: String,
    pacer: P,
    pre_post_delay: DelayWindow,
}

impl<P: Pacer> PagePublisher<P> {
    pub fn new(config: &PublisherConfig, pacer: P) -> Result<Self> {
        let client = Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .context("Failed to build publisher HTTP client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            page_id: config.page_id.clone(),
            access_token: config.access_token.clone(),
            pacer,
            pre_post_delay: config.pre_post_delay,
        })
    }

    /// Sends one post as its preferred kind and returns the new post id.
    pub fn publish(&self, post: &Post) -> Result<String> {
        self.pacer.pause(&self.pre_post_delay);

        let kind = post.kind();
        let (endpoint, mut form): (&str, Vec<(&str, &str)>) = match kind {
            PostKind::Link => (
                "feed",
                vec![
                    ("message", post.message.as_str()),
                    ("link", post.link_url.as_deref().unwrap_or_default()),
                ],
            ),
            PostKind::Photo => (
                "photos",
                vec![
                    ("caption", post.message.as_str()),
                    ("url", post.image_url.as_deref().unwrap_or_default()),
                ],
            ),
            PostKind::Text => ("feed", vec![("message", post.message.as_str())]),
        };
        let url = format!("{}/{}/{}", self.api_base, self.page_id, endpoint);

        log::info!("Posting {kind:?} to page {}", self.page_id);
        form.push(("access_token", self.access_token.as_str()));

        let resp = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .with_context(|| format!("Request to {endpoint} endpoint failed"))?;
        let status = resp.status();
        let body: GraphResponse = resp
            .json()
            .with_context(|| format!("Unreadable Graph API response (status {status})"))?;

        if let Some(err) = body.error {
            return Err(anyhow!(
                "Graph API error{}: {}",
                err.code.map(|c| format!(" {c}")).unwrap_or_default(),
                err.message
            ));
        }
        body.id
            .ok_or_else(|| anyhow!("Graph API response (status {status}) carried no post id"))
    }

    /// Publishes `post`; when a link or photo post fails, retries once as text.
    pub fn publish_with_fallback(&self, post: &Post) -> Result<PublishOutcome> {
        let kind = post.kind();
        match self.publish(post) {
            Ok(post_id) => {
                log::info!("Posted successfully, id {post_id}");
                Ok(PublishOutcome {
                    post_id,
                    kind,
                    fell_back: false,
                })
            }
            Err(e) if kind != PostKind::Text => {
                log::warn!("{kind:?} post failed, falling back to text only: {e:#}");
                let post_id = self
                    .publish(&Post::text(post.message.clone()))
                    .context("Text-only fallback post failed")?;
                log::info!("Posted text-only message, id {post_id}");
                Ok(PublishOutcome {
                    post_id,
                    kind: PostKind::Text,
                    fell_back: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Caption for a scraped product.
pub fn format_promotion(record: &ProductRecord, affiliate_link: &str, posted_at: &str) -> String {
    format!(
        "🔥 {} 🔥\n💰 Price: {}\n🔗 Buy here: {}\n\n📅 Posted at: {}",
        record.name, record.price, affiliate_link, posted_at
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_kind_preference() {
        let mut post = Post::text("hi");
        assert_eq!(post.kind(), PostKind::Text);
        post.image_url = Some("https://cdn.example.com/a.jpg".into());
        assert_eq!(post.kind(), PostKind::Photo);
        post.link_url = Some("https://example.com".into());
        assert_eq!(post.kind(), PostKind::Link);
    }

    #[test]
    fn promotion_caption_layout() {
        let record = ProductRecord::new(Some("Kettle".into()), Some("$20".into()), None);
        let text = format_promotion(&record, "https://amzn.to/k", "2026-10-14 09:00:00");
        assert_eq!(
            text,
            "🔥 Kettle 🔥\n💰 Price: $20\n🔗 Buy here: https://amzn.to/k\n\n📅 Posted at: 2026-10-14 09:00:00"
        );
    }
}
