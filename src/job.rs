//! One scheduled invocation: next row, optional scrape, publish.

use anyhow::Result;

use crate::content::{ContentSource, RowCursor, ScheduledPost};
use crate::extractor::{Extractor, ProductPageSource};
use crate::pacing::Pacer;
use crate::publisher::{PagePublisher, Post, PublishOutcome, format_promotion};

#[derive(Debug)]
pub enum RunOutcome {
    NoContent,
    DryRun(Post),
    Published(PublishOutcome),
}

pub fn posted_at_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Turns a scheduled row into a ready post, scraping the product for promotions.
pub fn build_post<S, P>(
    scheduled: &ScheduledPost,
    extractor: &Extractor<S, P>,
    posted_at: &str,
) -> Post
where
    S: ProductPageSource,
    P: Pacer,
{
    match scheduled {
        ScheduledPost::Promotion { affiliate_link } => {
            log::info!("Extracting details for {affiliate_link}");
            let record = extractor.extract(affiliate_link);
            if record.image_url.is_none() {
                log::info!("No image URL available, the post will be text only");
            }
            Post {
                message: format_promotion(&record, affiliate_link, posted_at),
                image_url: record.image_url,
                link_url: None,
            }
        }
        ScheduledPost::Announcement {
            message,
            image_url,
            link_url,
        } => Post {
            message: message.clone(),
            image_url: image_url.clone(),
            link_url: link_url.clone(),
        },
    }
}

/// `publisher == None` means dry run: the post is built but not sent.
pub fn run_once<S, P, Q>(
    content: &ContentSource,
    cursor: &RowCursor,
    extractor: &Extractor<S, P>,
    publisher: Option<&PagePublisher<Q>>,
) -> Result<RunOutcome>
where
    S: ProductPageSource,
    P: Pacer,
    Q: Pacer,
{
    let Some(selected) = content.next_post(cursor)? else {
        log::warn!("No valid content found in the sheet");
        return Ok(RunOutcome::NoContent);
    };

    let post = build_post(&selected.post, extractor, &posted_at_now());
    log::info!("Prepared post message:\n{}", post.message);

    match publisher {
        Some(publisher) => Ok(RunOutcome::Published(publisher.publish_with_fallback(&post)?)),
        None => {
            log::info!("Dry run, skipping publish ({:?} post)", post.kind());
            Ok(RunOutcome::DryRun(post))
        }
    }
}
