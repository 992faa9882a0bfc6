use url::Url;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::fetcher::{PageFetcher, RedirectResolver, build_client};
use crate::models::{ExtractionRequest, ProductRecord, ResolvedPage};
use crate::pacing::{DelayWindow, Pacer};
use crate::parser::parse_product;

/// Anything that can turn a product link into page markup.
pub trait ProductPageSource {
    fn load(&self, url: &str) -> Result<ResolvedPage, ExtractError>;
}

impl<S: ProductPageSource + ?Sized> ProductPageSource for &S {
    fn load(&self, url: &str) -> Result<ResolvedPage, ExtractError> {
        (**self).load(url)
    }
}

/// Follows the affiliate redirect chain, then fetches the landing page.
pub struct HttpProductSource<P> {
    resolver: RedirectResolver<P>,
    fetcher: PageFetcher<P>,
}

impl<P: Pacer + Clone> HttpProductSource<P> {
    pub fn new(config: &ExtractionConfig, pacer: P) -> Result<Self, reqwest::Error> {
        let client = build_client(config.request_timeout())?;
        Ok(Self {
            resolver: RedirectResolver::new(
                client.clone(),
                pacer.clone(),
                config.max_redirects,
                config.redirect_delay,
            ),
            fetcher: PageFetcher::new(client, pacer, config.pre_fetch_delay),
        })
    }
}

impl<P: Pacer> ProductPageSource for HttpProductSource<P> {
    fn load(&self, url: &str) -> Result<ResolvedPage, ExtractError> {
        let start = Url::parse(url.trim()).map_err(|source| ExtractError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        log::info!("Resolving {start}");
        let resolution = self.resolver.resolve(&start);
        log::info!(
            "Final URL after {} redirect(s): {}",
            resolution.hops,
            resolution.final_url
        );

        self.fetcher.fetch(&resolution.final_url)
    }
}

/// Where one attempt stands. `Success`, `Retry` and `Abandoned` end the attempt.
#[derive(Debug)]
pub enum AttemptState {
    Fetching,
    Extracting(ResolvedPage),
    Evaluating(ProductRecord),
    Success(ProductRecord),
    Retry(Option<ProductRecord>),
    /// The failure cannot go away on a later attempt.
    Abandoned,
}

impl AttemptState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetching => "FETCHING",
            Self::Extracting(_) => "EXTRACTING",
            Self::Evaluating(_) => "EVALUATING",
            Self::Success(_) => "SUCCESS",
            Self::Retry(_) => "RETRY",
            Self::Abandoned => "ABANDONED",
        }
    }
}

enum AttemptOutcome {
    Accepted(ProductRecord),
    Rejected(Option<ProductRecord>),
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub record: ProductRecord,
    pub attempts: u32,
    pub succeeded: bool,
}

/// Retries fetch + extract until the record is good enough or the budget runs out.
pub struct Extractor<S, P> {
    source: S,
    pacer: P,
    max_retries: u32,
    retry_backoff: DelayWindow,
}

impl<S: ProductPageSource, P: Pacer> Extractor<S, P> {
    pub fn new(source: S, pacer: P, max_retries: u32, retry_backoff: DelayWindow) -> Self {
        Self {
            source,
            pacer,
            max_retries,
            retry_backoff,
        }
    }

    pub fn from_config(source: S, pacer: P, config: &ExtractionConfig) -> Self {
        Self::new(source, pacer, config.max_retries, config.retry_backoff)
    }

    /// Always returns a record, all-sentinel in the worst case.
    pub fn extract(&self, url: &str) -> ProductRecord {
        self.extract_with_report(url).record
    }

    pub fn extract_with_report(&self, url: &str) -> ExtractionReport {
        let mut request = ExtractionRequest::new(url, self.max_retries);
        let mut latest: Option<ProductRecord> = None;

        while request.begin_attempt() {
            log::info!(
                "Attempt {} of {} to extract product details from {}",
                request.attempt,
                request.max_retries,
                request.url
            );

            match self.run_attempt(&request.url) {
                AttemptOutcome::Accepted(record) => {
                    log::info!("Found product: {} / {}", record.name, record.price);
                    return ExtractionReport {
                        record,
                        attempts: request.attempt,
                        succeeded: true,
                    };
                }
                AttemptOutcome::Rejected(record) => {
                    if record.is_some() {
                        latest = record;
                    }
                }
                AttemptOutcome::Abandoned => {
                    log::warn!("Not retrying {}: the failure is permanent", request.url);
                    break;
                }
            }

            if !request.is_last_attempt() {
                log::info!("Attempt {} incomplete, backing off before retry", request.attempt);
                self.pacer.pause(&self.retry_backoff);
            }
        }

        log::warn!(
            "Giving up on {} after {} attempt(s), returning best effort record",
            request.url,
            request.attempt
        );
        ExtractionReport {
            record: latest.unwrap_or_default(),
            attempts: request.attempt,
            succeeded: false,
        }
    }

    fn run_attempt(&self, url: &str) -> AttemptOutcome {
        let mut state = AttemptState::Fetching;
        loop {
            let from = state.label();
            state = self.step(url, state);
            log::debug!("{from} -> {}", state.label());
            match state {
                AttemptState::Success(record) => return AttemptOutcome::Accepted(record),
                AttemptState::Retry(record) => return AttemptOutcome::Rejected(record),
                AttemptState::Abandoned => return AttemptOutcome::Abandoned,
                _ => {}
            }
        }
    }

    fn step(&self, url: &str, state: AttemptState) -> AttemptState {
        match state {
            AttemptState::Fetching => match self.source.load(url) {
                Ok(page) => AttemptState::Extracting(page),
                Err(e) if e.is_retryable() => {
                    log::warn!("Fetch failed: {e}");
                    AttemptState::Retry(None)
                }
                Err(e) => {
                    log::warn!("Fetch failed permanently: {e}");
                    AttemptState::Abandoned
                }
            },
            AttemptState::Extracting(page) => {
                AttemptState::Evaluating(parse_product(&page.body, &page.final_url))
            }
            AttemptState::Evaluating(record) => {
                log::info!(
                    "Extracted name={:?} price={:?} image={:?}",
                    record.name,
                    record.price,
                    record.image_url
                );
                if record.meets_success_criteria() {
                    AttemptState::Success(record)
                } else {
                    AttemptState::Retry(Some(record))
                }
            }
            done @ (AttemptState::Success(_)
            | AttemptState::Retry(_)
            | AttemptState::Abandoned) => done,
        }
    }
}
