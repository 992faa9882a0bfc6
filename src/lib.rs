pub mod archiver;
pub mod config;
pub mod content;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod image;
pub mod job;
pub mod metadata;
pub mod models;
pub mod pacing;
pub mod parser;
pub mod publisher;

pub use config::Config;
pub use error::ExtractError;
pub use extractor::{Extractor, HttpProductSource, ProductPageSource};
pub use models::{PRICE_NOT_AVAILABLE, ProductRecord, UNKNOWN_PRODUCT};

use pacing::JitterPacer;

/// Extractor over live HTTP with randomized pauses, as used in production.
pub fn http_extractor(
    config: &config::ExtractionConfig,
) -> Result<Extractor<HttpProductSource<JitterPacer>, JitterPacer>, reqwest::Error> {
    let source = HttpProductSource::new(config, JitterPacer)?;
    Ok(Extractor::from_config(source, JitterPacer, config))
}
