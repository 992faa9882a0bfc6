use serde::{Deserialize, Serialize};
use url::Url;

pub const UNKNOWN_PRODUCT: &str = "Unknown Product";
pub const PRICE_NOT_AVAILABLE: &str = "N/A";

/// What one extraction attempt learned about a product page.
///
/// `name` is never empty: when nothing matched it holds [`UNKNOWN_PRODUCT`].
/// `price` holds [`PRICE_NOT_AVAILABLE`] in the same situation, while a missing
/// image is a real `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
}

impl ProductRecord {
    pub fn new(name: Option<String>, price: Option<String>, image_url: Option<String>) -> Self {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());
        let price = price
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| PRICE_NOT_AVAILABLE.to_string());
        let image_url = image_url.filter(|u| !u.trim().is_empty());

        Self {
            name,
            price,
            image_url,
        }
    }

    pub fn unknown() -> Self {
        Self::new(None, None, None)
    }

    pub fn has_name(&self) -> bool {
        self.name != UNKNOWN_PRODUCT
    }

    pub fn has_price(&self) -> bool {
        self.price != PRICE_NOT_AVAILABLE
    }

    /// A known name plus at least one of price or image.
    pub fn meets_success_criteria(&self) -> bool {
        self.has_name() && (self.has_price() || self.image_url.is_some())
    }
}

impl Default for ProductRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    pub attempt: u32,
    pub max_retries: u32,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            url: url.into(),
            attempt: 0,
            max_retries: max_retries.max(1),
        }
    }

    /// Moves to the next attempt. Returns false once the budget is spent.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempt >= self.max_retries {
            return false;
        }
        self.attempt += 1;
        true
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_retries
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPage {
    pub final_url: Url,
    pub body: String,
    pub status: u16,
}

/// URLs visited while following redirects, capped at `max_hops` redirects
/// beyond the starting URL.
#[derive(Debug, Clone)]
pub struct RedirectChain {
    visited: Vec<Url>,
    max_hops: usize,
}

impl RedirectChain {
    pub fn new(start: Url, max_hops: usize) -> Self {
        Self {
            visited: vec![start],
            max_hops,
        }
    }

    pub fn hops(&self) -> usize {
        self.visited.len() - 1
    }

    pub fn is_full(&self) -> bool {
        self.hops() >= self.max_hops
    }

    pub fn last(&self) -> &Url {
        // never empty: constructed with the start URL
        &self.visited[self.visited.len() - 1]
    }

    pub fn revisits(&self, url: &Url) -> bool {
        self.visited.iter().any(|u| u == url)
    }

    /// Records a hop. Refuses once the cap is reached.
    pub fn push(&mut self, url: Url) -> bool {
        if self.is_full() {
            return false;
        }
        self.visited.push(url);
        true
    }

    pub fn urls(&self) -> &[Url] {
        &self.visited
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub source_url: String,
    #[serde(flatten)]
    pub record: ProductRecord,
    pub timestamp: String,
}

impl ProductSnapshot {
    pub fn now(source_url: &str, record: ProductRecord) -> Self {
        Self {
            source_url: source_url.to_string(),
            record,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
