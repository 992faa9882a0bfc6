use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect;
use url::Url;

use crate::error::ExtractError;
use crate::models::{RedirectChain, ResolvedPage};
use crate::pacing::{DelayWindow, Pacer};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Headers of a desktop Chrome navigation arriving from a search result.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    let hints: [(&'static str, &'static str); 8] = [
        ("sec-ch-ua", r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "cross-site"),
        ("sec-fetch-user", "?1"),
        ("dnt", "1"),
    ];
    for (name, value) in hints {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

/// Client that never follows redirects on its own: the resolver walks them hop by hop.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .default_headers(browser_headers())
        .timeout(timeout)
        .build()
}

fn is_followable_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub final_url: Url,
    pub hops: usize,
    pub chain: RedirectChain,
}

pub struct RedirectResolver<P> {
    client: Client,
    pacer: P,
    max_hops: usize,
    hop_delay: DelayWindow,
}

impl<P: Pacer> RedirectResolver<P> {
    pub fn new(client: Client, pacer: P, max_hops: usize, hop_delay: DelayWindow) -> Self {
        Self {
            client,
            pacer,
            max_hops,
            hop_delay,
        }
    }

    /// Follows `Location` headers from `start` until a non-redirect response,
    /// the hop cap, or a network error. Never fails: the last URL reached wins.
    pub fn resolve(&self, start: &Url) -> Resolution {
        let mut chain = RedirectChain::new(start.clone(), self.max_hops);

        while !chain.is_full() {
            let current = chain.last().clone();
            let resp = match self.client.get(current.clone()).send() {
                Ok(resp) => resp,
                Err(e) => {
                    log::warn!("Redirect hop to {current} failed, keeping last URL: {e}");
                    break;
                }
            };

            let status = resp.status().as_u16();
            if !is_followable_redirect(status) {
                log::debug!("{current} answered {status}, resolution ends");
                break;
            }

            let Some(location) = resp
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            else {
                log::debug!("{current} answered {status} without Location");
                break;
            };

            let next = match current.join(location) {
                Ok(next) => next,
                Err(e) => {
                    log::warn!("Unusable Location {location:?} from {current}: {e}");
                    break;
                }
            };

            if chain.revisits(&next) {
                log::warn!("Redirect loop detected: {next} already visited");
            }
            log::info!("Redirect #{}: {next}", chain.hops() + 1);
            chain.push(next);

            self.pacer.pause(&self.hop_delay);
        }

        if chain.is_full() {
            log::warn!("Stopped after {} redirects at {}", chain.hops(), chain.last());
        }

        Resolution {
            final_url: chain.last().clone(),
            hops: chain.hops(),
            chain,
        }
    }
}

pub struct PageFetcher<P> {
    client: Client,
    pacer: P,
    pre_fetch_delay: DelayWindow,
}

impl<P: Pacer> PageFetcher<P> {
    pub fn new(client: Client, pacer: P, pre_fetch_delay: DelayWindow) -> Self {
        Self {
            client,
            pacer,
            pre_fetch_delay,
        }
    }

    /// One GET of `url`. Anything but a 200 is a failure.
    pub fn fetch(&self, url: &Url) -> Result<ResolvedPage, ExtractError> {
        self.pacer.pause(&self.pre_fetch_delay);

        log::info!("Fetching product page {url}");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| ExtractError::network(url.as_str(), e))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ExtractError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        let body = resp
            .text()
            .map_err(|e| ExtractError::network(url.as_str(), e))?;

        Ok(ResolvedPage {
            final_url: url.clone(),
            body,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_look_like_a_browser() {
        let headers = browser_headers();
        assert!(headers[header::USER_AGENT].to_str().unwrap().contains("Chrome/120"));
        assert_eq!(headers["sec-fetch-mode"], "navigate");
        assert_eq!(headers[header::REFERER], "https://www.google.com/");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn only_standard_redirects_are_followed() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_followable_redirect(code));
        }
        for code in [200, 300, 304, 404, 500] {
            assert!(!is_followable_redirect(code));
        }
    }
}
