#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use promo_poster::ExtractError;
use promo_poster::extractor::ProductPageSource;
use promo_poster::models::ResolvedPage;
use promo_poster::pacing::{DelayWindow, Pacer};
use url::Url;

pub const PRODUCT_URL: &str = "https://www.amazon.com/dp/B0TEST";

pub fn page(html: &str) -> ResolvedPage {
    ResolvedPage {
        final_url: Url::parse(PRODUCT_URL).unwrap(),
        body: html.to_string(),
        status: 200,
    }
}

/// Hands out canned responses in order; repeats the last one when drained.
pub struct ScriptedSource {
    responses: RefCell<VecDeque<Result<ResolvedPage, u16>>>,
    last: RefCell<Option<Result<ResolvedPage, u16>>>,
    pub loads: Cell<usize>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<ResolvedPage, u16>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            last: RefCell::new(None),
            loads: Cell::new(0),
        }
    }

    pub fn always(html: &str) -> Self {
        Self::new(vec![Ok(page(html))])
    }
}

impl ProductPageSource for ScriptedSource {
    fn load(&self, url: &str) -> Result<ResolvedPage, ExtractError> {
        self.loads.set(self.loads.get() + 1);
        let next = self.responses.borrow_mut().pop_front();
        let response = match next {
            Some(r) => {
                *self.last.borrow_mut() = Some(r.clone());
                r
            }
            None => self.last.borrow().clone().unwrap_or(Err(500)),
        };
        response.map_err(|status| ExtractError::UnexpectedStatus {
            url: url.to_string(),
            status,
        })
    }
}

#[derive(Default)]
pub struct RecordingPacer {
    pub pauses: RefCell<Vec<DelayWindow>>,
}

impl Pacer for RecordingPacer {
    fn pause(&self, window: &DelayWindow) {
        self.pauses.borrow_mut().push(*window);
    }
}
