//! Name, price and image extraction from a product page.
//!
//! Each field has an ordered list of strategies. The first strategy that
//! produces a non-empty value wins; later ones are never run.

use std::cell::OnceCell;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::image::{is_high_resolution, largest_by_area, optimize_image_url};
use crate::metadata::ProductMetadata;
use crate::models::ProductRecord;

/// Parsed document plus what strategies share about it.
pub struct PageContext<'a> {
    doc: &'a Html,
    page_url: &'a Url,
    metadata: OnceCell<Option<ProductMetadata>>,
}

impl<'a> PageContext<'a> {
    pub fn new(doc: &'a Html, page_url: &'a Url) -> Self {
        Self {
            doc,
            page_url,
            metadata: OnceCell::new(),
        }
    }

    fn metadata(&self) -> Option<&ProductMetadata> {
        self.metadata
            .get_or_init(|| ProductMetadata::from_document(self.doc))
            .as_ref()
    }

    /// Optimizes `raw` and keeps it only if it is an HTTPS URL other than the page itself.
    fn optimized(&self, raw: &str) -> Option<String> {
        let url = optimize_image_url(raw, self.page_url);
        let parsed = Url::parse(&url).ok()?;
        if parsed.scheme() != "https" || !parsed.has_host() {
            log::trace!("Ignoring non-HTTPS image candidate {raw:?}");
            return None;
        }
        // `src="#"` and friends resolve back to the product page
        if url == optimize_image_url(self.page_url.as_str(), self.page_url) {
            log::trace!("Ignoring image candidate {raw:?} pointing at the page itself");
            return None;
        }
        Some(url)
    }
}

pub type Strategy = fn(&PageContext<'_>) -> Option<String>;

/// Runs `strategies` in order and returns the first hit.
pub fn first_hit(
    ctx: &PageContext<'_>,
    field: &str,
    strategies: &[(&str, Strategy)],
) -> Option<String> {
    for (label, strategy) in strategies {
        if let Some(value) = strategy(ctx).filter(|v| !v.trim().is_empty()) {
            log::debug!("{field} found by {label}: {value}");
            return Some(value);
        }
    }
    log::debug!("No strategy produced a {field}");
    None
}

pub const NAME_STRATEGIES: &[(&str, Strategy)] = &[
    ("title selectors", name_from_title_selectors),
    ("generic headings", name_from_headings),
    ("embedded metadata", name_from_metadata),
];

pub const PRICE_STRATEGIES: &[(&str, Strategy)] = &[
    ("price selectors", price_from_selectors),
    ("embedded metadata", price_from_metadata),
];

pub const IMAGE_STRATEGIES: &[(&str, Strategy)] = &[
    ("script hi-res markers", image_from_script_markers),
    ("color variant block", image_from_color_images),
    ("zoom attribute", image_from_zoom_attr),
    ("legacy hi-res attribute", image_from_old_hires),
    ("dynamic image map", image_from_dynamic_map),
    ("embedded metadata", image_from_metadata),
    ("generic image selectors", image_from_generic_selectors),
];

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

static TITLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "span#productTitle",
        "h1#title",
        "h1.a-spacing-none",
        "#productTitle",
        ".product-title-word-break",
        ".product-title",
        "h1.product-title-text",
        "h1[data-pl=\"product-title\"]",
    ])
});

static HEADING_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| selectors(&["h1", "h2"]));

static PRICE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "span.a-price-whole",
        "span#priceblock_ourprice",
        "span#priceblock_dealprice",
        "span.a-offscreen",
        ".a-price .a-offscreen",
        "#corePriceDisplay_desktop_feature_div .a-price-whole",
        "#corePrice_feature_div .a-price-whole",
        ".product-price-current",
        ".product-price-value",
        "[itemprop=\"price\"]",
    ])
});

static INLINE_SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script:not([src])").unwrap());

static ZOOM_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[data-zoom-hires], img[data-zoom-image], img[data-zoom-src]").unwrap()
});
const ZOOM_ATTRS: [&str; 3] = ["data-zoom-hires", "data-zoom-image", "data-zoom-src"];

static OLD_HIRES_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[data-old-hires]").unwrap());

static DYNAMIC_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[data-a-dynamic-image]").unwrap());

static GENERIC_IMAGE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "img#landingImage",
        "img#imgBlkFront",
        "#main-image-container img",
        "#imgTagWrapperId img",
        "#imageBlock_feature_div img",
        "#imageBlock img",
        "#main-image",
        "img.magnifier-image",
        "meta[property=\"og:image\"]",
    ])
});
const GENERIC_IMAGE_ATTRS: [&str; 5] = [
    "src",
    "data-src",
    "data-old-hires",
    "data-a-dynamic-image",
    "content",
];

/// `"hiRes":"https://..."` style fields in page scripts
static SCRIPT_IMAGE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"["'](?:hiRes|large|mainUrl|zoomUrl|imageUrl)["']\s*:\s*["'](https?:[^"']+)["']"#,
    )
    .unwrap()
});
static HIRES_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']hiRes["']\s*:\s*["'](https?:[^"']+)["']"#).unwrap());
static LARGE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']large["']\s*:\s*["'](https?:[^"']+)["']"#).unwrap());

const COLOR_IMAGES_MARKERS: [&str; 2] = ["'colorImages'", "\"colorImages\""];
const COLOR_BLOCK_END_MARKERS: [&str; 4] = [
    "'colorToAsin'",
    "\"colorToAsin\"",
    "'heroImage'",
    "\"heroImage\"",
];
const COLOR_BLOCK_FALLBACK_LEN: usize = 1000;

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&el.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn first_text(doc: &Html, list: &[Selector]) -> Option<String> {
    list.iter()
        .flat_map(|sel| doc.select(sel))
        .find_map(element_text)
}

/// Script literals escape slashes as `\/` or `\u002F`.
fn unescape_script_url(raw: &str) -> String {
    raw.replace("\\/", "/").replace("\\u002F", "/").replace("\\u002f", "/")
}

fn inline_scripts<'d>(doc: &'d Html) -> impl Iterator<Item = String> + 'd {
    doc.select(&INLINE_SCRIPT)
        .filter(|s| s.value().attr("type") != Some("application/ld+json"))
        .map(|s| s.text().collect::<String>())
}

fn name_from_title_selectors(ctx: &PageContext<'_>) -> Option<String> {
    first_text(ctx.doc, &TITLE_SELECTORS)
}

fn name_from_headings(ctx: &PageContext<'_>) -> Option<String> {
    first_text(ctx.doc, &HEADING_SELECTORS)
}

fn name_from_metadata(ctx: &PageContext<'_>) -> Option<String> {
    ctx.metadata()?.name().map(|n| collapse_whitespace(&n))
}

fn price_from_selectors(ctx: &PageContext<'_>) -> Option<String> {
    PRICE_SELECTORS
        .iter()
        .flat_map(|sel| ctx.doc.select(sel))
        .find_map(|el| {
            element_text(el).or_else(|| {
                el.value()
                    .attr("content")
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
            })
        })
}

fn price_from_metadata(ctx: &PageContext<'_>) -> Option<String> {
    ctx.metadata()?.price()
}

fn image_from_script_markers(ctx: &PageContext<'_>) -> Option<String> {
    for script in inline_scripts(ctx.doc) {
        let hit = SCRIPT_IMAGE_FIELD
            .captures_iter(&script)
            .map(|c| unescape_script_url(&c[1]))
            .find(|u| is_high_resolution(u));
        if let Some(url) = hit.and_then(|u| ctx.optimized(&u)) {
            return Some(url);
        }
    }
    None
}

fn color_images_block(script: &str) -> Option<&str> {
    let start = COLOR_IMAGES_MARKERS
        .iter()
        .find_map(|m| script.find(m).map(|i| i + m.len()))?;
    let rest = &script[start..];
    let end = COLOR_BLOCK_END_MARKERS
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or_else(|| {
            let mut end = COLOR_BLOCK_FALLBACK_LEN.min(rest.len());
            while !rest.is_char_boundary(end) {
                end -= 1;
            }
            end
        });
    Some(&rest[..end])
}

fn image_from_color_images(ctx: &PageContext<'_>) -> Option<String> {
    for script in inline_scripts(ctx.doc) {
        let Some(block) = color_images_block(&script) else {
            continue;
        };
        let hit = HIRES_FIELD
            .captures(block)
            .or_else(|| LARGE_FIELD.captures(block))
            .map(|c| unescape_script_url(&c[1]));
        if let Some(url) = hit.and_then(|u| ctx.optimized(&u)) {
            return Some(url);
        }
    }
    None
}

fn image_from_zoom_attr(ctx: &PageContext<'_>) -> Option<String> {
    ctx.doc.select(&ZOOM_IMAGE).find_map(|img| {
        ZOOM_ATTRS
            .iter()
            .filter_map(|a| img.value().attr(a))
            .find_map(|raw| ctx.optimized(raw))
    })
}

fn image_from_old_hires(ctx: &PageContext<'_>) -> Option<String> {
    ctx.doc
        .select(&OLD_HIRES_IMAGE)
        .filter_map(|img| img.value().attr("data-old-hires"))
        .find_map(|raw| ctx.optimized(raw))
}

fn image_from_dynamic_map(ctx: &PageContext<'_>) -> Option<String> {
    ctx.doc
        .select(&DYNAMIC_IMAGE)
        .filter_map(|img| img.value().attr("data-a-dynamic-image"))
        .filter_map(largest_by_area)
        .find_map(|raw| ctx.optimized(&raw))
}

fn image_from_metadata(ctx: &PageContext<'_>) -> Option<String> {
    let images = ctx.metadata()?.images();
    let pick = images
        .iter()
        .find(|u| is_high_resolution(u))
        .or_else(|| images.first())?;
    ctx.optimized(pick)
}

fn first_dynamic_key(json: &str) -> Option<String> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json).ok()?;
    map.keys().next().cloned()
}

fn image_from_generic_selectors(ctx: &PageContext<'_>) -> Option<String> {
    for sel in GENERIC_IMAGE_SELECTORS.iter() {
        for el in ctx.doc.select(sel) {
            for attr in GENERIC_IMAGE_ATTRS {
                let Some(raw) = el
                    .value()
                    .attr(attr)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                else {
                    continue;
                };
                let candidate = if attr == "data-a-dynamic-image" {
                    match first_dynamic_key(raw) {
                        Some(url) => url,
                        None => continue,
                    }
                } else {
                    raw.to_string()
                };
                if let Some(url) = ctx.optimized(&candidate) {
                    return Some(url);
                }
            }
        }
    }
    None
}

pub fn extract_name(ctx: &PageContext<'_>) -> Option<String> {
    first_hit(ctx, "name", NAME_STRATEGIES)
}

pub fn extract_price(ctx: &PageContext<'_>) -> Option<String> {
    first_hit(ctx, "price", PRICE_STRATEGIES)
}

pub fn extract_image(ctx: &PageContext<'_>) -> Option<String> {
    first_hit(ctx, "image", IMAGE_STRATEGIES)
}

/// Extracts a product record from raw page markup. `page_url` anchors
/// relative image paths.
pub fn parse_product(html: &str, page_url: &Url) -> ProductRecord {
    let doc = Html::parse_document(html);
    let ctx = PageContext::new(&doc, page_url);

    static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
    match doc.select(&TITLE).next().and_then(element_text) {
        Some(title) => log::debug!("Page title: {title}"),
        None => log::debug!("Page has no title"),
    }

    ProductRecord::new(extract_name(&ctx), extract_price(&ctx), extract_image(&ctx))
}
