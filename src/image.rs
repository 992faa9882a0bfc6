//! Rewrites product image URLs to the largest variant the image host serves.
//!
//! Retail CDNs encode resizing in the file name (`81abc._AC_SX300_SY300_.jpg`,
//! `S1e2f.jpg_220x220q75.jpg_.avif`) or in the query string. Removing those
//! directives yields the original upload.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// `stem._<directives>_.ext`
static AMAZON_MODIFIERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<stem>[^.]+?)\._[A-Za-z0-9_,.+\-%]*_\.(?P<ext>[A-Za-z0-9]+)$").unwrap()
});

/// `stem.jpg_640x640q75.jpg_.avif` and friends
static TRAILING_RESIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<base>.+?\.(?:jpe?g|png|gif|webp))_.+$").unwrap()
});

/// `stem_220x220.jpg`, `stem_50x50q90.png`
static DIMENSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<stem>.+?)_\d{2,4}x\d{2,4}(?:q\d{1,3})?\.(?P<ext>jpe?g|png|gif|webp)$")
        .unwrap()
});

static SIZE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(?:SL|SX|SY|UL|SS|US|AC_SL|AC_SX|AC_SY)(\d{2,4})_").unwrap());

static DIMENSION_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{3,4})x(\d{3,4})").unwrap());

const SMALL_PATH_TOKENS: [&str; 4] = ["/thumbnail/", "/thumb/", "/small/", "/medium/"];
const LARGE_PATH_TOKEN: &str = "/large/";

const QUALITY_KEYWORDS: [&str; 7] = [
    "hires", "hi-res", "hi_res", "original", "zoom", "large", "fullsize",
];

const LARGE_DIMENSION: u32 = 1000;

/// Normalizes `raw` to an absolute HTTPS URL of the largest image variant.
///
/// Relative values are resolved against `base`. Values that are not URLs at
/// all (and `data:` URIs) come back trimmed but otherwise untouched. Applying
/// this twice gives the same result as applying it once.
pub fn optimize_image_url(raw: &str, base: &Url) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with("data:") {
        return trimmed.to_string();
    }

    let Some(mut url) = absolutize(trimmed, base) else {
        return trimmed.to_string();
    };
    if url.scheme() == "http" {
        // http -> https is always permitted between special schemes
        let _ = url.set_scheme("https");
    }
    if url.scheme() != "https" {
        return url.to_string();
    }

    url.set_query(None);
    url.set_fragment(None);

    let path = upsize_path(url.path());
    url.set_path(&path);
    url.to_string()
}

fn absolutize(raw: &str, base: &Url) -> Option<Url> {
    if let Some(rest) = raw.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok();
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(raw).ok(),
        Err(_) => None,
    }
}

fn upsize_path(path: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };

    let file = strip_size_directives(file);

    // adjacent tokens share a slash, so one replace pass can leave some behind
    let mut dir = dir.to_string();
    while let Some(token) = SMALL_PATH_TOKENS.iter().find(|t| dir.contains(*t)) {
        dir = dir.replace(token, LARGE_PATH_TOKEN);
    }
    format!("{dir}{file}")
}

/// Every rewrite shortens the name, so this reaches a fixpoint.
fn strip_size_directives(file: &str) -> String {
    let mut file = file.to_string();
    loop {
        let next = if let Some(caps) = TRAILING_RESIZE.captures(&file) {
            caps["base"].to_string()
        } else if let Some(caps) = AMAZON_MODIFIERS.captures(&file) {
            format!("{}.{}", &caps["stem"], &caps["ext"])
        } else if let Some(caps) = DIMENSION_SUFFIX.captures(&file) {
            format!("{}.{}", &caps["stem"], &caps["ext"])
        } else {
            return file;
        };
        file = next;
    }
}

/// Whether the URL itself advertises a large or original-quality variant.
pub fn is_high_resolution(url: &str) -> bool {
    if SIZE_DIRECTIVE
        .captures_iter(url)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .any(|d| d >= LARGE_DIMENSION)
    {
        return true;
    }

    if DIMENSION_PAIR.captures_iter(url).any(|c| {
        let w = c[1].parse::<u32>().unwrap_or(0);
        let h = c[2].parse::<u32>().unwrap_or(0);
        w.min(h) >= LARGE_DIMENSION
    }) {
        return true;
    }

    let lower = url.to_ascii_lowercase();
    QUALITY_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Picks the URL with the largest width*height from a `{url: [w, h]}` map.
/// Equal areas keep the entry that appears first.
pub fn largest_by_area(json: &str) -> Option<String> {
    let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(json) {
        Ok(map) => map,
        Err(e) => {
            log::debug!("Ignoring malformed dynamic image map: {e}");
            return None;
        }
    };

    let mut best: Option<(&String, u64)> = None;
    for (url, dims) in &map {
        let Some(area) = area_of(dims) else {
            continue;
        };
        if best.is_none_or(|(_, top)| area > top) {
            best = Some((url, area));
        }
    }
    best.map(|(url, _)| url.clone())
}

fn area_of(dims: &serde_json::Value) -> Option<u64> {
    let pair = dims.as_array()?;
    let w = pair.first()?.as_f64()?;
    let h = pair.get(1)?.as_f64()?;
    if w < 0.0 || h < 0.0 {
        return None;
    }
    Some((w * h) as u64)
}
