use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// The page's JSON-LD description of the product, if it embeds one.
#[derive(Debug, Clone)]
pub struct ProductMetadata {
    node: Value,
}

impl ProductMetadata {
    /// Prefers a node typed `Product`, else the first object with a `name`.
    /// Blocks that fail to parse are skipped.
    pub fn from_document(doc: &Html) -> Option<Self> {
        let mut fallback: Option<Value> = None;

        for script in doc.select(&LD_JSON) {
            let raw = script.text().collect::<String>();
            let parsed: Value = match serde_json::from_str(raw.trim()) {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("Skipping malformed ld+json block: {e}");
                    continue;
                }
            };

            let mut nodes = Vec::new();
            flatten_nodes(&parsed, &mut nodes);
            for node in nodes {
                if is_product(node) {
                    return Some(Self { node: node.clone() });
                }
                if fallback.is_none() && node.get("name").is_some() {
                    fallback = Some(node.clone());
                }
            }
        }

        fallback.map(|node| Self { node })
    }

    pub fn name(&self) -> Option<String> {
        self.node.get("name").and_then(scalar_text)
    }

    /// `offers.price`, else `offers.lowPrice`; the first offer of a list.
    pub fn price(&self) -> Option<String> {
        let offers = self.node.get("offers")?;
        let offer = match offers {
            Value::Array(list) => list.first()?,
            other => other,
        };
        offer
            .get("price")
            .and_then(scalar_text)
            .or_else(|| offer.get("lowPrice").and_then(scalar_text))
    }

    pub fn images(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(image) = self.node.get("image") {
            collect_images(image, &mut urls);
        }
        urls
    }
}

fn flatten_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| flatten_nodes(v, out)),
        Value::Object(map) => {
            out.push(value);
            if let Some(graph) = map.get("@graph") {
                flatten_nodes(graph, out);
            }
        }
        _ => {}
    }
}

fn is_product(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("product"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|s| s.eq_ignore_ascii_case("product"))),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn collect_images(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_images(v, out)),
        Value::Object(map) => {
            if let Some(url) = map.get("url").or_else(|| map.get("contentUrl")) {
                collect_images(url, out);
            }
        }
        _ => {}
    }
}
