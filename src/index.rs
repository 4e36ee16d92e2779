use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{info, warn};

use crate::extract::decode_latin1;
use crate::fetch;

const EXTRAKT_INDEX: &str = "http://dipbt.bundestag.de/extrakt/ba/WP";

// Anchor tags carrying class="linkIntern", either attribute order.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a\s[^>]*?(?:class="linkIntern"[^>]*?href="([^"]+)"|href="([^"]+)"[^>]*?class="linkIntern")"#,
    )
    .unwrap()
});

/// Enumerate Ablauf page URLs from the per-Wahlperiode extrakt indexes.
/// Finite, restartable, no ordering guarantees beyond document order.
pub fn ablauf_urls(client: &Client, wahlperioden: &[i64]) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for wp in wahlperioden {
        let index_url = format!("{}{}/", EXTRAKT_INDEX, wp);
        info!("Loading WP index: {}", index_url);

        let page = fetch::fetch(client, &index_url)?;
        let html = decode_latin1(&page);
        let base = Url::parse(&index_url)
            .with_context(|| format!("Bad index URL {}", index_url))?;

        for cap in LINK_RE.captures_iter(&html) {
            let href = cap
                .get(1)
                .or_else(|| cap.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match base.join(href) {
                Ok(joined) => urls.push(joined.to_string()),
                Err(e) => warn!("Skipping unjoinable href {:?}: {}", href, e),
            }
        }
    }
    info!("Index yielded {} Ablauf URLs", urls.len());
    Ok(urls)
}

// ── Tests ──
