use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const TIMEOUT: Duration = Duration::from_secs(60);

pub fn client() -> Result<Client> {
    Client::builder()
        .timeout(TIMEOUT)
        .user_agent(concat!("dip_scraper/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch one page as raw bytes. Network and HTTP errors are fatal to the
/// caller; retry policy lives outside this core.
pub fn fetch(client: &Client, url: &str) -> Result<Vec<u8>> {
    let res = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Bad response for {}", url))?;
    Ok(res.bytes()?.to_vec())
}
