use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::config::FetcherConfig;
use crate::models::Snapshot;
use crate::{AppError, Result};

const CLOSED_WARNING_SELECTOR: &str = ".item-closed-warning";
const TITLE_SELECTOR: &str = ".title-info-title-text";
const PRICE_SELECTOR: &str = "[itemprop=\"price\"]";

/// Produces the current state of a listing from its link.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdFetcher: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<Snapshot>;
}

/// Fetches listing pages over HTTP and extracts name, price and the
/// closed marker from the markup.
pub struct ListingScraper {
    client: reqwest::Client,
    non_digits: Regex,
}

impl ListingScraper {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        let non_digits = Regex::new(r"\D+").map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self { client, non_digits })
    }

    /// Extracts a snapshot from a listing page.
    pub fn parse_listing(&self, html: &str) -> Result<Snapshot> {
        let document = Html::parse_document(html);

        let closed_warning = first_text(&document, CLOSED_WARNING_SELECTOR)?;
        if !closed_warning.trim().is_empty() {
            return Ok(Snapshot::removed());
        }

        let name = first_text(&document, TITLE_SELECTOR)?.trim().to_string();
        let price_text = first_text(&document, PRICE_SELECTOR)?;
        let digits = self.non_digits.replace_all(&price_text, "");

        if name.is_empty() && digits.is_empty() {
            return Err(AppError::Scraping("Listing name or price is empty".to_string()));
        }

        let price = digits.parse::<i64>().map_err(|e| AppError::Parse {
            message: format!("invalid price '{}': {}", price_text.trim(), e),
        })?;

        Ok(Snapshot::active(name, price))
    }
}

fn first_text(document: &Html, selector: &str) -> Result<String> {
    let selector = Selector::parse(selector).map_err(|e| AppError::Parse {
        message: format!("Invalid CSS selector '{}': {:?}", selector, e),
    })?;

    Ok(document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .unwrap_or_default())
}

#[async_trait]
impl AdFetcher for ListingScraper {
    async fn fetch(&self, link: &str) -> Result<Snapshot> {
        let url = url::Url::parse(link)
            .map_err(|e| AppError::Validation(format!("Invalid URL {}: {}", link, e)))?;

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        self.parse_listing(&body)
    }
}
