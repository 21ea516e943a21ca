//! HTML page scraping adapters
//!
//! Pages are reduced to plain text and searched with a list of patterns; the
//! first pattern whose capture group parses as a number wins.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uix_common::MonthLabel;

use super::{get_checked, AdapterError, AdapterOutcome, Frequency, SurveyAdapter, TtlCache};

/// Fetches page text through a shared cache keyed by URL
pub struct PageFetcher {
    http: reqwest::Client,
    cache: TtlCache<Arc<String>>,
}

impl PageFetcher {
    pub fn new(http: reqwest::Client, ttl: Duration) -> Self {
        Self {
            http,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &TtlCache<Arc<String>> {
        &self.cache
    }

    /// Plain text of the page at `url`
    pub async fn fetch_text(&self, url: &str) -> Result<Arc<String>, AdapterError> {
        if let Some(text) = self.cache.get(url).await {
            tracing::debug!(url = %url, "Page served from cache");
            return Ok(text);
        }

        let html = get_checked(&self.http, url)
            .await?
            .text()
            .await
            .map_err(|e| AdapterError::Parse(format!("Body of {}: {}", url, e)))?;
        let text = Arc::new(html_to_text(&html));
        self.cache.insert(url, Arc::clone(&text)).await;
        Ok(text)
    }
}

struct TextCleaners {
    script: Regex,
    style: Regex,
    tag: Regex,
    whitespace: Regex,
}

fn cleaners() -> Option<&'static TextCleaners> {
    static CLEANERS: OnceLock<Option<TextCleaners>> = OnceLock::new();
    CLEANERS
        .get_or_init(|| {
            Some(TextCleaners {
                script: Regex::new(r"(?is)<script.*?</script>").ok()?,
                style: Regex::new(r"(?is)<style.*?</style>").ok()?,
                tag: Regex::new(r"<[^>]+>").ok()?,
                whitespace: Regex::new(r"\s+").ok()?,
            })
        })
        .as_ref()
}

/// Strip scripts, styles and tags, decode the common entities, collapse whitespace
pub fn html_to_text(html: &str) -> String {
    let Some(c) = cleaners() else {
        return html.to_string();
    };

    let text = c.script.replace_all(html, " ");
    let text = c.style.replace_all(&text, " ");
    let text = c.tag.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&rsquo;", "'")
        .replace("&quot;", "\"");
    c.whitespace.replace_all(&text, " ").trim().to_string()
}

/// First capture that parses as a finite number, trying patterns in order
pub fn match_number(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)?
            .get(1)?
            .as_str()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    })
}

/// Compile case-insensitive patterns
pub fn compile_patterns(patterns: &[&str]) -> Result<Vec<Regex>, AdapterError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){}", p))
                .map_err(|e| AdapterError::Config(format!("Invalid pattern {}: {}", p, e)))
        })
        .collect()
}

pub struct ScrapeAdapter {
    name: String,
    source_url: String,
    page_url: String,
    frequency: Frequency,
    patterns: Vec<Regex>,
    fetcher: Arc<PageFetcher>,
}

impl ScrapeAdapter {
    /// `page_url` is fetched; `source_url` is what reviewers are shown
    pub fn new(
        name: &str,
        source_url: &str,
        page_url: &str,
        frequency: Frequency,
        patterns: &[&str],
        fetcher: Arc<PageFetcher>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            name: name.to_string(),
            source_url: source_url.to_string(),
            page_url: page_url.to_string(),
            frequency,
            patterns: compile_patterns(patterns)?,
            fetcher,
        })
    }
}

#[async_trait]
impl SurveyAdapter for ScrapeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_url(&self) -> &str {
        &self.source_url
    }

    fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Pages only carry the latest release, so the month is not used to filter
    async fn fetch(&self, _month: MonthLabel) -> Result<AdapterOutcome, AdapterError> {
        let text = self.fetcher.fetch_text(&self.page_url).await?;
        Ok(match match_number(&self.patterns, &text) {
            Some(value) => AdapterOutcome::observed(value, None),
            None => AdapterOutcome::missing().with_message("No matching figure on page"),
        })
    }
}
