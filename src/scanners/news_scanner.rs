// =============================================================================
// news_scanner.rs -- THE HEADLINE DOWSING ROD
// =============================================================================
//
// Journalists find AI training-data lawsuits fast, and they quote docket
// numbers and captions we can feed back into CourtListener. So we read
// Google News RSS for a handful of queries, open every article, and keep
// the ones that actually talk about litigation.
//
// Each surviving article becomes a `Lawsuit`: case number, case title,
// headline, a one-line reason. Articles about the same suit (same number,
// same title, same headline) fold into one row with several links.
//
// Articles fail to load all the time: paywalls, bot walls, slow CDNs.
// A headline alone is too thin to call something a lawsuit, so an article
// we cannot read is dropped. Google News links redirect to the publisher,
// and both addresses stay on the lawsuit.
//
// The known-cases sheet gets the last word on number, caption and reason.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::fetch::RecordsFetch;
use crate::known_cases::{self, Enrichment, KnownCase};
use crate::models::{Lawsuit, NewsItem};
use crate::text_scanner;

const GOOGLE_NEWS_RSS: &str = "https://news.google.com/rss/search";

/// Article text beyond this is never looked at.
pub const ARTICLE_TEXT_LIMIT: usize = 20_000;

static NON_CONTENT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").expect("block regex")
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));

/// Google News search feed URL for a query restricted to the last `days` days.
pub fn google_news_url(query: &str, days: i64) -> String {
    let q = format!("{query} when:{days}d");
    format!(
        "{GOOGLE_NEWS_RSS}?q={}&hl=en-US&gl=US&ceid=US:en",
        urlencoding::encode(&q)
    )
}

#[derive(Clone, Copy, PartialEq)]
enum ItemField {
    Title,
    Link,
    PubDate,
}

#[derive(Default)]
struct RawItem {
    title: String,
    link: String,
    pub_date: String,
}

impl RawItem {
    fn field_mut(&mut self, field: ItemField) -> &mut String {
        match field {
            ItemField::Title => &mut self.title,
            ItemField::Link => &mut self.link,
            ItemField::PubDate => &mut self.pub_date,
        }
    }

    fn into_news_item(self) -> Option<NewsItem> {
        let title = self.title.trim().to_string();
        let url = self.link.trim().to_string();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        let published = DateTime::parse_from_rfc2822(self.pub_date.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
        Some(NewsItem { title, url, published })
    }
}

/// Parse `<item>` entries out of an RSS document. A malformed document
/// yields whatever items were complete before the error.
pub fn parse_rss(xml: &str) -> Vec<NewsItem> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field: Option<ItemField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => current = Some(RawItem::default()),
                b"title" => field = Some(ItemField::Title),
                b"link" => field = Some(ItemField::Link),
                b"pubDate" => field = Some(ItemField::PubDate),
                _ => field = None,
            },
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    match t.unescape() {
                        Ok(text) => item.field_mut(f).push_str(&text),
                        Err(e) => debug!(error = %e, "Bad entity in RSS text"),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.field_mut(f).push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take().and_then(RawItem::into_news_item) {
                        items.push(item);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, items = items.len(), "RSS parse error, keeping items so far");
                break;
            }
            _ => {}
        }
    }

    items
}

/// Visible text of an HTML page, whitespace collapsed and capped.
pub fn page_text(html: &str) -> String {
    let without_blocks = NON_CONTENT_BLOCKS.replace_all(html, " ");
    let without_tags = TAGS.replace_all(&without_blocks, " ");
    let text = text_scanner::collapse_whitespace(&without_tags);
    text_scanner::truncate_chars(&text, ARTICLE_TEXT_LIMIT)
}

/// Read every news query's feed. Feeds that fail to load are skipped.
pub async fn fetch_news(fetch: &dyn RecordsFetch, queries: &[&str], days: i64) -> Vec<NewsItem> {
    let mut items = Vec::new();
    for query in queries {
        let url = google_news_url(query, days);
        let Some(xml) = fetch.get_html(&url).await else {
            warn!(query = *query, "News feed unavailable");
            continue;
        };
        let parsed = parse_rss(&xml);
        debug!(query = *query, items = parsed.len(), "News feed parsed");
        items.extend(parsed);
    }
    items
}

/// Turn news items into merged lawsuits. Items published before the window
/// are dropped, undated items kept. Articles whose page cannot be read, or
/// that never mention litigation, are dropped.
pub async fn build_lawsuits(
    fetch: &dyn RecordsFetch,
    items: &[NewsItem],
    known: &[KnownCase],
    now: DateTime<Utc>,
    days: i64,
) -> Vec<Lawsuit> {
    let cutoff = Duration::try_days(days).and_then(|d| now.checked_sub_signed(d));
    let mut lawsuits = Vec::new();

    for item in items {
        if let (Some(published), Some(cutoff)) = (item.published, cutoff) {
            if published < cutoff {
                continue;
            }
        }

        let Some(page) = fetch.get_page(&item.url).await else {
            debug!(url = item.url.as_str(), "Article unreachable, skipped");
            continue;
        };
        let body = page_text(&page.body);
        if body.is_empty() {
            debug!(url = item.url.as_str(), "Article has no text, skipped");
            continue;
        }

        let haystack = format!("{} {}", item.title, body);
        if !text_scanner::is_litigation_related(&haystack) {
            debug!(title = item.title.as_str(), "Not about litigation, skipped");
            continue;
        }

        let enrichment = known_cases::enrich_from_known(&body, &item.title, known);
        lawsuits.push(lawsuit_from_article(item, &page.final_url, &body, &haystack, enrichment, now));
    }

    let merged = merge_lawsuits(lawsuits);
    info!(items = items.len(), lawsuits = merged.len(), "News lawsuits built");
    merged
}

fn lawsuit_from_article(
    item: &NewsItem,
    final_url: &str,
    body: &str,
    haystack: &str,
    enrichment: Option<&Enrichment>,
    now: DateTime<Utc>,
) -> Lawsuit {
    let case_title = match enrichment.and_then(Enrichment::case_title) {
        Some(title) => title.to_string(),
        None => {
            let from_body = text_scanner::extract_case_title(body);
            if from_body == crate::models::UNKNOWN {
                text_scanner::guess_case_title_from_headline(&item.title)
            } else {
                from_body
            }
        }
    };
    let case_number = match enrichment.and_then(Enrichment::case_number) {
        Some(number) => number.to_string(),
        None => text_scanner::extract_case_number(body),
    };
    let reason = match enrichment.and_then(Enrichment::reason) {
        Some(reason) => reason.to_string(),
        None => text_scanner::reason_heuristic(haystack),
    };

    // Feed links redirect to the publisher; keep both addresses.
    let mut article_urls = BTreeSet::from([item.url.clone()]);
    if !final_url.trim().is_empty() {
        article_urls.insert(final_url.trim().to_string());
    }

    Lawsuit {
        update_date: item.published.unwrap_or(now).date_naive().to_string(),
        case_title,
        article_title: item.title.clone(),
        case_number,
        reason,
        article_urls,
    }
}

/// Fold lawsuits sharing (case number, case title, headline), first one keeps its slot.
pub fn merge_lawsuits(lawsuits: Vec<Lawsuit>) -> Vec<Lawsuit> {
    let mut merged: Vec<Lawsuit> = Vec::new();
    for lawsuit in lawsuits {
        match merged.iter_mut().find(|m| m.merge_key() == lawsuit.merge_key()) {
            Some(existing) => existing.absorb(lawsuit),
            None => merged.push(lawsuit),
        }
    }
    merged
}
