// =============================================================================
// complaint_resolver.rs -- THE COMPLAINT BLOODHOUND
// =============================================================================
//
// CourtListener knows a docket exists long before it knows where the
// complaint PDF lives. RECAP only has what some browser extension happened
// to upload, the docket entries API may or may not embed the document, and
// sometimes the only trace of the file is a link buried in the HTML page.
//
// So we climb a ladder:
//
//   1. Page through the docket entries, pick the operative complaint
//      (latest filed complaint-ish entry).
//   2. Ask the RECAP documents API for that entry's file.
//   3. Look at the documents embedded in the entry payload itself.
//   4. Scrape the public docket page for a storage PDF link.
//
// Every rung can fail quietly. The ladder never throws; at worst it tells
// you "not found" and the report says "unknown".
// =============================================================================

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fetch::{request_key, Query, RecordsFetch};
use crate::models::{str_field, AmendmentType, ComplaintReference, ResolutionOutcome, ResolutionTier};
use crate::text_scanner;

/// Where RECAP keeps its files.
pub const STORAGE_BASE: &str = "https://storage.courtlistener.com";

/// Page size for docket-entries pagination.
const ENTRIES_PAGE_SIZE: u32 = 100;

/// Hard stop for any pagination loop. A docket with more than 50 pages of
/// entries is either a mega-MDL or an API echoing its own `next` link.
pub const MAX_PAGES: usize = 50;

static ABSOLUTE_STORAGE_PDF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://storage\.courtlistener\.com/[^"'\s<>]+?\.pdf"#).expect("storage pdf regex")
});

static RELATIVE_RECAP_PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'](/recap/[^"'\s<>]+?\.pdf)["']"#).expect("recap pdf regex"));

/// A docket entry that looks like the complaint.
#[derive(Debug, Clone)]
pub struct OperativeEntry {
    pub id: Option<String>,
    pub entry_number: Option<String>,
    pub description: String,
    pub date_filed: String,
    pub raw: Value,
}

impl OperativeEntry {
    fn from_json(raw: &Value) -> Self {
        OperativeEntry {
            id: str_field(raw, "id"),
            entry_number: str_field(raw, "entry_number"),
            description: str_field(raw, "description").unwrap_or_default(),
            date_filed: str_field(raw, "date_filed").unwrap_or_default(),
            raw: raw.clone(),
        }
    }
}

/// Follow `next` links from a first page, collecting every `results` item.
///
/// Stops on a missing `next`, a failed fetch, a `next` we have already
/// visited, or after `MAX_PAGES` pages.
pub async fn collect_pages(
    fetch: &dyn RecordsFetch,
    first_url: &str,
    first_query: Query,
) -> Vec<Value> {
    let mut results = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut url = first_url.to_string();
    let mut query = first_query;

    for page in 0..MAX_PAGES {
        let Some(data) = fetch.get_json(&url, &query).await else {
            debug!(url = url.as_str(), page = page, "Pagination stopped: no data");
            break;
        };

        if let Some(items) = data.get("results").and_then(Value::as_array) {
            results.extend(items.iter().cloned());
        }

        visited.insert(request_key(&url, &query));

        let Some(next) = data.get("next").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
            break;
        };
        if visited.contains(next) {
            warn!(next = next, "Pagination stopped: API echoed a page we already read");
            break;
        }

        url = next.to_string();
        query = Query::new();
    }

    results
}

/// Pick the operative complaint: latest filing date wins, ties keep the
/// first entry in the order the API returned them.
pub fn select_operative(entries: Vec<OperativeEntry>) -> Option<OperativeEntry> {
    entries.into_iter().reduce(|best, candidate| {
        if candidate.date_filed > best.date_filed {
            candidate
        } else {
            best
        }
    })
}

/// Prefer the locally stored RECAP file over the public page URL.
fn document_link(doc: &Value) -> Option<String> {
    str_field(doc, "filepath_local")
        .or_else(|| str_field(doc, "absolute_url"))
        .map(|path| absolute_url(&path))
}

/// Make storage paths and site paths absolute.
///
/// `recap/gov.uscourts...pdf` lives on the storage host, anything starting
/// with `/` lives on the main site.
pub fn absolute_url(path: &str) -> String {
    if path.starts_with("http") {
        path.to_string()
    } else if path.starts_with("/recap/") {
        format!("{STORAGE_BASE}{path}")
    } else if path.starts_with('/') {
        format!("https://www.courtlistener.com{path}")
    } else {
        format!("{STORAGE_BASE}/{path}")
    }
}

/// Scan docket HTML for a PDF link: absolute storage links first, then
/// site-relative `/recap/...pdf` links made absolute.
pub fn scan_html_for_pdf(html: &str) -> Option<String> {
    if memchr::memmem::find(html.as_bytes(), b".pdf").is_none() {
        return None;
    }
    if let Some(m) = ABSOLUTE_STORAGE_PDF.find(html) {
        return Some(m.as_str().to_string());
    }
    RELATIVE_RECAP_PDF
        .captures(html)
        .map(|cap| format!("{STORAGE_BASE}{}", &cap[1]))
}

/// Resolves the operative complaint of a docket.
pub struct ComplaintResolver<'a> {
    fetch: &'a dyn RecordsFetch,
    api_base: String,
    site: String,
}

impl<'a> ComplaintResolver<'a> {
    pub fn new(fetch: &'a dyn RecordsFetch, api_base: &str, site: &str) -> Self {
        Self {
            fetch,
            api_base: api_base.trim_end_matches('/').to_string(),
            site: site.trim_end_matches('/').to_string(),
        }
    }

    /// Run the whole ladder for one docket.
    pub async fn resolve_complaint(&self, docket_id: u64) -> ResolutionOutcome {
        let operative = self.find_operative_entry(docket_id).await;

        for tier in ResolutionTier::ORDER {
            let link = match tier {
                ResolutionTier::PrimaryDocument => match &operative {
                    Some(entry) => self.primary_document_link(entry).await,
                    None => None,
                },
                ResolutionTier::DocketEntries => operative.as_ref().and_then(embedded_document_link),
                ResolutionTier::HtmlFallback => self.html_fallback_link(docket_id).await,
            };

            if let Some(link) = link {
                info!(
                    docket_id = docket_id,
                    tier = %tier,
                    link = link.as_str(),
                    "Complaint located"
                );
                return ResolutionOutcome::Found(reference(operative.as_ref(), Some(link), tier));
            }
        }

        match operative {
            Some(entry) => {
                debug!(docket_id = docket_id, "Complaint entry found but no document link anywhere");
                ResolutionOutcome::Found(reference(Some(&entry), None, ResolutionTier::DocketEntries))
            }
            None => {
                debug!(docket_id = docket_id, "No complaint found on any tier");
                ResolutionOutcome::NotFound
            }
        }
    }

    /// Step 1: all entries, filtered to complaint-like ones, reduced to the operative one.
    pub async fn find_operative_entry(&self, docket_id: u64) -> Option<OperativeEntry> {
        let url = format!("{}/docket-entries/", self.api_base);
        let query: Query = vec![
            ("docket", docket_id.to_string()),
            ("page_size", ENTRIES_PAGE_SIZE.to_string()),
        ];

        let entries: Vec<OperativeEntry> = collect_pages(self.fetch, &url, query)
            .await
            .iter()
            .map(OperativeEntry::from_json)
            .filter(|e| text_scanner::is_complaint_like(&e.description))
            .collect();

        debug!(docket_id = docket_id, matches = entries.len(), "Complaint-like docket entries");
        select_operative(entries)
    }

    /// Tier: RECAP documents API filtered by the entry id.
    async fn primary_document_link(&self, entry: &OperativeEntry) -> Option<String> {
        let entry_id = entry.id.as_ref()?;
        let url = format!("{}/recap-documents/", self.api_base);
        let data = self
            .fetch
            .get_json(&url, &vec![("docket_entry", entry_id.clone())])
            .await?;

        data.get("results")?
            .as_array()?
            .iter()
            .find_map(document_link)
    }

    /// Tier: scrape the public docket page.
    async fn html_fallback_link(&self, docket_id: u64) -> Option<String> {
        let page = format!("{}/docket/{docket_id}/", self.site);
        let html = self.fetch.get_html(&page).await?;
        scan_html_for_pdf(&html)
    }
}

/// Tier: documents embedded in the docket-entry payload.
fn embedded_document_link(entry: &OperativeEntry) -> Option<String> {
    entry
        .raw
        .get("recap_documents")?
        .as_array()?
        .iter()
        .find_map(document_link)
}

fn reference(entry: Option<&OperativeEntry>, link: Option<String>, tier: ResolutionTier) -> ComplaintReference {
    ComplaintReference {
        document_number: entry.and_then(|e| e.entry_number.clone()),
        description: entry.map(|e| e.description.clone()).unwrap_or_default(),
        amendment: entry.map(|e| AmendmentType::detect(&e.description)),
        link,
        tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeRecords;
    use serde_json::json;

    const API: &str = "https://cl.test/api/rest/v4";
    const SITE: &str = "https://cl.test";

    fn entries_query(id: u64) -> Query {
        vec![("docket", id.to_string()), ("page_size", "100".to_string())]
    }

    fn entry(id: u64, number: u64, desc: &str, date: &str) -> Value {
        json!({"id": id, "entry_number": number, "description": desc, "date_filed": date})
    }

    #[test]
    fn test_select_operative_latest_then_first() {
        let mk = |desc: &str, date: &str| OperativeEntry::from_json(&json!({"description": desc, "date_filed": date}));
        let picked = select_operative(vec![
            mk("COMPLAINT", "2024-01-01"),
            mk("AMENDED COMPLAINT", "2024-03-01"),
            mk("SECOND AMENDED COMPLAINT (dup date)", "2024-03-01"),
        ])
        .unwrap();
        assert_eq!(picked.description, "AMENDED COMPLAINT");
        assert!(select_operative(vec![]).is_none());
    }

    #[test]
    fn test_html_scan_prefers_absolute_links() {
        let html = r#"<a href="/recap/gov.uscourts.cand.1/gov.uscourts.cand.1.1.0.pdf">x</a>
                      <a href="https://storage.courtlistener.com/recap/gov.uscourts.cand.1/abs.pdf">y</a>"#;
        assert_eq!(
            scan_html_for_pdf(html).unwrap(),
            "https://storage.courtlistener.com/recap/gov.uscourts.cand.1/abs.pdf"
        );
    }

    #[test]
    fn test_html_scan_relative_link_made_absolute() {
        let html = r#"<a href='/recap/gov.uscourts.nysd.9/gov.uscourts.nysd.9.1.0.pdf'>Complaint</a>"#;
        assert_eq!(
            scan_html_for_pdf(html).unwrap(),
            "https://storage.courtlistener.com/recap/gov.uscourts.nysd.9/gov.uscourts.nysd.9.1.0.pdf"
        );
        assert!(scan_html_for_pdf("<html>nothing</html>").is_none());
    }

    #[tokio::test]
    async fn test_primary_document_tier_prefers_local_file() {
        let fake = FakeRecords::new()
            .with_json(
                &format!("{API}/docket-entries/"),
                entries_query(7),
                json!({"results": [
                    entry(70, 1, "COMPLAINT against Model Co", "2024-01-02"),
                    entry(71, 5, "ORDER setting hearing", "2024-02-02"),
                ], "next": null}),
            )
            .with_json(
                &format!("{API}/recap-documents/"),
                vec![("docket_entry", "70".to_string())],
                json!({"results": [{
                    "absolute_url": "/docket/7/1/model-co/",
                    "filepath_local": "recap/gov.uscourts.cand.7/gov.uscourts.cand.7.1.0.pdf"
                }]}),
            );

        let resolver = ComplaintResolver::new(&fake, API, SITE);
        let reference = resolver.resolve_complaint(7).await.into_reference().unwrap();
        assert_eq!(reference.tier, ResolutionTier::PrimaryDocument);
        assert_eq!(
            reference.link.as_deref(),
            Some("https://storage.courtlistener.com/recap/gov.uscourts.cand.7/gov.uscourts.cand.7.1.0.pdf")
        );
        assert_eq!(reference.document_number.as_deref(), Some("1"));
        assert_eq!(reference.amendment, Some(AmendmentType::Original));
        // The HTML page is never touched once a tier succeeds.
        assert_eq!(fake.calls_matching("/docket/7/"), 0);
    }

    #[tokio::test]
    async fn test_embedded_documents_tier() {
        let mut raw = entry(80, 12, "FIRST AMENDED COMPLAINT", "2024-04-01");
        raw["recap_documents"] = json!([{"filepath_local": "recap/x/embedded.pdf"}]);
        let fake = FakeRecords::new().with_json(
            &format!("{API}/docket-entries/"),
            entries_query(8),
            json!({"results": [raw]}),
        );

        let resolver = ComplaintResolver::new(&fake, API, SITE);
        let reference = resolver.resolve_complaint(8).await.into_reference().unwrap();
        assert_eq!(reference.tier, ResolutionTier::DocketEntries);
        assert_eq!(reference.link.as_deref(), Some("https://storage.courtlistener.com/recap/x/embedded.pdf"));
        assert_eq!(reference.amendment, Some(AmendmentType::Amended));
    }

    #[tokio::test]
    async fn test_html_fallback_when_api_has_nothing() {
        let fake = FakeRecords::new().with_html(
            "https://cl.test/docket/9/",
            r#"<a href="/recap/gov.uscourts.nysd.9/complaint.pdf">Complaint</a>"#,
        );
        let resolver = ComplaintResolver::new(&fake, API, SITE);
        match resolver.resolve_complaint(9).await {
            ResolutionOutcome::Found(reference) => {
                assert_eq!(reference.tier, ResolutionTier::HtmlFallback);
                assert!(reference.amendment.is_none());
                assert!(reference.link.unwrap().ends_with("/complaint.pdf"));
            }
            ResolutionOutcome::NotFound => panic!("expected the html tier to find the pdf"),
        }
    }

    #[tokio::test]
    async fn test_everything_failing_is_not_found() {
        let fake = FakeRecords::new();
        let resolver = ComplaintResolver::new(&fake, API, SITE);
        assert_eq!(resolver.resolve_complaint(10).await, ResolutionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_entry_without_any_link_is_still_reported() {
        let fake = FakeRecords::new().with_json(
            &format!("{API}/docket-entries/"),
            entries_query(11),
            json!({"results": [entry(110, 1, "CLASS ACTION COMPLAINT", "2024-05-01")]}),
        );
        let resolver = ComplaintResolver::new(&fake, API, SITE);
        let reference = resolver.resolve_complaint(11).await.into_reference().unwrap();
        assert_eq!(reference.tier, ResolutionTier::DocketEntries);
        assert!(reference.link.is_none());
        assert_eq!(reference.amendment, Some(AmendmentType::ClassAction));
    }

    #[tokio::test]
    async fn test_pagination_follows_next_and_stops_on_echo() {
        let first = format!("{API}/docket-entries/");
        let second = format!("{API}/docket-entries/?cursor=2");
        let fake = FakeRecords::new()
            .with_json(
                &first,
                entries_query(12),
                json!({"results": [entry(1, 1, "COMPLAINT", "2024-01-01")], "next": second}),
            )
            .with_json(
                &second,
                vec![],
                // The API echoes its own page as `next`.
                json!({"results": [entry(2, 9, "AMENDED COMPLAINT", "2024-06-01")], "next": second}),
            );

        let resolver = ComplaintResolver::new(&fake, API, SITE);
        let operative = resolver.find_operative_entry(12).await.unwrap();
        assert_eq!(operative.entry_number.as_deref(), Some("9"));
        assert_eq!(fake.calls_matching("cursor=2"), 1);
    }
}
