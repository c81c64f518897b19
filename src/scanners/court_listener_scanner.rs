// =============================================================================
// court_listener_scanner.rs -- THE FREE LAW PROJECT'S BIGGEST FAN, PART II
// =============================================================================
//
// CourtListener is a free, open platform run by the Free Law Project. Its
// RECAP archive holds docket data uploaded from PACER by volunteers with a
// browser extension. That is where AI training-data lawsuits show up first,
// usually days before anyone writes an article about them.
//
// Real API: https://www.courtlistener.com/api/rest/v4/
// Docs:     https://www.courtlistener.com/help/api/rest/
//
// This module turns loose search hits into two tidy collections:
//
//   * CaseSummary    -- one per docket, with the operative complaint located
//   * DocumentRecord -- one per complaint-like RECAP document, text extracted
//
// A docket can reach us three ways: a search hit, a docket number somebody
// quoted in a news article, or a case title from the same article. All three
// paths funnel into one list of docket ids, deduplicated BEFORE any docket
// is fetched. Each docket is fetched at most once per run, no matter how many
// paths found it or whether cases or documents asked first.
//
// We're a non-profit's guest. One pass, no retries, no parallel stampede.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::court_cache::CourtCache;
use crate::fetch::{Query, RecordsFetch};
use crate::models::{
    str_field, date_part, CaseSummary, DocketRecord, DocumentRecord, SearchHit, UNKNOWN,
};
use crate::scanners::complaint_resolver::{absolute_url, collect_pages, ComplaintResolver};
use crate::text_scanner;

/// Search window and result cap for the case-title expansion path.
pub const TITLE_SEARCH_DAYS: i64 = 365;
pub const TITLE_SEARCH_RESULTS: u32 = 5;

static DOCKET_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/dockets?/(\d+)/").expect("docket path regex"));

/// True unless the date parses and falls strictly before `today - days`.
/// Missing and unparseable dates are kept, and so is everything when the
/// window reaches past the calendar chrono can represent.
pub fn within_lookback(date: Option<&str>, today: NaiveDate, days: i64) -> bool {
    let Some(raw) = date else {
        return true;
    };
    let Some(cutoff) = Duration::try_days(days).and_then(|d| today.checked_sub_signed(d)) else {
        return true;
    };
    match NaiveDate::parse_from_str(&date_part(raw), "%Y-%m-%d") {
        Ok(filed) => filed >= cutoff,
        Err(_) => true,
    }
}

/// Docket id of a search hit: integer id fields first, then any docket URL.
pub fn docket_id_from_hit(hit: &SearchHit) -> Option<u64> {
    for key in ["docket_id", "docketId", "docket"] {
        if let Some(id) = hit.0.get(key).and_then(Value::as_u64) {
            return Some(id);
        }
    }

    ["docket", "docket_url", "docket_absolute_url", "absolute_url"]
        .iter()
        .find_map(|key| {
            let url = hit.0.get(*key)?.as_str()?;
            DOCKET_PATH.captures(url)?.get(1)?.as_str().parse().ok()
        })
}

/// Union several id lists, first sighting wins the position.
pub fn merge_docket_ids<'i>(lists: impl IntoIterator<Item = &'i [u64]>) -> Vec<u64> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Distinct docket ids of a batch of hits, in first-seen order. Hits
/// without an id are dropped.
pub fn docket_ids_from_hits(hits: &[SearchHit]) -> Vec<u64> {
    let ids: Vec<u64> = hits.iter().filter_map(docket_id_from_hit).collect();
    merge_docket_ids([ids.as_slice()])
}

/// Drop hits with the same `absolute_url|caseName`, keeping the first.
pub fn dedup_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter().filter(|h| seen.insert(h.dedup_key())).collect()
}

/// Builds case summaries and complaint documents for one run.
pub struct CaseAggregator<'a> {
    fetch: &'a dyn RecordsFetch,
    courts: CourtCache,
    /// Docket JSON memo. `None` records a failed fetch so it is not repeated.
    dockets: HashMap<u64, Option<DocketRecord>>,
    api_base: String,
    site: String,
    lookback_days: i64,
    today: NaiveDate,
    search_page_size: u32,
}

impl<'a> CaseAggregator<'a> {
    pub fn new(
        fetch: &'a dyn RecordsFetch,
        courts: CourtCache,
        api_base: &str,
        site: &str,
        lookback_days: i64,
        today: NaiveDate,
    ) -> Self {
        Self {
            fetch,
            courts,
            dockets: HashMap::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            site: site.trim_end_matches('/').to_string(),
            lookback_days,
            today,
            search_page_size: 20,
        }
    }

    pub fn with_search_page_size(mut self, page_size: u32) -> Self {
        self.search_page_size = page_size;
        self
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// One RECAP search. Hits filed before the window are dropped.
    pub async fn search(&self, query: &str, days: i64, max_results: u32) -> Vec<SearchHit> {
        let url = format!("{}/search/", self.api_base);
        let params: Query = vec![
            ("q", query.to_string()),
            ("type", "r".to_string()),
            ("page_size", max_results.to_string()),
        ];

        let Some(data) = self.fetch.get_json(&url, &params).await else {
            return Vec::new();
        };

        let hits: Vec<SearchHit> = data
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(SearchHit).collect())
            .unwrap_or_default();
        let total = hits.len();

        let kept: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| within_lookback(h.date_filed().as_deref(), self.today, days))
            .collect();

        debug!(query = query, total = total, kept = kept.len(), "RECAP search complete");
        kept
    }

    /// Run every configured query over the lookback window and drop repeats.
    pub async fn search_all(&self, queries: &[&str]) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for query in queries {
            hits.extend(self.search(query, self.lookback_days, self.search_page_size).await);
        }
        let raw = hits.len();
        let hits = dedup_hits(hits);
        info!(queries = queries.len(), raw_hits = raw, unique_hits = hits.len(), "CourtListener search sweep done");
        hits
    }

    // =========================================================================
    // Expansion paths
    // =========================================================================

    /// Dockets whose number matches a case number quoted in the news.
    pub async fn ids_from_docket_numbers(&self, numbers: &[String]) -> Vec<u64> {
        let url = format!("{}/dockets/", self.api_base);
        let mut ids = Vec::new();

        for number in numbers.iter().filter(|n| !n.is_empty() && *n != UNKNOWN) {
            let Some(data) = self
                .fetch
                .get_json(&url, &vec![("docket_number", number.clone())])
                .await
            else {
                continue;
            };
            let found = data
                .get("results")
                .and_then(Value::as_array)
                .map(|results| {
                    results
                        .iter()
                        .filter_map(|d| d.get("id").and_then(Value::as_u64))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            debug!(docket_number = number.as_str(), matches = found.len(), "Docket number lookup");
            ids.extend(found);
        }

        merge_docket_ids([ids.as_slice()])
    }

    /// Dockets found by searching a case title over the last year.
    pub async fn ids_from_case_titles(&self, titles: &[String]) -> Vec<u64> {
        let mut ids = Vec::new();
        for title in titles.iter().filter(|t| !t.is_empty() && *t != UNKNOWN) {
            let hits = self.search(title, TITLE_SEARCH_DAYS, TITLE_SEARCH_RESULTS).await;
            ids.extend(docket_ids_from_hits(&hits));
        }
        merge_docket_ids([ids.as_slice()])
    }

    /// All three discovery paths, unioned by docket id.
    pub async fn collect_docket_ids(
        &self,
        hits: &[SearchHit],
        docket_numbers: &[String],
        case_titles: &[String],
    ) -> Vec<u64> {
        let from_hits = docket_ids_from_hits(hits);
        let from_numbers = self.ids_from_docket_numbers(docket_numbers).await;
        let from_titles = self.ids_from_case_titles(case_titles).await;

        let merged = merge_docket_ids([
            from_hits.as_slice(),
            from_numbers.as_slice(),
            from_titles.as_slice(),
        ]);
        info!(
            from_hits = from_hits.len(),
            from_numbers = from_numbers.len(),
            from_titles = from_titles.len(),
            merged = merged.len(),
            "Docket ids collected"
        );
        merged
    }

    // =========================================================================
    // Dockets
    // =========================================================================

    async fn docket(&mut self, id: u64) -> Option<DocketRecord> {
        if let Some(memo) = self.dockets.get(&id) {
            return memo.clone();
        }
        let url = format!("{}/dockets/{id}/", self.api_base);
        let record = self
            .fetch
            .get_json(&url, &Query::new())
            .await
            .map(|json| DocketRecord::from_json(id, &json));
        self.dockets.insert(id, record.clone());
        record
    }

    /// Case summaries for the dockets behind a batch of hits.
    pub async fn build_case_summaries(&mut self, hits: &[SearchHit]) -> Vec<CaseSummary> {
        let ids = docket_ids_from_hits(hits);
        self.summaries_for_ids(&ids).await
    }

    /// One summary per distinct docket id. Dockets that cannot be fetched are skipped.
    pub async fn summaries_for_ids(&mut self, ids: &[u64]) -> Vec<CaseSummary> {
        let ids = merge_docket_ids([ids]);
        let mut summaries = Vec::with_capacity(ids.len());

        for id in ids {
            let Some(docket) = self.docket(id).await else {
                debug!(docket_id = id, "Docket unavailable, no summary");
                continue;
            };

            let court_short_name = self
                .courts
                .short_name(self.fetch, &docket.court, &self.site, &self.api_base)
                .await;
            let complaint = ComplaintResolver::new(self.fetch, &self.api_base, &self.site)
                .resolve_complaint(id)
                .await
                .into_reference();

            let risk_text = format!(
                "{} {} {} {}",
                docket.case_name,
                docket.cause,
                docket.nature_of_suit,
                complaint.as_ref().map(|c| c.description.as_str()).unwrap_or_default()
            );
            let risk_score = text_scanner::risk_score(&risk_text);

            summaries.push(CaseSummary {
                status: docket.status(),
                court_short_name,
                complaint,
                risk_score,
                docket,
            });
        }

        info!(summaries = summaries.len(), courts_cached = self.courts.len(), "Case summaries built");
        summaries
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Complaint documents for the dockets behind a batch of hits.
    pub async fn build_documents(&mut self, hits: &[SearchHit]) -> Vec<DocumentRecord> {
        let ids = docket_ids_from_hits(hits);
        self.documents_for_ids(&ids).await
    }

    /// Complaint-like RECAP documents filed inside the window, with text
    /// extracted from their PDFs where we can get it.
    pub async fn documents_for_ids(&mut self, ids: &[u64]) -> Vec<DocumentRecord> {
        let ids = merge_docket_ids([ids]);
        let mut documents = Vec::new();
        let mut seen = HashSet::new();

        for id in ids {
            let docket = match self.docket(id).await {
                Some(d) => d,
                None => DocketRecord::from_json(id, &Value::Null),
            };

            let url = format!("{}/recap-documents/", self.api_base);
            let raw_docs = collect_pages(self.fetch, &url, vec![("docket", id.to_string())]).await;

            for raw in &raw_docs {
                let description = str_field(raw, "description").unwrap_or_default();
                if !text_scanner::is_complaint_like(&description) {
                    continue;
                }
                let date_filed = str_field(raw, "date_filed").map(|d| date_part(&d));
                if !within_lookback(date_filed.as_deref(), self.today, self.lookback_days) {
                    continue;
                }

                let document = self.document(&docket, raw, description, date_filed).await;
                if seen.insert(document.identity()) {
                    documents.push(document);
                }
            }
        }

        info!(documents = documents.len(), "Complaint documents built");
        documents
    }

    async fn document(
        &self,
        docket: &DocketRecord,
        raw: &Value,
        description: String,
        date_filed: Option<String>,
    ) -> DocumentRecord {
        let pdf_url = str_field(raw, "filepath_local").map(|p| absolute_url(&p));

        let extracted = match &pdf_url {
            Some(url) => match self.fetch.get_bytes(url).await {
                Some(bytes) => text_scanner::pdf_text(&bytes, text_scanner::PDF_TEXT_LIMIT)
                    .map(|text| text_scanner::extract_fields(&text))
                    .unwrap_or_default(),
                None => Default::default(),
            },
            None => Default::default(),
        };

        DocumentRecord {
            docket_id: docket.id,
            docket_number: docket.docket_number.clone(),
            case_name: docket.case_name.clone(),
            court: docket.court.clone(),
            date_filed,
            document_number: str_field(raw, "document_number").unwrap_or_default(),
            description,
            document_url: str_field(raw, "absolute_url").map(|p| absolute_url(&p)),
            pdf_url,
            extracted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeRecords;
    use serde_json::json;

    const API: &str = "https://cl.test/api/rest/v4";
    const SITE: &str = "https://cl.test";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn search_query(q: &str, page_size: u32) -> Query {
        vec![
            ("q", q.to_string()),
            ("type", "r".to_string()),
            ("page_size", page_size.to_string()),
        ]
    }

    fn docket_json(number: &str, name: &str) -> Value {
        json!({
            "case_name": name,
            "docket_number": number,
            "court": "cand",
            "date_filed": "2024-06-01",
            "cause": "17:501 Copyright Infringement",
            "nature_of_suit": "820 Copyright"
        })
    }

    fn aggregator(fake: &FakeRecords) -> CaseAggregator<'_> {
        CaseAggregator::new(fake, CourtCache::new(16), API, SITE, 3, today())
    }

    #[test]
    fn test_lookback_boundaries() {
        let today = today();
        assert!(within_lookback(Some("2024-06-07"), today, 3));
        assert!(within_lookback(Some("2024-06-07T23:59:00Z"), today, 3));
        assert!(!within_lookback(Some("2024-06-06"), today, 3));
        assert!(within_lookback(Some("sometime last week"), today, 3));
        assert!(within_lookback(None, today, 3));
    }

    #[test]
    fn test_huge_window_keeps_everything_instead_of_overflowing() {
        let today = today();
        assert!(within_lookback(Some("2024-06-01"), today, 1_000_000_000));
        assert!(within_lookback(Some("1900-01-01"), today, i64::MAX));
    }

    #[test]
    fn test_docket_id_extraction() {
        assert_eq!(docket_id_from_hit(&SearchHit(json!({"docket_id": 555}))), Some(555));
        assert_eq!(docket_id_from_hit(&SearchHit(json!({"docketId": 12}))), Some(12));
        assert_eq!(
            docket_id_from_hit(&SearchHit(json!({"docket": "https://cl.test/api/rest/v4/dockets/42/"}))),
            Some(42)
        );
        assert_eq!(
            docket_id_from_hit(&SearchHit(json!({"absolute_url": "/docket/77/doe-v-model/"}))),
            Some(77)
        );
        assert_eq!(docket_id_from_hit(&SearchHit(json!({"caseName": "No id"}))), None);
    }

    #[test]
    fn test_hits_without_id_are_dropped() {
        let hits = vec![
            SearchHit(json!({"caseName": "Ghost"})),
            SearchHit(json!({"docket_id": 9})),
            SearchHit(json!({"docket_id": 9, "caseName": "Again"})),
        ];
        assert_eq!(docket_ids_from_hits(&hits), vec![9]);
    }

    #[test]
    fn test_merge_keeps_first_seen_order() {
        assert_eq!(merge_docket_ids([&[3u64, 1][..], &[1, 2][..], &[3][..]]), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_docket_seen_by_two_queries_is_resolved_once() {
        let fake = FakeRecords::new()
            .with_json(
                &format!("{API}/search/"),
                search_query("q1", 20),
                json!({"results": [{"docket_id": 555, "absolute_url": "/docket/555/a/", "caseName": "A"}]}),
            )
            .with_json(
                &format!("{API}/search/"),
                search_query("q2", 20),
                json!({"results": [{"docket_id": 555, "absolute_url": "/docket/555/a/entry-3/", "caseName": "A"}]}),
            )
            .with_json(&format!("{API}/dockets/555/"), vec![], docket_json("3:24-cv-01234", "Doe v. Model"));

        let mut agg = aggregator(&fake);
        let hits = agg.search_all(&["q1", "q2"]).await;
        assert_eq!(hits.len(), 2);

        let summaries = agg.build_case_summaries(&hits).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(fake.calls_matching("/dockets/555/"), 1);
        assert_eq!(fake.calls_matching("docket=555&page_size=100"), 1);

        // Documents reuse the memoized docket.
        let _ = agg.build_documents(&hits).await;
        assert_eq!(fake.calls_matching("/dockets/555/"), 1);
    }

    #[tokio::test]
    async fn test_three_paths_yield_one_summary_per_docket() {
        let fake = FakeRecords::new()
            .with_json(
                &format!("{API}/dockets/"),
                vec![("docket_number", "3:24-cv-01234".to_string())],
                json!({"results": [{"id": 555}, {"id": 556}]}),
            )
            .with_json(
                &format!("{API}/search/"),
                search_query("Doe v. Model", TITLE_SEARCH_RESULTS),
                json!({"results": [{"absolute_url": "/docket/556/doe-v-model/", "dateFiled": "2024-01-05"}]}),
            )
            .with_json(&format!("{API}/dockets/555/"), vec![], docket_json("3:24-cv-01234", "Doe v. Model"))
            .with_json(&format!("{API}/dockets/556/"), vec![], docket_json("3:24-cv-01234", "Doe v. Model (related)"));

        let mut agg = aggregator(&fake);
        let hits = vec![SearchHit(json!({"docket_id": 555}))];
        let ids = agg
            .collect_docket_ids(&hits, &["3:24-cv-01234".to_string()], &["Doe v. Model".to_string()])
            .await;
        assert_eq!(ids, vec![555, 556]);

        let summaries = agg.summaries_for_ids(&ids).await;
        let mut seen: Vec<u64> = summaries.iter().map(CaseSummary::docket_id).collect();
        seen.dedup();
        assert_eq!(seen, vec![555, 556]);
    }

    #[tokio::test]
    async fn test_summary_fields_and_risk() {
        let fake = FakeRecords::new()
            .with_json(&format!("{API}/dockets/7/"), vec![], docket_json("1:24-cv-00007", "Authors Guild v. Model Co"))
            .with_json(&format!("{API}/courts/cand/"), vec![], json!({"short_name": "N.D. Cal."}));

        let mut agg = aggregator(&fake);
        let summaries = agg.summaries_for_ids(&[7, 7]).await;
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.court_short_name, "N.D. Cal.");
        assert!(summary.complaint.is_none());
        assert_eq!(summary.status.to_string(), "pending");
        // copyright group only
        assert_eq!(summary.risk_score, 20);
    }

    #[tokio::test]
    async fn test_documents_filtered_by_kind_and_date() {
        let fake = FakeRecords::new()
            .with_json(&format!("{API}/dockets/5/"), vec![], docket_json("2:24-cv-00005", "Roe v. Crawler"))
            .with_json(
                &format!("{API}/recap-documents/"),
                vec![("docket", "5".to_string())],
                json!({"results": [
                    {"description": "COMPLAINT", "date_filed": "2024-06-08", "document_number": "1",
                     "filepath_local": "recap/gov.uscourts.cand.5/gov.uscourts.cand.5.1.0.pdf",
                     "absolute_url": "/docket/5/1/roe-v-crawler/"},
                    {"description": "ORDER granting stay", "date_filed": "2024-06-09", "document_number": "4"},
                    {"description": "COMPLAINT (earlier draft)", "date_filed": "2024-05-01", "document_number": "0"},
                    {"description": "COMPLAINT", "date_filed": "2024-06-08", "document_number": "1",
                     "filepath_local": "recap/gov.uscourts.cand.5/gov.uscourts.cand.5.1.0.pdf",
                     "absolute_url": "/docket/5/1/roe-v-crawler/"}
                ]}),
            );

        let mut agg = aggregator(&fake);
        let docs = agg.documents_for_ids(&[5]).await;
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.case_name, "Roe v. Crawler");
        assert_eq!(doc.document_number, "1");
        assert_eq!(
            doc.pdf_url.as_deref(),
            Some("https://storage.courtlistener.com/recap/gov.uscourts.cand.5/gov.uscourts.cand.5.1.0.pdf")
        );
        assert_eq!(doc.document_url.as_deref(), Some("https://www.courtlistener.com/docket/5/1/roe-v-crawler/"));
        assert!(doc.extracted.causes.is_empty());
    }
}
