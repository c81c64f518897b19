// =============================================================================
// models.rs -- THE SACRED DATA STRUCTURES OF LITIGATION
// =============================================================================
//
// Everything the engine knows about a lawsuit passes through these types.
// Search hits come in as raw JSON and leave as dockets; dockets pick up a
// complaint, a status, and a risk score on the way to the report.
//
// The docket id is the one true key. Three discovery paths can find the same
// docket and they all collapse onto that integer.
// =============================================================================

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for "the API did not tell us".
pub const UNKNOWN: &str = "unknown";

/// A raw hit from the CourtListener search endpoint. We never trust its
/// shape; every accessor tolerates missing or oddly-typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit(pub Value);

impl SearchHit {
    /// String field, trimmed, empty treated as absent.
    pub fn str_field(&self, key: &str) -> Option<String> {
        str_field(&self.0, key)
    }

    /// The hit's filing date in whatever casing the endpoint used this week.
    pub fn date_filed(&self) -> Option<String> {
        self.str_field("dateFiled").or_else(|| self.str_field("date_filed"))
    }

    /// Key used to drop identical hits returned by overlapping queries.
    pub fn dedup_key(&self) -> String {
        let url = self
            .str_field("absolute_url")
            .or_else(|| self.str_field("url"))
            .unwrap_or_default();
        let name = self
            .str_field("caseName")
            .or_else(|| self.str_field("title"))
            .unwrap_or_default();
        format!("{url}|{name}")
    }
}

/// Read a JSON value as a trimmed string. Numbers are stringified because
/// CourtListener is not consistent about which ids are strings.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First ten characters of a date-ish string: `2024-05-01T10:00:00Z` -> `2024-05-01`.
pub fn date_part(raw: &str) -> String {
    raw.get(..10).unwrap_or(raw).to_string()
}

/// One court docket, as returned by `dockets/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocketRecord {
    pub id: u64,
    pub case_name: String,
    pub docket_number: String,
    /// Court as the API gave it: usually the court resource URL.
    pub court: String,
    pub date_filed: Option<String>,
    pub date_terminated: Option<String>,
    pub judge: String,
    pub magistrate: String,
    pub nature_of_suit: String,
    pub cause: String,
    pub parties: String,
    pub last_modified: String,
}

impl DocketRecord {
    /// Build a record from the docket JSON. Each display field walks the same
    /// fallback chain the API has historically used for it.
    pub fn from_json(id: u64, json: &Value) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| str_field(json, k))
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        let date = |key: &str| str_field(json, key).map(|d| date_part(&d));

        DocketRecord {
            id,
            case_name: first(&["case_name"]),
            docket_number: first(&["docket_number"]),
            court: first(&["court"]),
            date_filed: date("date_filed"),
            date_terminated: date("date_terminated"),
            judge: first(&["assigned_to_str", "assigned_to"]),
            magistrate: first(&["referred_to_str", "referred_to"]),
            nature_of_suit: first(&["nature_of_suit", "nature_of_suit_display", "nos"]),
            cause: first(&["cause", "cause_of_action"]),
            parties: first(&["party_summary"]),
            last_modified: date("date_modified")
                .or_else(|| date("date_last_filing"))
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    pub fn status(&self) -> CaseStatus {
        match (&self.date_terminated, &self.date_filed) {
            (Some(ended), _) => CaseStatus::Terminated(ended.clone()),
            (None, Some(_)) => CaseStatus::Pending,
            (None, None) => CaseStatus::Unknown,
        }
    }

    /// Public docket page on the CourtListener site.
    pub fn page_url(&self, site: &str) -> String {
        format!("{site}/docket/{}/", self.id)
    }
}

/// Where a case stands, derived from the docket dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CaseStatus {
    Terminated(String),
    Pending,
    Unknown,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Terminated(date) => write!(f, "terminated ({date})"),
            CaseStatus::Pending => write!(f, "pending"),
            CaseStatus::Unknown => write!(f, "{UNKNOWN}"),
        }
    }
}

/// Which flavour of complaint we are looking at.
///
/// Detection is keyword precedence, checked top to bottom, so
/// "second amended" wins over plain "amended".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmendmentType {
    Original,
    Amended,
    SecondAmended,
    ThirdAmended,
    ClassAction,
    Petition,
}

impl AmendmentType {
    /// Ordered precedence table. First hit wins.
    const PRECEDENCE: &'static [(&'static str, AmendmentType)] = &[
        ("second amended", AmendmentType::SecondAmended),
        ("third amended", AmendmentType::ThirdAmended),
        ("amended", AmendmentType::Amended),
        ("class action", AmendmentType::ClassAction),
        ("petition", AmendmentType::Petition),
    ];

    pub fn detect(description: &str) -> Self {
        let lower = description.to_lowercase();
        Self::PRECEDENCE
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(AmendmentType::Original)
    }
}

impl fmt::Display for AmendmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmendmentType::Original => write!(f, "Original"),
            AmendmentType::Amended => write!(f, "Amended"),
            AmendmentType::SecondAmended => write!(f, "Second Amended"),
            AmendmentType::ThirdAmended => write!(f, "Third Amended"),
            AmendmentType::ClassAction => write!(f, "Class Action"),
            AmendmentType::Petition => write!(f, "Petition"),
        }
    }
}

/// Which rung of the fallback ladder produced the complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionTier {
    /// `recap-documents/?docket_entry=` returned a file.
    PrimaryDocument,
    /// The docket-entries payload itself carried the document (or at least
    /// told us which entry is the complaint).
    DocketEntries,
    /// Scraped a PDF link out of the public docket HTML.
    HtmlFallback,
}

impl ResolutionTier {
    /// Order in which link resolution strategies are tried.
    pub const ORDER: [ResolutionTier; 3] = [
        ResolutionTier::PrimaryDocument,
        ResolutionTier::DocketEntries,
        ResolutionTier::HtmlFallback,
    ];
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionTier::PrimaryDocument => write!(f, "primary-api"),
            ResolutionTier::DocketEntries => write!(f, "docket-entries"),
            ResolutionTier::HtmlFallback => write!(f, "html-fallback"),
        }
    }
}

/// The operative filing for a docket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplaintReference {
    pub document_number: Option<String>,
    pub description: String,
    /// `None` when only the HTML page gave us a link and no entry told us what it was.
    pub amendment: Option<AmendmentType>,
    pub link: Option<String>,
    pub tier: ResolutionTier,
}

/// Result of running the discovery chain for one docket.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Found(ComplaintReference),
    NotFound,
}

impl ResolutionOutcome {
    pub fn into_reference(self) -> Option<ComplaintReference> {
        match self {
            ResolutionOutcome::Found(reference) => Some(reference),
            ResolutionOutcome::NotFound => None,
        }
    }
}

/// Fields the extraction adapter pulls out of complaint text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub plaintiff: Option<String>,
    pub defendant: Option<String>,
    pub causes: Vec<String>,
    pub ai_snippet: Option<String>,
}

/// A complaint-like RECAP document, enriched with extracted fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub docket_id: u64,
    pub docket_number: String,
    pub case_name: String,
    pub court: String,
    pub date_filed: Option<String>,
    pub document_number: String,
    pub description: String,
    pub document_url: Option<String>,
    pub pdf_url: Option<String>,
    pub extracted: ExtractedFields,
}

impl DocumentRecord {
    /// Identity of a document across fallback attempts.
    pub fn identity(&self) -> (u64, String, Option<String>, Option<String>) {
        (
            self.docket_id,
            self.document_number.clone(),
            self.date_filed.clone(),
            self.document_url.clone(),
        )
    }

    /// Link shown in the report: the RECAP page if we have it, else the PDF.
    pub fn display_link(&self) -> Option<&str> {
        self.document_url.as_deref().or(self.pdf_url.as_deref())
    }
}

/// One row of the cases table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSummary {
    pub docket: DocketRecord,
    pub court_short_name: String,
    pub complaint: Option<ComplaintReference>,
    pub status: CaseStatus,
    pub risk_score: u8,
}

impl CaseSummary {
    pub fn docket_id(&self) -> u64 {
        self.docket.id
    }
}

/// An article as the news feed hands it to us.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
}

/// A lawsuit as reconstructed from news coverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lawsuit {
    /// `YYYY-MM-DD` of the most recent article about it.
    pub update_date: String,
    pub case_title: String,
    pub article_title: String,
    pub case_number: String,
    pub reason: String,
    pub article_urls: BTreeSet<String>,
}

impl Lawsuit {
    pub fn merge_key(&self) -> (String, String, String) {
        (
            self.case_number.clone(),
            self.case_title.clone(),
            self.article_title.clone(),
        )
    }

    /// Fold another sighting of the same lawsuit into this one.
    pub fn absorb(&mut self, other: Lawsuit) {
        self.article_urls.extend(other.article_urls);
        if other.update_date > self.update_date {
            self.update_date = other.update_date;
        }
    }

    pub fn has_case_number(&self) -> bool {
        self.case_number != UNKNOWN
    }

    pub fn has_case_title(&self) -> bool {
        self.case_title != UNKNOWN
    }

    /// What the report shows as the title: the caption, the headline, or both.
    pub fn display_title(&self) -> String {
        if self.has_case_title() && self.article_title != self.case_title {
            format!("{} / {}", self.case_title, self.article_title)
        } else if self.has_case_title() {
            self.case_title.clone()
        } else {
            self.article_title.clone()
        }
    }

    /// The first article URL. Used as the row's identity in the report.
    pub fn primary_url(&self) -> Option<&str> {
        self.article_urls.iter().next().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_second_amended_outranks_amended() {
        assert_eq!(
            AmendmentType::detect("SECOND AMENDED COMPLAINT against OpenAI"),
            AmendmentType::SecondAmended
        );
        assert_eq!(
            AmendmentType::detect("Third Amended Class Action Complaint"),
            AmendmentType::ThirdAmended
        );
        assert_eq!(AmendmentType::detect("Amended Complaint"), AmendmentType::Amended);
        assert_eq!(
            AmendmentType::detect("CLASS ACTION COMPLAINT"),
            AmendmentType::ClassAction
        );
        assert_eq!(AmendmentType::detect("Petition to compel"), AmendmentType::Petition);
        assert_eq!(AmendmentType::detect("COMPLAINT"), AmendmentType::Original);
    }

    #[test]
    fn test_docket_field_fallbacks() {
        let json = json!({
            "case_name": "Authors Guild v. Model Co.",
            "docket_number": "3:24-cv-01234",
            "court": "https://www.courtlistener.com/api/rest/v4/courts/cand/",
            "date_filed": "2024-03-01",
            "assigned_to": "Judge Alsup",
            "nature_of_suit_display": "820 Copyright",
            "cause_of_action": "17:501 Copyright Infringement",
            "date_last_filing": "2024-03-05T12:00:00Z",
        });
        let docket = DocketRecord::from_json(555, &json);
        assert_eq!(docket.judge, "Judge Alsup");
        assert_eq!(docket.magistrate, UNKNOWN);
        assert_eq!(docket.nature_of_suit, "820 Copyright");
        assert_eq!(docket.cause, "17:501 Copyright Infringement");
        assert_eq!(docket.last_modified, "2024-03-05");
        assert_eq!(docket.status(), CaseStatus::Pending);
    }

    #[test]
    fn test_status_derivation() {
        let mut docket = DocketRecord::from_json(1, &json!({"date_terminated": "2024-09-09"}));
        assert_eq!(docket.status().to_string(), "terminated (2024-09-09)");
        docket.date_terminated = None;
        assert_eq!(docket.status(), CaseStatus::Unknown);
    }

    #[test]
    fn test_lawsuit_absorb_unions_urls_and_keeps_latest_date() {
        let mut a = Lawsuit {
            update_date: "2024-05-01".into(),
            case_title: "A v. B".into(),
            article_title: "Headline".into(),
            case_number: UNKNOWN.into(),
            reason: "r".into(),
            article_urls: ["https://a.test/1".to_string()].into_iter().collect(),
        };
        let mut b = a.clone();
        b.update_date = "2024-05-03".into();
        b.article_urls = ["https://a.test/2".to_string()].into_iter().collect();
        a.absorb(b);
        assert_eq!(a.update_date, "2024-05-03");
        assert_eq!(a.article_urls.len(), 2);
    }
}
