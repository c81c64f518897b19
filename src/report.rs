// =============================================================================
// report.rs -- THE MARKDOWN PRINTING PRESS
// =============================================================================
//
// Turns one run's collections into the Markdown comment we post. The layout
// matters more than it looks: next run, the dedup engine parses these very
// tables back out of the ticket, so the section headings and identity
// columns are a storage format, not decoration.
//
// GitHub tables break on a bare `|` or a newline inside a cell, so every
// cell goes through `escape_cell`.
//
// Article Links list each address once, without tracking query strings.
// Google News redirect links are dropped; the publisher URL stands in.
// =============================================================================

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::dedup::TrackedSection;
use crate::models::{CaseSummary, DocumentRecord, Lawsuit, UNKNOWN};

/// At most this many cases are rendered, newest first.
pub const MAX_CASES: usize = 25;
/// At most this many documents are rendered, newest first.
pub const MAX_DOCUMENTS: usize = 20;

const DOCUMENTS_HEADING: &str = "## 📄 Documents";
const ARTICLE_LINKS_HEADING: &str = "## 🔗 Article Links";

const NEWS_COLUMNS: &[&str] = &["No.", "Date", "Title", "Case Number", "Case Title", "Reason"];
const CASE_COLUMNS: &[&str] = &[
    "No.",
    "Filed",
    "Status",
    "Case Name",
    "Docket Number",
    "Court",
    "Judge",
    "Magistrate",
    "Nature of Suit",
    "Cause",
    "Complaint #",
    "Complaint",
    "Type",
    "Risk",
];
const DOCUMENT_COLUMNS: &[&str] = &[
    "No.",
    "Filed",
    "Case Name",
    "Docket Number",
    "Court",
    "Plaintiff",
    "Defendant",
    "Causes",
    "AI Snippet",
    "Document",
];

/// What the renderer needs besides the collections.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub run_at: DateTime<FixedOffset>,
    pub lookback_days: i64,
    /// CourtListener site root, for docket page links.
    pub site: String,
}

/// Escape a value for a Markdown table cell.
pub fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', "<br>").trim().to_string()
}

fn link(label: &str, url: Option<&str>) -> String {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => format!("[{}]({url})", escape_cell(label)),
        None => escape_cell(label),
    }
}

fn or_unknown(value: Option<&str>) -> String {
    escape_cell(value.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN))
}

fn header(columns: &[&str]) -> [String; 2] {
    [
        format!("| {} |", columns.join(" | ")),
        format!("|{}", "---|".repeat(columns.len())),
    ]
}

fn row(cells: Vec<String>) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Offset label like `UTC+9` or `UTC-5`.
pub fn utc_label(run_at: &DateTime<FixedOffset>) -> String {
    let seconds = run_at.offset().local_minus_utc();
    if seconds % 3600 == 0 {
        format!("UTC{:+}", seconds / 3600)
    } else {
        format!("UTC{:+}:{:02}", seconds / 3600, (seconds.abs() % 3600) / 60)
    }
}

/// Cases newest first, capped.
pub fn ordered_cases(cases: &[CaseSummary]) -> Vec<&CaseSummary> {
    let mut ordered: Vec<&CaseSummary> = cases.iter().collect();
    ordered.sort_by(|a, b| b.docket.date_filed.cmp(&a.docket.date_filed));
    ordered.truncate(MAX_CASES);
    ordered
}

/// Documents collapsed per (docket, date, document number), newest first, capped.
pub fn ordered_documents(documents: &[DocumentRecord]) -> Vec<&DocumentRecord> {
    let mut seen = HashSet::new();
    let mut ordered: Vec<&DocumentRecord> = documents
        .iter()
        .filter(|d| seen.insert((d.docket_id, d.date_filed.clone(), d.document_number.clone())))
        .collect();
    ordered.sort_by(|a, b| b.date_filed.cmp(&a.date_filed));
    ordered.truncate(MAX_DOCUMENTS);
    ordered
}

fn render_news(lines: &mut Vec<String>, lawsuits: &[Lawsuit]) {
    lines.push(TrackedSection::News.heading().to_string());
    if lawsuits.is_empty() {
        lines.push("No litigation news in range.".to_string());
        lines.push(String::new());
        return;
    }
    lines.extend(header(NEWS_COLUMNS));
    for (n, lawsuit) in lawsuits.iter().enumerate() {
        lines.push(row(vec![
            (n + 1).to_string(),
            escape_cell(&lawsuit.update_date),
            link(&lawsuit.display_title(), lawsuit.primary_url()),
            escape_cell(&lawsuit.case_number),
            escape_cell(&lawsuit.case_title),
            escape_cell(&lawsuit.reason),
        ]));
    }
    lines.push(String::new());
}

fn render_cases(lines: &mut Vec<String>, cases: &[CaseSummary], site: &str) {
    lines.push(TrackedSection::Cases.heading().to_string());
    if cases.is_empty() {
        lines.push("No RECAP dockets found in range.".to_string());
        lines.push(String::new());
        return;
    }
    lines.extend(header(CASE_COLUMNS));
    for (n, case) in ordered_cases(cases).into_iter().enumerate() {
        let docket = &case.docket;
        let complaint = case.complaint.as_ref();
        let docket_page = docket.page_url(site);
        lines.push(row(vec![
            (n + 1).to_string(),
            or_unknown(docket.date_filed.as_deref()),
            escape_cell(&case.status.to_string()),
            link(&docket.case_name, Some(docket_page.as_str())),
            escape_cell(&docket.docket_number),
            escape_cell(&case.court_short_name),
            escape_cell(&docket.judge),
            escape_cell(&docket.magistrate),
            escape_cell(&docket.nature_of_suit),
            escape_cell(&docket.cause),
            or_unknown(complaint.and_then(|c| c.document_number.as_deref())),
            match complaint.and_then(|c| c.link.as_deref()) {
                Some(url) => link("Complaint", Some(url)),
                None => UNKNOWN.to_string(),
            },
            match complaint.and_then(|c| c.amendment) {
                Some(kind) => kind.to_string(),
                None => UNKNOWN.to_string(),
            },
            case.risk_score.to_string(),
        ]));
    }
    lines.push(String::new());
}

fn render_documents(lines: &mut Vec<String>, documents: &[DocumentRecord], cases: &[CaseSummary]) {
    lines.push(DOCUMENTS_HEADING.to_string());
    if documents.is_empty() {
        lines.push("No RECAP complaints found in range.".to_string());
        lines.push(String::new());
        return;
    }

    let courts: HashMap<u64, &str> = cases
        .iter()
        .map(|c| (c.docket_id(), c.court_short_name.as_str()))
        .collect();

    lines.extend(header(DOCUMENT_COLUMNS));
    for (n, doc) in ordered_documents(documents).into_iter().enumerate() {
        let causes = if doc.extracted.causes.is_empty() {
            UNKNOWN.to_string()
        } else {
            doc.extracted.causes.join(", ")
        };
        lines.push(row(vec![
            (n + 1).to_string(),
            or_unknown(doc.date_filed.as_deref()),
            escape_cell(&doc.case_name),
            escape_cell(&doc.docket_number),
            escape_cell(courts.get(&doc.docket_id).copied().unwrap_or(doc.court.as_str())),
            or_unknown(doc.extracted.plaintiff.as_deref()),
            or_unknown(doc.extracted.defendant.as_deref()),
            escape_cell(&causes),
            escape_cell(doc.extracted.ai_snippet.as_deref().unwrap_or_default()),
            link("Document", doc.display_link()),
        ]));
    }
    lines.push(String::new());
}

fn render_article_links(lines: &mut Vec<String>, lawsuits: &[Lawsuit]) {
    lines.push(ARTICLE_LINKS_HEADING.to_string());
    if lawsuits.is_empty() {
        lines.push("- (no articles)".to_string());
        return;
    }
    let mut seen = HashSet::new();
    for lawsuit in lawsuits {
        lines.push(format!(
            "### {} ({})",
            escape_cell(&lawsuit.display_title()),
            escape_cell(&lawsuit.case_number)
        ));
        lines.extend(
            lawsuit
                .article_urls
                .iter()
                .filter_map(|u| canonical_article_url(u))
                .filter(|u| seen.insert(u.clone()))
                .map(|u| format!("- {u}")),
        );
        lines.push(String::new());
    }
}

/// The address an article link is listed under, or `None` for feed
/// redirect links. Query and fragment are dropped. Unparseable values pass
/// through trimmed.
pub fn canonical_article_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let Ok(mut url) = Url::parse(raw) else {
        return Some(raw.to_string());
    };
    if url.host_str() == Some("news.google.com") && url.path().starts_with("/rss") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Render the full report for one run.
pub fn render_report(
    ctx: &ReportContext,
    lawsuits: &[Lawsuit],
    cases: &[CaseSummary],
    documents: &[DocumentRecord],
) -> String {
    let mut lines = vec![
        format!(
            "### Run at ({}): {}",
            utc_label(&ctx.run_at),
            ctx.run_at.format("%Y-%m-%d %H:%M")
        ),
        String::new(),
        format!("## AI training-data lawsuits: last {} days", ctx.lookback_days),
        format!("- News-derived lawsuits: {}", lawsuits.len()),
        format!("- Court dockets (RECAP): {}", cases.len()),
        format!("- Court documents (RECAP complaints): {}", documents.len()),
        String::new(),
    ];

    render_news(&mut lines, lawsuits);
    render_cases(&mut lines, cases, ctx.site.trim_end_matches('/'));
    render_documents(&mut lines, documents, cases);
    render_article_links(&mut lines, lawsuits);

    lines.join("\n")
}
