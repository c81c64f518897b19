// =============================================================================
// dedup.rs -- THE MARKDOWN MEMORY PALACE
// =============================================================================
//
// We have no database. We have an issue tracker, and every run posts a
// Markdown report as a comment. So the comments ARE the database.
//
// Every run re-reads every earlier report on the ticket, pulls the identity
// columns out of its tables, and builds a snapshot index:
//
//   * News  -> the article URL inside the Title cell's Markdown link
//   * Cases -> the Docket Number cell, verbatim
//
// Then the current report is rewritten against that index. A row we have
// seen before (in any earlier comment, or higher up in the same table) keeps
// its identity cell and gets every other cell replaced by `skip`. A row we
// have never seen stays exactly as rendered. The `No.` column is renumbered
// and a short summary goes on top.
//
// Rows that do not have the header's column count are garbage. Garbage never
// enters the index and never gets re-emitted.
//
// The index only grows. Rebuilt from scratch every run, from ALL history,
// so a key reported once is never "new" again on the same ticket.
// =============================================================================

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::text_scanner::truncate_chars;

/// Placeholder written over the non-identity cells of a repeated row.
pub const SKIP: &str = "skip";

static MARKDOWN_LINK_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((https?://[^)]+)\)").expect("markdown link regex"));

/// The two report sections that carry identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedSection {
    News,
    Cases,
}

impl TrackedSection {
    pub const ALL: [TrackedSection; 2] = [TrackedSection::News, TrackedSection::Cases];

    pub fn heading(self) -> &'static str {
        match self {
            TrackedSection::News => "## 📰 News",
            TrackedSection::Cases => "## ⚖️ Cases",
        }
    }

    pub fn identity_column(self) -> &'static str {
        match self {
            TrackedSection::News => "Title",
            TrackedSection::Cases => "Docket Number",
        }
    }

    fn label(self) -> &'static str {
        match self {
            TrackedSection::News => "News",
            TrackedSection::Cases => "Cases",
        }
    }

    /// Identity key of a row, read from its identity cell.
    pub fn identity(self, cell: &str) -> Option<String> {
        match self {
            TrackedSection::News => extract_article_url(cell),
            TrackedSection::Cases => {
                let docket = cell.trim();
                (!docket.is_empty()).then(|| docket.to_string())
            }
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Line range `[start, end)` of a section body: the line after the heading
/// up to (not including) the next line starting with `## `.
fn section_bounds<S: AsRef<str>>(lines: &[S], heading: &str) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| l.as_ref().trim().starts_with(heading))? + 1;
    let end = lines[start..]
        .iter()
        .position(|l| l.as_ref().starts_with("## "))
        .map_or(lines.len(), |offset| start + offset);
    Some((start, end))
}

/// Body text of a section, or the empty string when the heading is absent.
pub fn extract_section(markdown: &str, heading: &str) -> String {
    let lines: Vec<&str> = markdown.split('\n').collect();
    match section_bounds(&lines, heading) {
        Some((start, end)) => lines[start..end].join("\n"),
        None => String::new(),
    }
}

/// Split a table row on unescaped pipes. `\|` stays in the cell as written.
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let bytes = line.as_bytes();
    let mut cells = Vec::new();
    let mut start = 0;

    for pos in memchr::memchr_iter(b'|', bytes) {
        if pos > 0 && bytes[pos - 1] == b'\\' {
            continue;
        }
        cells.push(line[start..pos].trim().to_string());
        start = pos + 1;
    }
    cells.push(line[start..].trim().to_string());

    // Drop whatever sits outside the leading and trailing pipes.
    if cells.len() < 2 {
        return Vec::new();
    }
    cells.pop();
    cells.remove(0);
    cells
}

fn join_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// A parsed Markdown table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub header: Vec<String>,
    pub header_line: String,
    pub separator_line: String,
    /// Rows whose column count matches the header.
    pub rows: Vec<Vec<String>>,
    pub rejected: usize,
}

impl ParsedTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

fn parse_table_lines(lines: &[&str]) -> Option<ParsedTable> {
    let [header_line, separator_line, rows @ ..] = lines else {
        return None;
    };

    let header = split_row(header_line);
    let mut valid = Vec::with_capacity(rows.len());
    let mut rejected = 0;

    for row in rows {
        let cells = split_row(row);
        if cells.len() == header.len() {
            valid.push(cells);
        } else {
            rejected += 1;
            warn!(
                expected = header.len(),
                got = cells.len(),
                row = truncate_chars(row, 100).as_str(),
                "Table row column mismatch, row rejected"
            );
        }
    }

    Some(ParsedTable {
        header,
        header_line: header_line.to_string(),
        separator_line: separator_line.to_string(),
        rows: valid,
        rejected,
    })
}

fn is_table_line(line: &str) -> bool {
    line.trim().starts_with('|')
}

/// Index range of the first contiguous run of table lines.
fn first_table_block<S: AsRef<str>>(lines: &[S]) -> Option<std::ops::Range<usize>> {
    let first = lines.iter().position(|l| is_table_line(l.as_ref()))?;
    let len = lines[first..]
        .iter()
        .take_while(|l| is_table_line(l.as_ref()))
        .count();
    Some(first..first + len)
}

/// Parse the first table in a section body: header line, separator line,
/// then data rows. The table ends at the first line that is not a row.
pub fn parse_table(section: &str) -> Option<ParsedTable> {
    let lines: Vec<&str> = section.split('\n').collect();
    let block = first_table_block(&lines)?;
    parse_table_lines(&lines[block])
}

/// The URL inside a Markdown link cell, minus any `&hl=` tracking suffix.
pub fn extract_article_url(cell: &str) -> Option<String> {
    let cap = MARKDOWN_LINK_URL.captures(cell)?;
    let url = &cap[1];
    let url = url.split("&hl=").next().unwrap_or(url);
    Some(url.to_string())
}

// =============================================================================
// Snapshot index
// =============================================================================

/// Every identity key already published on the ticket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotIndex {
    pub article_urls: HashSet<String>,
    pub docket_numbers: HashSet<String>,
}

impl SnapshotIndex {
    /// Build the index from every historical report body.
    pub fn from_history(history: &[String]) -> Self {
        let mut index = Self::default();
        for body in history {
            index.absorb_report(body);
        }
        debug!(
            comments = history.len(),
            article_urls = index.article_urls.len(),
            docket_numbers = index.docket_numbers.len(),
            "Snapshot index rebuilt"
        );
        index
    }

    /// Add the keys of one report body. Keys are only ever added.
    pub fn absorb_report(&mut self, body: &str) {
        for section in TrackedSection::ALL {
            let Some(table) = parse_table(&extract_section(body, section.heading())) else {
                continue;
            };
            let Some(idx) = table.column(section.identity_column()) else {
                continue;
            };
            let keys = self.keys_mut(section);
            keys.extend(table.rows.iter().filter_map(|row| section.identity(&row[idx])));
        }
    }

    pub fn keys(&self, section: TrackedSection) -> &HashSet<String> {
        match section {
            TrackedSection::News => &self.article_urls,
            TrackedSection::Cases => &self.docket_numbers,
        }
    }

    fn keys_mut(&mut self, section: TrackedSection) -> &mut HashSet<String> {
        match section {
            TrackedSection::News => &mut self.article_urls,
            TrackedSection::Cases => &mut self.docket_numbers,
        }
    }
}

// =============================================================================
// Rewriting
// =============================================================================

/// Counts for one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionTally {
    /// Keys already in the snapshot before this run.
    pub baseline: usize,
    pub duplicates: usize,
    pub new: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome {
    pub report: String,
    pub news: SectionTally,
    pub cases: SectionTally,
}

/// Rewrite one table in place, returning the replacement lines and tally.
fn rewrite_table(
    section: TrackedSection,
    table: ParsedTable,
    index: &SnapshotIndex,
    tally: &mut SectionTally,
) -> Vec<String> {
    let mut out = vec![table.header_line.clone(), table.separator_line.clone()];

    let Some(id_idx) = table.column(section.identity_column()) else {
        out.extend(table.rows.iter().map(|r| join_row(r)));
        return out;
    };
    let no_idx = table.column("No.");
    let known = index.keys(section);
    let mut emitted: HashSet<String> = HashSet::new();

    for (n, mut row) in table.rows.into_iter().enumerate() {
        let key = section.identity(&row[id_idx]);
        let duplicate = match &key {
            Some(k) => known.contains(k) || !emitted.insert(k.clone()),
            None => false,
        };

        if duplicate {
            tally.duplicates += 1;
            debug!(section = section.label(), key = ?key, "Duplicate row marked skip");
            for (i, cell) in row.iter_mut().enumerate() {
                if i != id_idx && Some(i) != no_idx {
                    *cell = SKIP.to_string();
                }
            }
        } else {
            tally.new += 1;
        }

        if let Some(no) = no_idx {
            row[no] = (n + 1).to_string();
        }
        out.push(join_row(&row));
    }

    out
}

fn summary_block(news: &SectionTally, cases: &SectionTally) -> String {
    let line = |label: &str, t: &SectionTally| {
        format!(
            "- {label}: {} baseline, {} dup, {} new",
            t.baseline, t.duplicates, t.new
        )
    };
    format!(
        "### 🔁 Dedup Summary\n{}\n{}\n\n",
        line("News", news),
        line("Cases", cases)
    )
}

/// Rewrite the current report against every earlier report on the ticket.
pub fn apply_deduplication(current: &str, history: &[String]) -> DedupOutcome {
    let index = SnapshotIndex::from_history(history);
    let mut lines: Vec<String> = current.split('\n').map(str::to_string).collect();
    let mut news = SectionTally::default();
    let mut cases = SectionTally::default();

    for section in TrackedSection::ALL {
        let tally = match section {
            TrackedSection::News => &mut news,
            TrackedSection::Cases => &mut cases,
        };
        tally.baseline = index.keys(section).len();

        let Some((start, end)) = section_bounds(&lines, section.heading()) else {
            debug!(section = section.label(), "Section absent, treated as empty");
            continue;
        };
        let Some(block) = first_table_block(&lines[start..end]) else {
            continue;
        };
        let block = start + block.start..start + block.end;

        let table_lines: Vec<&str> = lines[block.clone()].iter().map(String::as_str).collect();
        let Some(table) = parse_table_lines(&table_lines) else {
            continue;
        };

        let rewritten = rewrite_table(section, table, &index, tally);
        lines.splice(block, rewritten);
    }

    info!(
        news_baseline = news.baseline,
        news_dup = news.duplicates,
        news_new = news.new,
        cases_baseline = cases.baseline,
        cases_dup = cases.duplicates,
        cases_new = cases.new,
        "Deduplication applied"
    );

    DedupOutcome {
        report: summary_block(&news, &cases) + &lines.join("\n"),
        news,
        cases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cases_report(rows: &[&str]) -> String {
        let mut md = String::from(
            "## ⚖️ Cases\n| No. | Case Name | Docket Number | Risk |\n|---|---|---|---|\n",
        );
        for row in rows {
            md.push_str(row);
            md.push('\n');
        }
        md.push_str("## 📄 Documents\nnothing here\n");
        md
    }

    fn news_report(rows: &[&str]) -> String {
        let mut md = String::from("## 📰 News\n| No. | Date | Title | Reason |\n|---|---|---|---|\n");
        for row in rows {
            md.push_str(row);
            md.push('\n');
        }
        md
    }

    #[test]
    fn test_split_row_keeps_escaped_pipe() {
        assert_eq!(
            split_row(r"| 1 | Doe \| Roe v. Model | 3:24-cv-01234 |"),
            vec!["1".to_string(), r"Doe \| Roe v. Model".to_string(), "3:24-cv-01234".to_string()]
        );
        assert!(split_row("no pipes here").is_empty());
    }

    #[test]
    fn test_extract_section_stops_at_next_heading() {
        let md = "intro\n## 📰 News\nline a\nline b\n## ⚖️ Cases\ncase";
        assert_eq!(extract_section(md, "## 📰 News"), "line a\nline b");
        assert_eq!(extract_section(md, "## 🔗 Article Links"), "");
    }

    #[test]
    fn test_article_url_tracking_suffix_stripped() {
        assert_eq!(
            extract_article_url("[Authors sue](https://news.test/a?id=7&hl=en-US&gl=US)").as_deref(),
            Some("https://news.test/a?id=7")
        );
        assert_eq!(extract_article_url("plain title"), None);
    }

    #[test]
    fn test_historical_docket_is_marked_duplicate() {
        let history = vec![cases_report(&["| 1 | Doe v. Model | 3:24-cv-01234 | 85 |"])];
        let current = cases_report(&["| 1 | Doe v. Model | 3:24-cv-01234 | 90 |"]);

        let outcome = apply_deduplication(&current, &history);
        assert_eq!(outcome.cases, SectionTally { baseline: 1, duplicates: 1, new: 0 });
        assert!(outcome.report.contains("| 1 | skip | 3:24-cv-01234 | skip |"));
    }

    #[test]
    fn test_second_run_over_same_report_finds_nothing_new() {
        let current = format!(
            "{}{}",
            news_report(&["| 1 | 2024-05-01 | [Authors sue](https://news.test/a&hl=en) | copyright |"]),
            cases_report(&[
                "| 1 | Doe v. Model | 3:24-cv-01234 | 85 |",
                "| 2 | Roe v. Crawler | 1:24-cv-09999 | 40 |",
            ])
        );

        let first = apply_deduplication(&current, &[]);
        assert_eq!(first.news.new, 1);
        assert_eq!(first.cases.new, 2);

        let second = apply_deduplication(&current, &[first.report]);
        assert_eq!(second.news, SectionTally { baseline: 1, duplicates: 1, new: 0 });
        assert_eq!(second.cases, SectionTally { baseline: 2, duplicates: 2, new: 0 });
    }

    #[test]
    fn test_wrong_column_count_row_is_rejected_everywhere() {
        let history = vec![cases_report(&["| 1 | Bad | 9:99-cv-00001 | 10 | extra |"])];
        let index = SnapshotIndex::from_history(&history);
        assert!(index.docket_numbers.is_empty());

        let current = cases_report(&[
            "| 1 | Bad | 9:99-cv-00001 |",
            "| 2 | Good v. Fine | 2:24-cv-00002 | 50 |",
        ]);
        let outcome = apply_deduplication(&current, &history);
        assert!(!outcome.report.contains("9:99-cv-00001"));
        assert!(outcome.report.contains("| 1 | Good v. Fine | 2:24-cv-00002 | 50 |"));
        assert_eq!(outcome.cases.new, 1);
    }

    #[test]
    fn test_escaped_pipe_cell_survives_rewrite() {
        let current = cases_report(&[r"| 1 | A \| B v. C | 4:24-cv-00004 | 30 |"]);
        let table = parse_table(&extract_section(&current, "## ⚖️ Cases")).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rejected, 0);

        let outcome = apply_deduplication(&current, &[]);
        assert!(outcome.report.contains(r"| 1 | A \| B v. C | 4:24-cv-00004 | 30 |"));
    }

    #[test]
    fn test_missing_section_is_empty() {
        let current = cases_report(&["| 1 | Doe v. Model | 3:24-cv-01234 | 85 |"]);
        let outcome = apply_deduplication(&current, &[]);
        assert_eq!(outcome.news, SectionTally::default());
        assert_eq!(outcome.cases.new, 1);
    }

    #[test]
    fn test_renumbering_and_repeats_within_report() {
        let history = vec![cases_report(&["| 1 | Old v. Case | 1:23-cv-00001 | 10 |"])];
        let current = cases_report(&[
            "| 7 | Old v. Case | 1:23-cv-00001 | 10 |",
            "| 9 | New v. Case | 2:24-cv-00002 | 60 |",
            "| 4 | New v. Case again | 2:24-cv-00002 | 60 |",
        ]);

        let outcome = apply_deduplication(&current, &history);
        let expected = "### 🔁 Dedup Summary\n\
                        - News: 0 baseline, 0 dup, 0 new\n\
                        - Cases: 1 baseline, 2 dup, 1 new\n\
                        \n\
                        ## ⚖️ Cases\n\
                        | No. | Case Name | Docket Number | Risk |\n\
                        |---|---|---|---|\n\
                        | 1 | skip | 1:23-cv-00001 | skip |\n\
                        | 2 | New v. Case | 2:24-cv-00002 | 60 |\n\
                        | 3 | skip | 2:24-cv-00002 | skip |\n\
                        ## 📄 Documents\n\
                        nothing here\n";
        assert_eq!(outcome.report, expected);
    }

    #[test]
    fn test_index_only_grows() {
        let mut index = SnapshotIndex::default();
        index.absorb_report(&cases_report(&["| 1 | A | 1:24-cv-00001 | 1 |"]));
        index.absorb_report(&cases_report(&["| 1 | B | 1:24-cv-00002 | 1 |"]));
        index.absorb_report("no tables at all");
        assert_eq!(index.docket_numbers.len(), 2);
    }

    #[test]
    fn test_text_between_tables_survives_rewrite() {
        let current = "## ⚖️ Cases\n\
                       | No. | Case Name | Docket Number | Risk |\n\
                       |---|---|---|---|\n\
                       | 1 | A v. B | 1:24-cv-00001 | 10 |\n\
                       \n\
                       _Note: court feed was slow today._\n\
                       | stray | pipe | line |\n\
                       ## 📄 Documents\n";

        let outcome = apply_deduplication(current, &[]);
        assert!(outcome.report.contains("_Note: court feed was slow today._"));
        assert!(outcome.report.contains("| stray | pipe | line |"));
        assert_eq!(outcome.cases.new, 1);
        assert_eq!(parse_table(current).unwrap().rejected, 0);
    }
}
