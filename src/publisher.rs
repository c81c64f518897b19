// =============================================================================
// publisher.rs -- THE TOWN CRIER
// =============================================================================
//
// Two audiences:
//
// 1. A GitHub issue per day, labelled, where every run appends the
//    deduplicated report as a comment. Yesterday's issue gets a pointer to
//    today's and is closed. The comments double as the dedup engine's
//    memory, so we read them all back before writing.
//
// 2. A Slack channel that gets a three-line summary and a link, because
//    nobody opens GitHub before coffee.
//
// Unlike the records fetcher, failures here are loud. If we cannot write
// the report, the run failed, and the scheduler should say so.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::dedup::{apply_deduplication, DedupOutcome};
use crate::models::DocumentRecord;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_USER_AGENT: &str = "LawsuitRadarEngine/1.0 (issue-publisher)";
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 50;

/// Body of a freshly created daily issue.
const ISSUE_BODY: &str = "Automated reports accumulate as comments on this issue.";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{what}: request failed: {source}")]
    Transport {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{what}: HTTP {status}")]
    Status { what: &'static str, status: u16 },
    #[error("{what}: unreadable response: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// The parts of a GitHub issue we care about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Deserialize)]
struct CommentBody {
    #[serde(default)]
    body: Option<String>,
}

/// A place where reports live as comments on titled, labelled tickets.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn list_open_issues(&self, label: &str) -> Result<Vec<Issue>, PublishError>;
    async fn create_issue(&self, title: &str, label: &str, body: &str) -> Result<Issue, PublishError>;
    /// Every comment body on an issue, oldest first, across all pages.
    async fn list_comments(&self, number: u64) -> Result<Vec<String>, PublishError>;
    async fn create_comment(&self, number: u64, body: &str) -> Result<(), PublishError>;
    async fn close_issue(&self, number: u64) -> Result<(), PublishError>;
}

/// A chat channel that takes plain text.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), PublishError>;
}

// =============================================================================
// GitHub
// =============================================================================

pub struct GithubIssues {
    client: reqwest::Client,
    repo_api: String,
    token: String,
}

impl GithubIssues {
    pub fn new(owner: &str, repo: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(GITHUB_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            repo_api: format!("{GITHUB_API}/repos/{owner}/{repo}"),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &'static str,
    ) -> Result<reqwest::Response, PublishError> {
        let response = request
            .send()
            .await
            .map_err(|source| PublishError::Transport { what, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                what,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &'static str,
    ) -> Result<T, PublishError> {
        self.send(request, what)
            .await?
            .json::<T>()
            .await
            .map_err(|source| PublishError::Decode { what, source })
    }

    /// GET every page of a list endpoint. A short page is the last page.
    async fn paged<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        what: &'static str,
    ) -> Result<Vec<T>, PublishError> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut query = params.to_vec();
            query.push(("per_page", PER_PAGE.to_string()));
            query.push(("page", page.to_string()));

            let batch: Vec<T> = self
                .send_json(self.request(Method::GET, url).query(&query), what)
                .await?;
            let last = batch.len() < PER_PAGE;
            all.extend(batch);
            if last {
                break;
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl TicketStore for GithubIssues {
    async fn list_open_issues(&self, label: &str) -> Result<Vec<Issue>, PublishError> {
        let url = format!("{}/issues", self.repo_api);
        let params = [("state", "open".to_string()), ("labels", label.to_string())];
        self.paged(&url, &params, "list issues").await
    }

    async fn create_issue(&self, title: &str, label: &str, body: &str) -> Result<Issue, PublishError> {
        let url = format!("{}/issues", self.repo_api);
        let payload = json!({"title": title, "body": body, "labels": [label]});
        self.send_json(self.request(Method::POST, &url).json(&payload), "create issue")
            .await
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<String>, PublishError> {
        let url = format!("{}/issues/{number}/comments", self.repo_api);
        let comments: Vec<CommentBody> = self.paged(&url, &[], "list comments").await?;
        Ok(comments.into_iter().map(|c| c.body.unwrap_or_default()).collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), PublishError> {
        let url = format!("{}/issues/{number}/comments", self.repo_api);
        self.send(
            self.request(Method::POST, &url).json(&json!({"body": body})),
            "create comment",
        )
        .await
        .map(|_| ())
    }

    async fn close_issue(&self, number: u64) -> Result<(), PublishError> {
        let url = format!("{}/issues/{number}", self.repo_api);
        self.send(
            self.request(Method::PATCH, &url).json(&json!({"state": "closed"})),
            "close issue",
        )
        .await
        .map(|_| ())
    }
}

// =============================================================================
// Slack
// =============================================================================

pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ChatNotifier for SlackWebhook {
    async fn notify(&self, text: &str) -> Result<(), PublishError> {
        let what = "slack webhook";
        let response = self
            .client
            .post(&self.url)
            .json(&json!({"text": text}))
            .send()
            .await
            .map_err(|source| PublishError::Transport { what, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                what,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Publishing flow
// =============================================================================

/// `"{base} ({date})"`, the shape of a daily issue title.
pub fn daily_title(base: &str, day: &str) -> String {
    format!("{base} ({day})")
}

/// Whether a title looks like one of our daily issues.
pub fn is_daily_title(title: &str, base: &str) -> bool {
    title.starts_with(&format!("{base} (")) && title.ends_with(')')
}

/// The open issue with exactly this title and label, created if missing.
pub async fn find_or_create_issue(
    store: &dyn TicketStore,
    title: &str,
    label: &str,
) -> Result<Issue, PublishError> {
    if let Some(issue) = store
        .list_open_issues(label)
        .await?
        .into_iter()
        .find(|i| i.title == title)
    {
        debug!(issue = issue.number, "Reusing today's issue");
        return Ok(issue);
    }
    let issue = store.create_issue(title, label, ISSUE_BODY).await?;
    info!(issue = issue.number, title = title, "Created daily issue");
    Ok(issue)
}

/// Close every other open daily issue under the label, leaving a pointer
/// to the current one first. Returns the closed issue numbers.
pub async fn close_other_daily_issues(
    store: &dyn TicketStore,
    label: &str,
    base_title: &str,
    current: &Issue,
) -> Result<Vec<u64>, PublishError> {
    let footer = format!(
        "Next report: #{} ({})\n\nThis issue was closed automatically when the next report was created.",
        current.number, current.html_url
    );

    let mut closed = Vec::new();
    for issue in store.list_open_issues(label).await? {
        if issue.number == current.number
            || issue.title == current.title
            || !is_daily_title(&issue.title, base_title)
        {
            continue;
        }
        store.create_comment(issue.number, &footer).await?;
        store.close_issue(issue.number).await?;
        closed.push(issue.number);
    }

    if !closed.is_empty() {
        info!(closed = ?closed, "Closed previous daily issues");
    }
    Ok(closed)
}

/// What one publish did.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedReport {
    pub issue: Issue,
    pub closed: Vec<u64>,
    pub dedup: DedupOutcome,
}

/// Find today's issue, retire older ones, dedup the report against every
/// earlier comment on today's issue, and append it.
pub async fn publish_report(
    store: &dyn TicketStore,
    title: &str,
    base_title: &str,
    label: &str,
    report: &str,
) -> Result<PublishedReport, PublishError> {
    let issue = find_or_create_issue(store, title, label).await?;
    let closed = close_other_daily_issues(store, label, base_title, &issue).await?;

    let history = store.list_comments(issue.number).await?;
    let dedup = apply_deduplication(report, &history);
    store.create_comment(issue.number, &dedup.report).await?;

    info!(
        issue = issue.number,
        history_comments = history.len(),
        news_new = dedup.news.new,
        cases_new = dedup.cases.new,
        "Report published"
    );
    Ok(PublishedReport { issue, closed, dedup })
}

/// Slack text: counts, issue link, the three latest documents.
pub fn chat_summary(
    stamp: &str,
    lawsuits: usize,
    cases: usize,
    documents: &[DocumentRecord],
    issue: &Issue,
) -> String {
    let mut lines = vec![
        format!("*AI lawsuit monitor update* ({stamp})"),
        format!("- News-derived lawsuits: {lawsuits}"),
        format!("- Court dockets (RECAP): {cases}"),
        format!("- Court documents (RECAP complaints): {}", documents.len()),
        format!("- GitHub issue: <{}|#{}>", issue.html_url, issue.number),
    ];

    if !documents.is_empty() {
        let mut latest: Vec<&DocumentRecord> = documents.iter().collect();
        latest.sort_by(|a, b| b.date_filed.cmp(&a.date_filed));
        lines.push("- Latest RECAP documents:".to_string());
        for doc in latest.into_iter().take(3) {
            lines.push(format!(
                "  • {} | {}",
                doc.date_filed.as_deref().unwrap_or("n/a"),
                doc.case_name
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedFields;
    use std::sync::Mutex;

    const BASE: &str = "AI Training Data Lawsuit Monitor";
    const LABEL: &str = "ai-lawsuit-monitor";

    #[derive(Default)]
    struct FakeTickets {
        issues: Mutex<Vec<(Issue, bool)>>,
        comments: Mutex<Vec<(u64, String)>>,
        log: Mutex<Vec<String>>,
    }

    impl FakeTickets {
        fn with_open(titles: &[(u64, &str)]) -> Self {
            let fake = Self::default();
            for (number, title) in titles {
                fake.issues.lock().unwrap().push((issue(*number, title), true));
            }
            fake
        }

        fn comments_on(&self, number: u64) -> Vec<String> {
            self.comments
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| *n == number)
                .map(|(_, b)| b.clone())
                .collect()
        }
    }

    fn issue(number: u64, title: &str) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            html_url: format!("https://github.test/o/r/issues/{number}"),
        }
    }

    #[async_trait]
    impl TicketStore for FakeTickets {
        async fn list_open_issues(&self, _label: &str) -> Result<Vec<Issue>, PublishError> {
            Ok(self
                .issues
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, open)| *open)
                .map(|(i, _)| i.clone())
                .collect())
        }

        async fn create_issue(&self, title: &str, _label: &str, _body: &str) -> Result<Issue, PublishError> {
            let mut issues = self.issues.lock().unwrap();
            let created = issue(issues.len() as u64 + 100, title);
            issues.push((created.clone(), true));
            self.log.lock().unwrap().push(format!("create {title}"));
            Ok(created)
        }

        async fn list_comments(&self, number: u64) -> Result<Vec<String>, PublishError> {
            Ok(self.comments_on(number))
        }

        async fn create_comment(&self, number: u64, body: &str) -> Result<(), PublishError> {
            self.comments.lock().unwrap().push((number, body.to_string()));
            self.log.lock().unwrap().push(format!("comment {number}"));
            Ok(())
        }

        async fn close_issue(&self, number: u64) -> Result<(), PublishError> {
            for (i, open) in self.issues.lock().unwrap().iter_mut() {
                if i.number == number {
                    *open = false;
                }
            }
            self.log.lock().unwrap().push(format!("close {number}"));
            Ok(())
        }
    }

    const REPORT: &str = "## ⚖️ Cases\n\
                          | No. | Case Name | Docket Number |\n\
                          |---|---|---|\n\
                          | 1 | Doe v. Model | 3:24-cv-01234 |\n";

    #[test]
    fn test_daily_title_shape() {
        let title = daily_title(BASE, "2024-06-10");
        assert_eq!(title, "AI Training Data Lawsuit Monitor (2024-06-10)");
        assert!(is_daily_title(&title, BASE));
        assert!(!is_daily_title("AI Training Data Lawsuit Monitor weekly", BASE));
        assert!(!is_daily_title("Something else (2024-06-10)", BASE));
    }

    #[tokio::test]
    async fn test_existing_issue_is_reused() {
        let store = FakeTickets::with_open(&[(7, "AI Training Data Lawsuit Monitor (2024-06-10)")]);
        let found = find_or_create_issue(&store, &daily_title(BASE, "2024-06-10"), LABEL)
            .await
            .unwrap();
        assert_eq!(found.number, 7);
        assert!(store.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_older_daily_issues_get_footer_then_close() {
        let store = FakeTickets::with_open(&[
            (3, "AI Training Data Lawsuit Monitor (2024-06-08)"),
            (4, "AI Training Data Lawsuit Monitor weekly digest"),
            (5, "AI Training Data Lawsuit Monitor (2024-06-10)"),
        ]);
        let current = issue(5, "AI Training Data Lawsuit Monitor (2024-06-10)");

        let closed = close_other_daily_issues(&store, LABEL, BASE, &current).await.unwrap();
        assert_eq!(closed, vec![3]);
        assert_eq!(
            *store.log.lock().unwrap(),
            vec!["comment 3".to_string(), "close 3".to_string()]
        );
        assert!(store.comments_on(3)[0].contains("#5 (https://github.test/o/r/issues/5)"));
    }

    #[tokio::test]
    async fn test_publish_dedups_against_earlier_comments() {
        let store = FakeTickets::default();
        let title = daily_title(BASE, "2024-06-10");

        let first = publish_report(&store, &title, BASE, LABEL, REPORT).await.unwrap();
        assert_eq!(first.dedup.cases.new, 1);

        let second = publish_report(&store, &title, BASE, LABEL, REPORT).await.unwrap();
        assert_eq!(second.issue.number, first.issue.number);
        assert_eq!(second.dedup.cases.new, 0);
        assert_eq!(second.dedup.cases.duplicates, 1);
        assert_eq!(store.comments_on(first.issue.number).len(), 2);
    }

    #[test]
    fn test_chat_summary_lists_three_latest_documents() {
        let doc = |name: &str, date: &str| DocumentRecord {
            docket_id: 1,
            docket_number: "1:24-cv-00001".to_string(),
            case_name: name.to_string(),
            court: "cand".to_string(),
            date_filed: Some(date.to_string()),
            document_number: "1".to_string(),
            description: "COMPLAINT".to_string(),
            document_url: None,
            pdf_url: None,
            extracted: ExtractedFields::default(),
        };
        let docs = vec![
            doc("Oldest", "2024-06-01"),
            doc("Newest", "2024-06-09"),
            doc("Middle", "2024-06-05"),
            doc("Second", "2024-06-08"),
        ];
        let text = chat_summary("2024-06-10 09:00 UTC+9", 2, 3, &docs, &issue(9, "t"));
        assert!(text.contains("<https://github.test/o/r/issues/9|#9>"));
        assert!(text.contains("- Court documents (RECAP complaints): 4"));
        assert!(text.ends_with("  • 2024-06-09 | Newest\n  • 2024-06-08 | Second\n  • 2024-06-05 | Middle"));
    }
}
