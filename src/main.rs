// ██╗      █████╗ ██╗    ██╗███████╗██╗   ██╗██╗████████╗
// ██║     ██╔══██╗██║    ██║██╔════╝██║   ██║██║╚══██╔══╝
// ██║     ███████║██║ █╗ ██║███████╗██║   ██║██║   ██║
// ██║     ██╔══██║██║███╗██║╚════██║██║   ██║██║   ██║
// ███████╗██║  ██║╚███╔███╔╝███████║╚██████╔╝██║   ██║
// ╚══════╝╚═╝  ╚═╝ ╚══╝╚══╝ ╚══════╝ ╚═════╝ ╚═╝   ╚═╝
//
// R A D A R
//
// Who is suing whom over the data their models were trained on.
// CourtListener + Google News in, one deduplicated Markdown report out,
// posted to a daily GitHub issue and summarized in Slack.

mod config;
mod court_cache;
mod dedup;
mod fetch;
mod known_cases;
mod models;
mod publisher;
mod report;
mod scanners;
mod text_scanner;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use tracing::{info, Instrument};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::config::{Config, COURT_LISTENER_QUERIES, NEWS_QUERIES};
use crate::court_cache::CourtCache;
use crate::fetch::HttpFetcher;
use crate::publisher::{ChatNotifier, GithubIssues, SlackWebhook};
use crate::report::ReportContext;
use crate::scanners::court_listener_scanner::CaseAggregator;
use crate::scanners::news_scanner;

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║   ⚖️  LAWSUIT RADAR ENGINE  ⚖️                                ║
    ║                                                              ║
    ║   Sources:  CourtListener RECAP | Google News                ║
    ║   Memory:   every earlier report on the issue                ║
    ║   Output:   GitHub issue comment + Slack summary             ║
    ║                                                              ║
    ║   "Somebody scraped something. Somebody sued."               ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    print_banner();

    // Nothing touches the network before the configuration is known good.
    let config = Config::from_env().context("loading configuration")?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);
    run(config).instrument(span).await
}

async fn run(config: Config) -> Result<()> {
    let offset = FixedOffset::east_opt(config.report_utc_offset_hours * 3600)
        .context("REPORT_UTC_OFFSET_HOURS is not a valid UTC offset")?;
    let now_utc = Utc::now();
    let now_local = now_utc.with_timezone(&offset);
    let today = now_local.date_naive();
    let issue_title = publisher::daily_title(&config.issue_title_base, &today.format("%Y-%m-%d").to_string());

    info!(
        lookback_days = config.lookback_days,
        dry_run = config.dry_run,
        issue = issue_title.as_str(),
        "Lawsuit radar sweep starting"
    );

    let fetcher = HttpFetcher::new(config.request_timeout, config.court_listener_token.clone())?;
    let site = config.court_listener_site();

    // 1) RECAP search
    let mut aggregator = CaseAggregator::new(
        &fetcher,
        CourtCache::new(config.court_cache_size),
        &config.court_listener_base_url,
        &site,
        config.lookback_days,
        today,
    )
    .with_search_page_size(config.search_page_size);
    let hits = aggregator.search_all(COURT_LISTENER_QUERIES).await;

    // 2) News
    let news = news_scanner::fetch_news(&fetcher, NEWS_QUERIES, config.lookback_days).await;
    let known = known_cases::load_known_cases(&config.known_cases_path);
    let lawsuits = news_scanner::build_lawsuits(&fetcher, &news, &known, now_utc, config.lookback_days).await;

    // 3) Expand by what the news quoted, then build both collections
    let docket_numbers: Vec<String> = lawsuits
        .iter()
        .filter(|l| l.has_case_number())
        .map(|l| l.case_number.clone())
        .collect();
    let case_titles: Vec<String> = lawsuits
        .iter()
        .filter(|l| l.has_case_title())
        .map(|l| l.case_title.clone())
        .collect();

    let docket_ids = aggregator
        .collect_docket_ids(&hits, &docket_numbers, &case_titles)
        .await;
    let cases = aggregator.summaries_for_ids(&docket_ids).await;
    let documents = aggregator.documents_for_ids(&docket_ids).await;

    // 4) Render
    let ctx = ReportContext {
        run_at: now_local,
        lookback_days: config.lookback_days,
        site: site.clone(),
    };
    let report = report::render_report(&ctx, &lawsuits, &cases, &documents);

    info!(
        lawsuits = lawsuits.len(),
        cases = cases.len(),
        documents = documents.len(),
        "Report rendered"
    );

    if config.dry_run {
        let outcome = dedup::apply_deduplication(&report, &[]);
        println!("{}", outcome.report);
        info!("Dry run: nothing published");
        return Ok(());
    }

    // 5) Publish
    let store = GithubIssues::new(
        &config.github_owner,
        &config.github_repo,
        &config.github_token,
        config.request_timeout,
    )?;
    let mut published = publisher::publish_report(
        &store,
        &issue_title,
        &config.issue_title_base,
        &config.issue_label,
        &report,
    )
    .await
    .context("publishing report")?;

    if published.issue.html_url.is_empty() {
        published.issue.html_url = format!(
            "https://github.com/{}/{}/issues/{}",
            config.github_owner, config.github_repo, published.issue.number
        );
    }

    // 6) Chat
    let stamp = format!(
        "{} {}",
        now_local.format("%Y-%m-%d %H:%M"),
        report::utc_label(&now_local)
    );
    let slack = SlackWebhook::new(&config.slack_webhook_url, config.request_timeout)?;
    slack
        .notify(&publisher::chat_summary(
            &stamp,
            lawsuits.len(),
            cases.len(),
            &documents,
            &published.issue,
        ))
        .await
        .context("posting chat summary")?;

    info!(
        issue = published.issue.number,
        closed = published.closed.len(),
        news_new = published.dedup.news.new,
        cases_new = published.dedup.cases.new,
        "Lawsuit radar sweep complete"
    );
    Ok(())
}
