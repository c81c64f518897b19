// =============================================================================
// text_scanner.rs -- THE KEYWORD ANNIHILATOR, NOW WITH LEGALESE
// =============================================================================
//
// All of the "read some text, decide something" logic lives here:
//
// 1. Risk scoring. Five keyword groups, one Aho-Corasick automaton each.
//    A group contributes its weight once if ANY of its keywords appear.
//    Mentioning "scraping" forty times does not make a complaint forty
//    times scarier. Capped at 100.
//
// 2. Complaint detection for docket entry descriptions.
//
// 3. The extraction adapter: caption parties, causes of action, and the
//    one sentence in a 90-page complaint that says "trained on".
//
// 4. News heuristics: case numbers, "A v. B" captions, a one-line reason.
//
// The heuristics are heuristics. They are wrong sometimes. The report says
// "unknown" when they give up, which is more honest than guessing.
// =============================================================================

use std::panic::AssertUnwindSafe;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::{ExtractedFields, UNKNOWN};

fn automaton(keywords: &[&str]) -> AhoCorasick {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(keywords)
        .expect("keyword automaton must build from static literals")
}

// =============================================================================
// Risk scoring
// =============================================================================

/// A weighted keyword group.
struct RiskGroup {
    name: &'static str,
    weight: u32,
    automaton: AhoCorasick,
}

static RISK_GROUPS: LazyLock<Vec<RiskGroup>> = LazyLock::new(|| {
    let group = |name, weight, keywords: &[&str]| RiskGroup {
        name,
        weight,
        automaton: automaton(keywords),
    };
    vec![
        group(
            "unauthorized-collection",
            30,
            &[
                "scrap",
                "without permission",
                "without authorization",
                "unauthorized",
                "pirat",
                "shadow library",
                "books3",
                "libgen",
                "library genesis",
                "crawl",
            ],
        ),
        group(
            "model-training",
            25,
            &[
                "training data",
                "ai training",
                "model training",
                "trained on",
                "large language model",
                "llm",
                "dataset",
                "generative ai",
            ],
        ),
        group(
            "commercial-use",
            15,
            &["commercial", "profit", "monetiz", "revenue", "subscription"],
        ),
        group(
            "copyright-statutory",
            20,
            &[
                "copyright",
                "dmca",
                "17 u.s.c",
                "1201",
                "1202",
                "infringement",
                "trade secret",
            ],
        ),
        group(
            "class-action",
            10,
            &["class action", "putative class", "on behalf of all"],
        ),
    ]
});

pub const MAX_RISK_SCORE: u8 = 100;

/// Score a blob of text from 0 to 100. Deterministic, no state.
pub fn risk_score(text: &str) -> u8 {
    if text.is_empty() {
        return 0;
    }

    let mut total = 0u32;
    for group in RISK_GROUPS.iter() {
        if group.automaton.is_match(text) {
            total += group.weight;
            debug!(group = group.name, weight = group.weight, "Risk group matched");
        }
    }
    total.min(MAX_RISK_SCORE as u32) as u8
}

// =============================================================================
// Complaint detection
// =============================================================================

/// Descriptions that mark a docket entry or document as the complaint.
pub const COMPLAINT_KEYWORDS: &[&str] = &[
    "complaint",
    "amended complaint",
    "petition",
    "class action complaint",
];

static COMPLAINT_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(COMPLAINT_KEYWORDS));

pub fn is_complaint_like(description: &str) -> bool {
    COMPLAINT_AUTOMATON.is_match(description)
}

// =============================================================================
// Extraction adapter
// =============================================================================

/// How much of a PDF we bother reading. Captions and the good sentences are up front.
pub const PDF_TEXT_LIMIT: usize = 3000;

/// Pull text out of PDF bytes. Anything that is not a PDF, or that
/// pdf-extract chokes on, yields `None`.
pub fn pdf_text(bytes: &[u8], max_chars: usize) -> Option<String> {
    let head = &bytes[..bytes.len().min(1024)];
    memchr::memmem::find(head, b"%PDF")?;

    guarded_extract(|| pdf_extract::extract_text_from_mem(bytes))
        .map(|text| truncate_chars(&text, max_chars))
}

/// Run an extractor that may panic on hostile input (pdf-extract does, on
/// fonts it cannot find). A panic is one skipped document, not a dead run.
fn guarded_extract<E, F>(extract: F) -> Option<String>
where
    E: std::fmt::Debug,
    F: FnOnce() -> Result<String, E>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(extract)) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            debug!(error = ?e, "PDF text extraction failed");
            None
        }
        Err(_) => {
            warn!("PDF extractor panicked, document skipped");
            None
        }
    }
}

/// Run every extractor over complaint text.
pub fn extract_fields(text: &str) -> ExtractedFields {
    if text.trim().is_empty() {
        return ExtractedFields::default();
    }
    let (plaintiff, defendant) = match caption_parties(text) {
        Some((p, d)) => (Some(p), Some(d)),
        None => (None, None),
    };
    ExtractedFields {
        plaintiff,
        defendant,
        causes: detect_causes(text),
        ai_snippet: ai_training_snippet(text),
    }
}

// The defendant runs over capitalized words on one line, joined by at most
// one "of"/"and"/"the"/"&" each, so "Model Co" and "Microsoft Corporation"
// survive whole.
static CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([A-Z][A-Za-z0-9 ,.&'\-]{2,}?)\s+v\.?s?\.?\s+([A-Z][A-Za-z0-9&'.\-]*(?: +(?:(?:of|and|the|&) +)?[A-Z][A-Za-z0-9&'.\-]*)*)",
    )
    .expect("caption regex")
});

/// Every plausible "A v. B" caption in a text, cleaned up.
fn caption_candidates(text: &str) -> Vec<(String, String)> {
    CAPTION
        .captures_iter(text)
        .filter_map(|cap| {
            let a = cap[1].trim_matches(|c: char| " ,.;:-".contains(c)).to_string();
            let b = cap[2].trim_matches(|c: char| " ,.;:-".contains(c)).to_string();
            let plausible = (3..=80).contains(&a.len()) && (3..=80).contains(&b.len());
            plausible.then_some((a, b))
        })
        .collect()
}

/// Caption words that make a candidate look like a real party name.
const LEGAL_BONUS_TERMS: &[&str] = &[
    "et al", "inc", "llc", "ltd", "pbc", "corp", "company", "microsoft", "openai", "anthropic",
    "google", "meta", "nvidia", "amazon", "times",
];

fn caption_score(caption: &str) -> f64 {
    let lower = caption.to_lowercase();
    let bonus = LEGAL_BONUS_TERMS.iter().filter(|t| lower.contains(*t)).count() as f64 * 0.2;
    (caption.len() as f64 / 40.0).min(2.0) + bonus
}

/// Best "A v. B" caption in a text.
fn best_caption(text: &str) -> Option<(String, String)> {
    caption_candidates(text).into_iter().max_by(|(a1, b1), (a2, b2)| {
        let s1 = caption_score(&format!("{a1} v. {b1}"));
        let s2 = caption_score(&format!("{a2} v. {b2}"));
        // Ties keep the earliest candidate.
        s1.partial_cmp(&s2).unwrap_or(std::cmp::Ordering::Equal).then(std::cmp::Ordering::Greater)
    })
}

/// Plaintiff and defendant from the complaint caption.
pub fn caption_parties(text: &str) -> Option<(String, String)> {
    best_caption(text)
}

/// Cause-of-action labels, keyed by the phrases that announce them.
const CAUSES: &[(&str, &str)] = &[
    ("copyright infringement", "Copyright Infringement"),
    ("contributory infringement", "Contributory Infringement"),
    ("vicarious infringement", "Vicarious Infringement"),
    ("1202", "DMCA 1202"),
    ("digital millennium copyright act", "DMCA 1202"),
    ("1201", "DMCA 1201"),
    ("unjust enrichment", "Unjust Enrichment"),
    ("unfair competition", "Unfair Competition"),
    ("breach of contract", "Breach of Contract"),
    ("negligence", "Negligence"),
    ("trade secret", "Trade Secret Misappropriation"),
    ("right of publicity", "Right of Publicity"),
    ("invasion of privacy", "Invasion of Privacy"),
    ("computer fraud and abuse", "CFAA"),
    ("trademark", "Trademark"),
];

static CAUSE_AUTOMATON: LazyLock<AhoCorasick> =
    LazyLock::new(|| automaton(&CAUSES.iter().map(|(k, _)| *k).collect::<Vec<_>>()));

/// Distinct causes of action, in table order.
pub fn detect_causes(text: &str) -> Vec<String> {
    let mut hit = vec![false; CAUSES.len()];
    for m in CAUSE_AUTOMATON.find_iter(text) {
        hit[m.pattern().as_usize()] = true;
    }
    let mut labels: Vec<String> = Vec::new();
    for (idx, (_, label)) in CAUSES.iter().enumerate() {
        if hit[idx] && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

static AI_TRAINING_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    automaton(&[
        "training data",
        "trained on",
        "train its",
        "train their",
        "ai training",
        "model training",
        "training dataset",
        "large language model",
    ])
});

const SNIPPET_LIMIT: usize = 300;

/// The sentence around the first AI-training phrase.
pub fn ai_training_snippet(text: &str) -> Option<String> {
    let m = AI_TRAINING_AUTOMATON.find(text)?;
    let bytes = text.as_bytes();

    // Sentence boundaries are ASCII, so byte offsets stay on char boundaries.
    let start = memchr::memrchr2(b'.', b'\n', &bytes[..m.start()]).map_or(0, |i| i + 1);
    let end = memchr::memchr2(b'.', b'\n', &bytes[m.end()..]).map_or(bytes.len(), |i| m.end() + i + 1);

    let sentence = collapse_whitespace(&text[start..end]);
    (!sentence.is_empty()).then(|| truncate_chars(&sentence, SNIPPET_LIMIT))
}

// =============================================================================
// News heuristics
// =============================================================================

static CASE_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)\b\d{1,2}:\d{2}-cv-\d{5}\b", r"(?i)\b\d{4}-cv-\d{4,6}\b"]
        .iter()
        .map(|p| Regex::new(p).expect("case number regex"))
        .collect()
});

/// First federal civil case number in a text, or `unknown`.
pub fn extract_case_number(text: &str) -> String {
    CASE_NUMBER_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Best caption found in article body text, or `unknown`.
pub fn extract_case_title(text: &str) -> String {
    let head = truncate_chars(text, 20_000);
    best_caption(&head)
        .map(|(a, b)| format!("{a} v. {b}"))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

static OUTLET_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[-|\u{2013}\u{2014}]\s+[^-|\u{2013}\u{2014}]{2,}$").expect("suffix regex"));

static HEADLINE_CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][A-Za-z0-9 ,.&'\-]{2,})\s+v\.?s?\.?\s+([A-Z][A-Za-z0-9 ,.&'\-]{2,})")
        .expect("headline caption regex")
});

/// Guess a caption from a headline like "Authors v. Model Co - The Outlet".
pub fn guess_case_title_from_headline(title: &str) -> String {
    let trimmed = OUTLET_SUFFIX.replace(title.trim(), "");
    HEADLINE_CAPTION
        .captures(&trimmed)
        .map(|cap| format!("{} v. {}", cap[1].trim(), cap[2].trim()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

static LITIGATION_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    automaton(&[
        "lawsuit",
        "sued",
        "litigation",
        "copyright",
        "dmca",
        "pirat",
        "unauthoriz",
        "training data",
        "dataset",
    ])
});

/// Does an article talk about litigation at all?
pub fn is_litigation_related(text: &str) -> bool {
    LITIGATION_AUTOMATON.is_match(text)
}

/// One-line reason for a lawsuit, picked from what the article talks about.
pub fn reason_heuristic(text: &str) -> String {
    let h = text.to_lowercase();
    let has = |k: &str| h.contains(k);

    let reason = if has("shadow library") || has("pirat") || has("books3") {
        "Alleged copyright infringement from training AI models on pirated datasets (Books3, shadow libraries)."
    } else if has("youtube") {
        "Alleged scraping of YouTube content for AI training in breach of terms of service and technical protection measures."
    } else if has("lyrics") || has("music publisher") || has("musical works") {
        "Alleged unauthorized use of copyrighted lyrics and musical works to train AI models."
    } else if has("news") && (has("publisher") || has("journalism")) {
        "Alleged unauthorized use of news articles as training data, harming copyright and commercial value."
    } else if has("artist") && (has("style") || has("artwork")) {
        "Alleged unauthorized training on artists' works to imitate their style."
    } else if has("trade secret") || has("confidential") {
        "Alleged misappropriation of trade-secret data for AI model development."
    } else if has("training data") || has("ai training") || has("model training") {
        "Alleged mass collection of unlicensed data to train AI models in violation of copyright and related law."
    } else {
        "Dispute over unauthorized data collection and copyright in AI model training and services."
    };
    reason.to_string()
}

// =============================================================================
// Small text helpers
// =============================================================================

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
