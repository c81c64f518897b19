// =============================================================================
// known_cases.rs -- THE CHEAT SHEET
// =============================================================================
//
// The news heuristics guess. For the handful of suits everybody writes about,
// a human already knows the docket number and the proper caption, so they
// live in a YAML file:
//
//   - match:
//       any: ["Bartz", "Anthropic settlement"]
//     enrich:
//       case_number: "3:24-cv-05417"
//       case_title: "Bartz v. Anthropic PBC"
//       reason: "Authors allege Anthropic trained Claude on pirated books."
//
// The first entry with any term in the headline or article text wins, and
// each field it sets beats whatever the heuristics found. The file is
// optional. A missing file is an empty list; a broken one is logged and
// treated the same way, because a typo in the cheat sheet should not cost
// us the whole report.
// =============================================================================

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchTerms {
    #[serde(default)]
    pub any: Vec<String>,
}

/// Fields a known case overrides. Unset fields leave the heuristic value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Enrichment {
    pub case_number: Option<String>,
    pub case_title: Option<String>,
    pub reason: Option<String>,
}

impl Enrichment {
    fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn case_number(&self) -> Option<&str> {
        Self::field(&self.case_number)
    }

    pub fn case_title(&self) -> Option<&str> {
        Self::field(&self.case_title)
    }

    pub fn reason(&self) -> Option<&str> {
        Self::field(&self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KnownCase {
    #[serde(rename = "match", default)]
    pub terms: MatchTerms,
    #[serde(default)]
    pub enrich: Enrichment,
}

impl KnownCase {
    /// Case-insensitive substring match against an already lowercased haystack.
    fn matches(&self, haystack_lower: &str) -> bool {
        self.terms
            .any
            .iter()
            .map(|t| t.trim().to_lowercase())
            .any(|t| !t.is_empty() && haystack_lower.contains(&t))
    }
}

/// Parse the YAML list. An empty document is an empty list.
pub fn parse_known_cases(yaml: &str) -> Result<Vec<KnownCase>, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_yaml::from_str::<Option<Vec<KnownCase>>>(yaml)?.unwrap_or_default())
}

/// Load the known-cases file, or nothing.
pub fn load_known_cases(path: impl AsRef<Path>) -> Vec<KnownCase> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No known-cases file");
            return Vec::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Known-cases file unreadable, ignoring it");
            return Vec::new();
        }
    };

    match parse_known_cases(&raw) {
        Ok(known) => {
            info!(path = %path.display(), entries = known.len(), "Known cases loaded");
            known
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Known-cases file is not valid YAML, ignoring it");
            Vec::new()
        }
    }
}

/// The enrichment of the first known case mentioned in the headline or text.
pub fn enrich_from_known<'k>(text: &str, title: &str, known: &'k [KnownCase]) -> Option<&'k Enrichment> {
    let haystack = format!("{title}\n{text}").to_lowercase();
    known
        .iter()
        .find(|case| case.matches(&haystack))
        .map(|case| &case.enrich)
}
