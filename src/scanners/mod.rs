// =============================================================================
// scanners/mod.rs -- THE WAR ROOM
// =============================================================================
//
// Everything that reads the outside world lives here. Two sources now
// instead of four, and they run one after the other instead of in parallel
// tokio tasks. CourtListener is a non-profit; Google News is not in the
// habit of being hammered. One polite pass per run is plenty.
//
//   complaint_resolver     -- docket -> operative complaint, tier by tier
//   court_listener_scanner -- search hits -> case summaries and documents
//   news_scanner           -- RSS -> articles -> lawsuits
// =============================================================================

pub mod complaint_resolver;
pub mod court_listener_scanner;
pub mod news_scanner;
