//! Gap and impact analysis
//!
//! Read-only queries over a [`TraceQuery`](crate::graph::TraceQuery) view,
//! the rule store and the assessment ledger: coverage gaps, change impact and
//! stale assessments.

mod coverage;
mod staleness;

pub use coverage::{CoverageGap, CoverageReport, GapAnalyzer, GapKind};
pub use staleness::{check_staleness, is_stale};
