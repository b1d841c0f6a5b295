//! Compliance scoring
//!
//! # Scoring Formula
//!
//! ```text
//! score = Σ(wᵢ · vᵢ) / Σ wᵢ
//!
//! vᵢ: pass = 1, partial = 0.5, fail = 0, not-applicable excluded
//! wᵢ: mandatory rule = 2.0, optional rule = 1.0   (configurable)
//! ```
//!
//! # Levels
//!
//! - score ≥ 0.90: compliant
//! - score ≥ 0.60: partially compliant
//! - otherwise: non-compliant
//! - no applicable finding: not assessed
//!
//! Across standards the worst level wins.
//!
//! # Example
//!
//! "The system shall authenticate users with encrypted credentials" checked
//! against a mandatory rule requiring "audit trail" fails: it adds 0 to the
//! numerator and 2 to the denominator.

mod compliance_scorer;

pub use compliance_scorer::{ComplianceScorer, ScoreBreakdown};
