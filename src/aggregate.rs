//! Risk aggregation: blend the two branch scores and classify the total.

use serde::{Deserialize, Serialize};

/// Blend weights and classification threshold.
///
/// Page-content signals are weighted higher than lexical URL signals because
/// page content is harder to spoof cheaply than a URL string. Operators can
/// recalibrate via config or CLI flags without code changes; these are only
/// the defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub url_weight: f32,
    pub page_weight: f32,
    /// Total scores at or above this value classify as phishing.
    pub threshold: f32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            url_weight: 0.4,
            page_weight: 0.6,
            threshold: 40.0,
        }
    }
}

/// Classification result derived from the total score; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Phishing,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Phishing => "phishing",
        }
    }

    pub fn is_phishing(&self) -> bool {
        matches!(self, Self::Phishing)
    }
}

/// Badge label contract for presentation collaborators (toolbar badge,
/// notifications). The scoring core only picks the label; rendering is
/// external.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadgeState {
    /// Phishing verdict.
    Risk,
    /// Safe verdict.
    Safe,
    /// Page cannot be analyzed (browser-internal or local scheme).
    NotApplicable,
    /// The analysis pipeline itself failed.
    Error,
}

impl BadgeState {
    pub fn from_verdict(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Phishing => Self::Risk,
            Verdict::Safe => Self::Safe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Risk => "RISK",
            Self::Safe => "SAFE",
            Self::NotApplicable => "N/A",
            Self::Error => "ERR",
        }
    }
}

/// Blended result handed to presentation collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskReport {
    pub url_score: f32,
    pub page_score: f32,
    pub total_score: f32,
    pub verdict: Verdict,
}

/// Blend the branch scores and classify against the threshold.
///
/// The boundary is inclusive: a total exactly at the threshold is phishing.
pub fn aggregate(url_score: f32, page_score: f32, policy: &RiskPolicy) -> RiskReport {
    let total_score = url_score * policy.url_weight + page_score * policy.page_weight;
    let verdict = if total_score >= policy.threshold {
        Verdict::Phishing
    } else {
        Verdict::Safe
    };
    RiskReport {
        url_score,
        page_score,
        total_score,
        verdict,
    }
}
