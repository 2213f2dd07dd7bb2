//! PhishGuard — phishing risk scoring for web pages.
//!
//! Estimates a 0–100 phishing risk score by running two feature branches —
//! lexical URL features and structural page features — through a small
//! fixed-topology feed-forward network, then blending the branch scores into
//! one weighted total classified against a threshold.
//!
//! The network weights are loaded once at startup from two artifacts (a JSON
//! structure descriptor and a flat little-endian f32 blob) and shared
//! read-only for the life of the process. If loading fails, scoring degrades
//! to 0 instead of erroring: "no risk signal" is the safe answer for every
//! presentation surface downstream.
//!
//! Uses structured logging via [`tracing`]. Set the `RUST_LOG` environment
//! variable to control log verbosity (e.g., `RUST_LOG=phishguard=debug`).

pub mod aggregate;
pub mod features;
pub mod infer;
pub mod loader;
pub mod patterns;
pub mod server;
pub mod weights;

use eyre::Result;
use serde::Serialize;

use crate::aggregate::{aggregate, BadgeState, RiskPolicy, RiskReport, Verdict};
use crate::features::{is_analyzable, PageFeatures, PageProbe, UrlFeatures};
use crate::loader::ModelHandle;

/// Everything downstream presentation needs for one analyzed page.
#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub url: String,
    pub url_features: UrlFeatures,
    pub page_features: PageFeatures,
    pub report: RiskReport,
    pub badge: BadgeState,
}

/// Score both branches against the shared store and blend.
///
/// Both branches deliberately reuse one topology/weight set; see DESIGN.md
/// for why this is flagged rather than silently split into two models.
pub fn analyze_features(
    url_features: &UrlFeatures,
    page_features: &PageFeatures,
    handle: &ModelHandle,
    policy: &RiskPolicy,
) -> Result<RiskReport> {
    let url_score = infer::score_or_zero(&url_features.to_vector(), handle)?;
    let page_score = infer::score_or_zero(&page_features.to_vector(), handle)?;
    Ok(aggregate(url_score, page_score, policy))
}

/// Full pipeline for one URL: extract both branches, score, blend, classify.
///
/// Non-analyzable URLs short-circuit to a neutral "N/A" result with zero
/// scores and a Safe verdict — not a warning. A degraded page fetch is *not*
/// an error; the page branch simply contributes a zero vector.
pub async fn analyze_url(
    url: &str,
    handle: &ModelHandle,
    probe: &PageProbe,
    policy: &RiskPolicy,
) -> Result<PageAnalysis> {
    if !is_analyzable(url) {
        return Ok(PageAnalysis {
            url: url.to_string(),
            url_features: UrlFeatures::default(),
            page_features: PageFeatures::default(),
            report: RiskReport {
                url_score: 0.0,
                page_score: 0.0,
                total_score: 0.0,
                verdict: Verdict::Safe,
            },
            badge: BadgeState::NotApplicable,
        });
    }

    let url_features = UrlFeatures::extract(url);
    let page_features = probe.fetch(url).await;
    let report = analyze_features(&url_features, &page_features, handle, policy)?;

    tracing::info!(
        url,
        url_score = report.url_score,
        page_score = report.page_score,
        total_score = report.total_score,
        verdict = report.verdict.as_str(),
        "page analyzed"
    );

    Ok(PageAnalysis {
        url: url.to_string(),
        url_features,
        page_features,
        report,
        badge: BadgeState::from_verdict(report.verdict),
    })
}
