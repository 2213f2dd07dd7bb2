//! HTTP server for the PhishGuard analysis service.
//!
//! Exposes the scoring pipeline over REST:
//! - `POST /api/v1/analyze` — score a URL
//! - `GET /health` — liveness plus weight-store status
//! - `GET /stats` — usage counters
//!
//! Features per-IP rate limiting with automatic eviction when the limiter map
//! exceeds 10k entries, and structured logging via [`tracing`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use eyre::Result;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::aggregate::{BadgeState, RiskPolicy, Verdict};
use crate::features::{PageFeatures, PageProbe, UrlFeatures};
use crate::loader::ModelHandle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (defaults to 127.0.0.1:8080; use 0.0.0.0 to expose externally)
    pub bind_addr: SocketAddr,
    /// Rate limit in requests per minute per IP (0 = no limit)
    pub rate_limit_rpm: u32,
    /// Blend weights and classification threshold.
    pub policy: RiskPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080"
                .parse()
                .expect("valid default bind address"),
            rate_limit_rpm: 60,
            policy: RiskPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request to analyze a single URL.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

/// Flat analysis result.
#[derive(Debug, Serialize)]
pub struct AnalysisResult {
    pub url: String,
    pub url_score: f32,
    pub page_score: f32,
    pub total_score: f32,
    pub verdict: String,
    pub badge: String,
    pub url_features: UrlFeatures,
    pub page_features: PageFeatures,
    pub analyzed_at: String,
}

/// Top-level response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub weights_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_hash: Option<String>,
    pub uptime_seconds: u64,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub requests: RequestStats,
    pub verdicts: VerdictStats,
}

#[derive(Debug, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
}

#[derive(Debug, Serialize)]
pub struct VerdictStats {
    pub safe: u64,
    pub phishing: u64,
    pub not_applicable: u64,
}

// ---------------------------------------------------------------------------
// Usage metrics
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct UsageMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub safe: AtomicU64,
    pub phishing: AtomicU64,
    pub not_applicable: AtomicU64,
}

impl UsageMetrics {
    fn record(&self, badge: BadgeState, verdict: Verdict) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if badge == BadgeState::NotApplicable {
            self.not_applicable.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match verdict {
            Verdict::Safe => self.safe.fetch_add(1, Ordering::Relaxed),
            Verdict::Phishing => self.phishing.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

type IpRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ServerState {
    pub config: ServerConfig,
    pub handle: ModelHandle,
    pub probe: PageProbe,
    pub start_time: Instant,
    pub rate_limiters: Mutex<HashMap<std::net::IpAddr, Arc<IpRateLimiter>>>,
    pub usage: UsageMetrics,
}

impl ServerState {
    pub fn new(config: ServerConfig, handle: ModelHandle) -> Self {
        Self {
            config,
            handle,
            probe: PageProbe::new(),
            start_time: Instant::now(),
            rate_limiters: Mutex::new(HashMap::new()),
            usage: UsageMetrics::default(),
        }
    }

    pub async fn get_rate_limiter(&self, ip: std::net::IpAddr) -> Option<Arc<IpRateLimiter>> {
        let rpm = NonZeroU32::new(self.config.rate_limit_rpm)?;

        let mut limiters = self.rate_limiters.lock().await;

        if let Some(limiter) = limiters.get(&ip) {
            return Some(Arc::clone(limiter));
        }

        let quota = Quota::per_minute(rpm);
        let limiter = Arc::new(RateLimiter::direct(quota));
        limiters.insert(ip, Arc::clone(&limiter));

        // Evict oldest entries when the map grows too large
        const MAX_ENTRIES: usize = 10_000;
        if limiters.len() > MAX_ENTRIES {
            let to_remove = limiters.len() - MAX_ENTRIES / 2;
            let keys_to_remove: Vec<_> = limiters
                .keys()
                .filter(|k| **k != ip)
                .take(to_remove)
                .cloned()
                .collect();
            for key in keys_to_remove {
                limiters.remove(&key);
            }
        }

        Some(limiter)
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

/// Build the application router. Exposed for integration tests.
pub fn router(state: Arc<ServerState>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/api/v1/analyze", post(analyze_handler))
        .with_state(state)
}

/// Run the HTTP server (blocking)
pub async fn run_server(config: ServerConfig, handle: ModelHandle) -> Result<()> {
    let bind_addr = config.bind_addr;
    let rate_limit_rpm = config.rate_limit_rpm;
    let state = Arc::new(ServerState::new(config, handle));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "PhishGuard server listening");
    info!("Endpoints: GET /health, GET /stats, POST /api/v1/analyze");
    if rate_limit_rpm > 0 {
        info!(rate_limit_rpm, "rate limiting enabled");
    } else {
        info!("rate limiting disabled");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        weights_loaded: state.handle.is_loaded(),
        weights_hash: state.handle.get().map(|s| s.hash().to_string()),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    axum::Json(response)
}

async fn stats_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    let usage = &state.usage;
    let response = StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        requests: RequestStats {
            total: usage.total_requests.load(Ordering::Relaxed),
            errors: usage.total_errors.load(Ordering::Relaxed),
        },
        verdicts: VerdictStats {
            safe: usage.safe.load(Ordering::Relaxed),
            phishing: usage.phishing.load(Ordering::Relaxed),
            not_applicable: usage.not_applicable.load(Ordering::Relaxed),
        },
    };
    axum::Json(response)
}

async fn analyze_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    axum::extract::Json(request): axum::extract::Json<AnalyzeRequest>,
) -> impl axum::response::IntoResponse {
    let start = Instant::now();
    let client_ip = addr.ip();

    if let Some(limiter) = state.get_rate_limiter(client_ip).await {
        if limiter.check().is_err() {
            state.usage.record_error();
            return axum::Json(AnalyzeResponse {
                success: false,
                error: Some(format!(
                    "Rate limit exceeded. Maximum {} requests per minute.",
                    state.config.rate_limit_rpm
                )),
                badge: None,
                analysis: None,
                processing_time_ms: start.elapsed().as_millis() as u64,
            });
        }
    }

    let analysis = match crate::analyze_url(
        &request.url,
        &state.handle,
        &state.probe,
        &state.config.policy,
    )
    .await
    {
        Ok(a) => a,
        Err(e) => {
            // Pipeline failure (version skew etc.) — the ERR badge case.
            state.usage.record_error();
            return axum::Json(AnalyzeResponse {
                success: false,
                error: Some(format!("Analysis failed: {e}")),
                badge: Some(BadgeState::Error.as_str().to_string()),
                analysis: None,
                processing_time_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    state.usage.record(analysis.badge, analysis.report.verdict);

    axum::Json(AnalyzeResponse {
        success: true,
        error: None,
        badge: Some(analysis.badge.as_str().to_string()),
        analysis: Some(AnalysisResult {
            url: analysis.url,
            url_score: analysis.report.url_score,
            page_score: analysis.report.page_score,
            total_score: analysis.report.total_score,
            verdict: analysis.report.verdict.as_str().to_string(),
            badge: analysis.badge.as_str().to_string(),
            url_features: analysis.url_features,
            page_features: analysis.page_features,
            analyzed_at: chrono::Utc::now().to_rfc3339(),
        }),
        processing_time_ms: start.elapsed().as_millis() as u64,
    })
}
