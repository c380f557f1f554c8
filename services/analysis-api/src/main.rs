//! Auction-notice analysis API
//!
//! Single-binary service that:
//! 1. Accepts auction-notice PDFs for analysis (POST /api/analises)
//! 2. Runs each analysis in a background task against Gemini, failing over
//!    to OpenRouter on quota exhaustion
//! 3. Serves the summary and the HTML report once the task finishes
//! 4. Tracks per-user credits, deducted at submission

mod config;
mod credits;
mod error;
mod metrics;
mod store;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use gemini::{GeminiConfig, GeminiProvider};
use openrouter::{OpenRouterConfig, OpenRouterProvider};
use pipeline::Analyzer;
use pipeline::analyzer::task_failure;
use provider::AnalysisRequest;

use crate::config::Config;
use crate::credits::CreditLedger;
use crate::error::ApiError;
use crate::store::{AnalysisStatus, AnalysisStore};

/// Maximum time allowed for draining in-flight requests after SIGTERM.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Credit account used when a submission names no user.
const DEFAULT_USER: &str = "anonimo";

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
    store: Arc<AnalysisStore>,
    credits: Arc<CreditLedger>,
    prometheus: PrometheusHandle,
    started_at: Instant,
    task_timeout: Duration,
    analysis_cost: u32,
    primary_configured: bool,
    fallback_configured: bool,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/analises", post(submit_handler))
        .route("/api/analises/{id}", get(get_analysis_handler))
        .route("/api/analises/{id}/html", get(get_report_handler))
        .route(
            "/api/creditos/{usuario}",
            get(get_credits_handler).post(purchase_credits_handler),
        )
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting analysis-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let request_timeout = Duration::from_secs(config.analysis.request_timeout_secs);

    let primary = GeminiProvider::new(GeminiConfig {
        api_key: config.analysis.google_ai_key.clone(),
        model: config.analysis.primary_model.clone(),
        temperature: config.analysis.temperature,
        timeout: request_timeout,
    })?;
    let fallback = OpenRouterProvider::new(OpenRouterConfig {
        api_key: config.analysis.openrouter_key.clone(),
        model: config.analysis.fallback_model.clone(),
        temperature: config.analysis.temperature,
        timeout: request_timeout,
    })?;

    let primary_configured = config.analysis.google_ai_key.is_some();
    let fallback_configured = config.analysis.openrouter_key.is_some();
    if !primary_configured && !fallback_configured {
        warn!("no provider API keys configured, every analysis will fail");
    }

    info!(
        listen_addr = %config.server.listen_addr,
        primary_model = %config.analysis.primary_model,
        fallback_model = %config.analysis.fallback_model,
        primary_configured,
        fallback_configured,
        quota_cooldown_secs = config.analysis.quota_cooldown_secs,
        "configuration loaded"
    );

    let analyzer = Analyzer::new(
        Arc::new(primary),
        Arc::new(fallback),
        Arc::new(pipeline::ProviderConfigStore::new()),
    )
    .with_cooldown(Duration::from_secs(config.analysis.quota_cooldown_secs));

    let state = AppState {
        analyzer: Arc::new(analyzer),
        store: Arc::new(AnalysisStore::new()),
        credits: Arc::new(CreditLedger::new(config.credits.initial_balance)),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
        task_timeout: Duration::from_secs(config.analysis.task_timeout_secs),
        analysis_cost: config.credits.cost_per_analysis,
        primary_configured,
        fallback_configured,
    };

    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds how long a slow client can block process exit
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wire format of POST /api/analises. Mirrors `AnalysisRequest` with the id
/// made optional (generated when absent) plus the credit account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(default)]
    id: Option<String>,
    file_name: String,
    file_content: String,
    #[serde(default)]
    file_matricula_content: Option<String>,
    #[serde(default)]
    file_matricula_name: Option<String>,
    #[serde(default)]
    tipo_imovel: String,
    #[serde(default)]
    matricula: String,
    #[serde(default)]
    estado: String,
    #[serde(default)]
    cidade: String,
    #[serde(default)]
    instrucoes: String,
    #[serde(default)]
    usuario: Option<String>,
}

/// Accept an analysis for background processing.
///
/// Credits are deducted before the task is spawned; a rejected submission
/// never reaches the providers. Responds 202 immediately, the result is
/// retrieved by polling GET /api/analises/{id}.
async fn submit_handler(
    State(state): State<AppState>,
    Json(submit): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if submit.file_name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("fileName é obrigatório".into()));
    }
    if submit.file_content.is_empty() {
        return Err(ApiError::InvalidRequest("fileContent é obrigatório".into()));
    }
    if BASE64.decode(&submit.file_content).is_err() {
        return Err(ApiError::InvalidRequest(
            "fileContent não é base64 válido".into(),
        ));
    }
    if let Some(matricula) = &submit.file_matricula_content
        && BASE64.decode(matricula).is_err()
    {
        return Err(ApiError::InvalidRequest(
            "fileMatriculaContent não é base64 válido".into(),
        ));
    }

    let user = submit.usuario.clone().unwrap_or_else(|| DEFAULT_USER.into());
    let id = submit
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Register before charging: the insert is the atomic duplicate check,
    // so a resubmitted id is rejected without touching the ledger or the
    // earlier record.
    if !state.store.insert_processing(&id).await {
        return Err(ApiError::DuplicateId(id));
    }
    let remaining = match state.credits.deduct(&user, state.analysis_cost).await {
        Some(remaining) => remaining,
        None => {
            state.store.remove(&id).await;
            return Err(ApiError::InsufficientCredits);
        }
    };
    metrics::record_credits_deducted(state.analysis_cost);

    let request = AnalysisRequest {
        id: id.clone(),
        file_name: submit.file_name,
        file_content: submit.file_content,
        file_matricula_content: submit.file_matricula_content,
        file_matricula_name: submit.file_matricula_name,
        tipo_imovel: submit.tipo_imovel,
        matricula: submit.matricula,
        estado: submit.estado,
        cidade: submit.cidade,
        instrucoes: submit.instrucoes,
    };

    info!(
        analysis_id = %id,
        usuario = %user,
        credits_remaining = remaining,
        has_matricula = request.file_matricula_content.is_some(),
        "analysis accepted"
    );

    tokio::spawn(run_analysis(state.clone(), request));

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "status": AnalysisStatus::Processing })),
    ))
}

/// Background task for one analysis, bounded by the configured ceiling.
async fn run_analysis(state: AppState, request: AnalysisRequest) {
    let start = Instant::now();
    let flagged_before = state
        .analyzer
        .config()
        .get()
        .await
        .primary_quota_exceeded;

    let (status, result) = match tokio::time::timeout(
        state.task_timeout,
        state.analyzer.analyze(&request),
    )
    .await
    {
        Ok(result) => (AnalysisStatus::Completed, result),
        Err(_) => {
            error!(
                analysis_id = %request.id,
                ceiling_secs = state.task_timeout.as_secs(),
                "analysis task exceeded execution ceiling"
            );
            (AnalysisStatus::Failed, task_failure(&request.id))
        }
    };

    let flagged_after = state
        .analyzer
        .config()
        .get()
        .await
        .primary_quota_exceeded;
    if !flagged_before && flagged_after {
        metrics::record_failover();
    }

    let outcome = match status {
        AnalysisStatus::Completed => "completed",
        _ => "failed",
    };
    metrics::record_analysis(outcome, start.elapsed().as_secs_f64());

    state
        .store
        .finish(&request.id, status, pipeline::process(&result))
        .await;
    info!(
        analysis_id = %request.id,
        outcome,
        duration_secs = start.elapsed().as_secs(),
        "analysis finished"
    );
}

/// Current state of one analysis: status plus the summary document once the
/// task finished. The HTML report is served separately.
async fn get_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(id))?;
    Ok(Json(serde_json::json!({
        "id": record.id,
        "status": record.status,
        "resultado": record.resultado,
    })))
}

/// The HTML report for a finished analysis.
async fn get_report_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;
    match record.html {
        Some(html) => Ok(Html(html)),
        None => Err(ApiError::NotReady(id)),
    }
}

async fn get_credits_handler(
    State(state): State<AppState>,
    Path(usuario): Path<String>,
) -> impl IntoResponse {
    let creditos = state.credits.balance(&usuario).await;
    Json(serde_json::json!({ "usuario": usuario, "creditos": creditos }))
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    quantidade: u32,
}

async fn purchase_credits_handler(
    State(state): State<AppState>,
    Path(usuario): Path<String>,
    Json(purchase): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if purchase.quantidade == 0 {
        return Err(ApiError::InvalidRequest(
            "quantidade deve ser maior que zero".into(),
        ));
    }
    let creditos = state.credits.add(&usuario, purchase.quantidade).await;
    info!(usuario = %usuario, quantidade = purchase.quantidade, creditos, "credits purchased");
    Ok(Json(
        serde_json::json!({ "usuario": usuario, "creditos": creditos }),
    ))
}

/// Health endpoint: provider configuration and quota-flag state, uptime,
/// tracked analyses. Returns 200 when at least one provider is usable,
/// 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let cooldown_remaining = state
        .analyzer
        .config()
        .cooldown_remaining(state.analyzer.cooldown())
        .await;

    let usable = state.primary_configured || state.fallback_configured;
    let status_code = if usable {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if usable { "healthy" } else { "degraded" },
        "uptime_seconds": uptime,
        "analyses_tracked": state.store.len().await,
        "providers": {
            "primary": {
                "id": "gemini",
                "configured": state.primary_configured,
                "quota_flagged": cooldown_remaining.is_some(),
                "cooldown_remaining_secs": cooldown_remaining.map(|d| d.as_secs()),
            },
            "fallback": {
                "id": "openrouter",
                "configured": state.fallback_configured,
            },
        },
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use provider::{AnalysisResult, Provider, ProviderError};
    use std::future::Future;
    use std::pin::Pin;
    use tower::ServiceExt;

    /// Scripted provider behavior for end-to-end handler tests.
    #[derive(Clone)]
    enum Behavior {
        Succeed(&'static str),
        Quota,
        FormatError,
        /// Sleep before succeeding, to widen the processing window
        Slow(Duration),
    }

    struct StubProvider {
        name: &'static str,
        configured: bool,
        behavior: Behavior,
    }

    impl Provider for StubProvider {
        fn id(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn analyze<'a>(
            &'a self,
            request: &'a AnalysisRequest,
        ) -> Pin<Box<dyn Future<Output = provider::Result<AnalysisResult>> + Send + 'a>> {
            let behavior = self.behavior.clone();
            Box::pin(async move {
                match behavior {
                    Behavior::Succeed(recomendacao) => Ok(stub_result(&request.id, recomendacao)),
                    Behavior::Quota => Err(ProviderError::Quota("Quota exceeded".into())),
                    Behavior::FormatError => {
                        Err(ProviderError::Format("missing JSON segment".into()))
                    }
                    Behavior::Slow(delay) => {
                        tokio::time::sleep(delay).await;
                        Ok(stub_result(&request.id, "slow result"))
                    }
                }
            })
        }
    }

    fn stub_result(id: &str, recomendacao: &str) -> AnalysisResult {
        let mut result = AnalysisResult::failure(id, "x", "y");
        result.summary.recomendacao = recomendacao.to_string();
        result.summary.riscos.clear();
        result.html_content = "<!DOCTYPE html><html><body>relatório</body></html>".to_string();
        result
    }

    /// Create a PrometheusHandle for tests without installing a global
    /// recorder (only one can exist per process).
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn test_state(primary: Behavior, fallback: Behavior, initial_credits: u32) -> AppState {
        let analyzer = Analyzer::new(
            Arc::new(StubProvider {
                name: "gemini",
                configured: true,
                behavior: primary,
            }),
            Arc::new(StubProvider {
                name: "openrouter",
                configured: true,
                behavior: fallback,
            }),
            Arc::new(pipeline::ProviderConfigStore::new()),
        );
        AppState {
            analyzer: Arc::new(analyzer),
            store: Arc::new(AnalysisStore::new()),
            credits: Arc::new(CreditLedger::new(initial_credits)),
            prometheus: test_prometheus_handle(),
            started_at: Instant::now(),
            task_timeout: Duration::from_secs(5),
            analysis_cost: 1,
            primary_configured: true,
            fallback_configured: true,
        }
    }

    fn submit_body(id: &str) -> String {
        serde_json::json!({
            "id": id,
            "fileName": "edital.pdf",
            "fileContent": "JVBERi0xLjQ=",
            "tipoImovel": "Apartamento",
            "matricula": "12345",
            "estado": "SP",
            "cidade": "Campinas",
            "instrucoes": "",
            "usuario": "alice"
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Poll the store until the record leaves Processing.
    async fn wait_finished(store: &AnalysisStore, id: &str) -> store::AnalysisRecord {
        for _ in 0..100 {
            if let Some(record) = store.get(id).await
                && record.status != AnalysisStatus::Processing
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("analysis {id} never finished");
    }

    #[tokio::test]
    async fn submit_accepts_and_completes_analysis() {
        let state = test_state(Behavior::Succeed("Bom negócio"), Behavior::Quota, 5);
        let store = state.store.clone();
        let app = build_router(state, 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["id"], "an-1");
        assert_eq!(json["status"], "processing");

        let record = wait_finished(&store, "an-1").await;
        assert_eq!(record.status, AnalysisStatus::Completed);
        let resultado = record.resultado.unwrap();
        assert_eq!(resultado["recomendacao"], "Bom negócio");
        assert!(resultado.get("html_content").is_none());
        assert!(record.html.unwrap().contains("relatório"));
    }

    #[tokio::test]
    async fn submit_generates_id_when_absent() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let app = build_router(state, 100);

        let body = serde_json::json!({
            "fileName": "edital.pdf",
            "fileContent": "JVBERi0xLjQ=",
        })
        .to_string();
        let response = app.oneshot(post_json("/api/analises", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert!(!json["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_invalid_base64_is_rejected_without_deduction() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let credits = state.credits.clone();
        let app = build_router(state, 100);

        let body = serde_json::json!({
            "fileName": "edital.pdf",
            "fileContent": "isto não é base64!!!",
            "usuario": "alice",
        })
        .to_string();
        let response = app.oneshot(post_json("/api/analises", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert!(
            json["error"]["request_id"]
                .as_str()
                .unwrap()
                .starts_with("req_")
        );
        assert_eq!(credits.balance("alice").await, 5);
    }

    #[tokio::test]
    async fn resubmitted_id_is_rejected_without_second_charge() {
        let state = test_state(Behavior::Succeed("primeira"), Behavior::Quota, 5);
        let store = state.store.clone();
        let credits = state.credits.clone();
        let app = build_router(state.clone(), 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-dup")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_finished(&store, "an-dup").await;

        let app = build_router(state, 100);
        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-dup")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "duplicate_id");

        // Only the first submission was charged and the record survived.
        assert_eq!(credits.balance("alice").await, 4);
        let record = store.get("an-dup").await.unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.resultado.unwrap()["recomendacao"], "primeira");
    }

    #[tokio::test]
    async fn submit_without_credits_is_payment_required() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 0);
        let store = state.store.clone();
        let app = build_router(state, 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-2")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "insufficient_credits");
        // Nothing was registered for processing
        assert!(store.get("an-2").await.is_none());
    }

    #[tokio::test]
    async fn quota_failover_completes_on_fallback_and_flags_primary() {
        let state = test_state(Behavior::Quota, Behavior::Succeed("via fallback"), 5);
        let store = state.store.clone();
        let analyzer = state.analyzer.clone();
        let app = build_router(state, 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-3")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let record = wait_finished(&store, "an-3").await;
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.resultado.unwrap()["recomendacao"], "via fallback");
        assert!(analyzer.config().get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn format_error_stores_failure_shape_as_completed() {
        let state = test_state(Behavior::FormatError, Behavior::Succeed("unused"), 5);
        let store = state.store.clone();
        let app = build_router(state, 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-4")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let record = wait_finished(&store, "an-4").await;
        // The pipeline converted the error into a well-formed result
        assert_eq!(record.status, AnalysisStatus::Completed);
        let resultado = record.resultado.unwrap();
        assert_eq!(
            resultado["recomendacao"],
            pipeline::analyzer::MSG_BAD_REPLY
        );
        assert_eq!(resultado["valorEstimado"], provider::types::NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn get_unknown_analysis_is_not_found() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let app = build_router(state, 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/analises/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "not_found");
    }

    #[tokio::test]
    async fn report_endpoint_is_conflict_while_processing() {
        let state = test_state(
            Behavior::Slow(Duration::from_millis(500)),
            Behavior::Quota,
            5,
        );
        let store = state.store.clone();
        let app = build_router(state.clone(), 100);

        let response = app
            .oneshot(post_json("/api/analises", submit_body("an-5")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let app = build_router(state, 100);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/analises/an-5/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Let the background task finish before the test runtime shuts down
        wait_finished(&store, "an-5").await;
    }

    #[tokio::test]
    async fn report_endpoint_serves_html_after_completion() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let store = state.store.clone();
        let app = build_router(state.clone(), 100);

        app.oneshot(post_json("/api/analises", submit_body("an-6")))
            .await
            .unwrap();
        wait_finished(&store, "an-6").await;

        let app = build_router(state, 100);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/analises/an-6/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/html"));
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("relatório"));
    }

    #[tokio::test]
    async fn credits_endpoints_report_and_purchase() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let app = build_router(state.clone(), 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/creditos/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["usuario"], "alice");
        assert_eq!(json["creditos"], 5);

        let app = build_router(state, 100);
        let response = app
            .oneshot(post_json(
                "/api/creditos/alice",
                serde_json::json!({ "quantidade": 10 }).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["creditos"], 15);
    }

    #[tokio::test]
    async fn purchase_of_zero_credits_is_rejected() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let app = build_router(state, 100);

        let response = app
            .oneshot(post_json(
                "/api/creditos/alice",
                serde_json::json!({ "quantidade": 0 }).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_provider_state() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let analyzer = state.analyzer.clone();
        let app = build_router(state.clone(), 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["providers"]["primary"]["id"], "gemini");
        assert_eq!(json["providers"]["primary"]["quota_flagged"], false);
        assert_eq!(json["providers"]["fallback"]["configured"], true);
        assert!(json["uptime_seconds"].is_u64());

        // Flag the primary and check the health report follows
        analyzer.config().mark_primary_exhausted().await;
        let app = build_router(state, 100);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["providers"]["primary"]["quota_flagged"], true);
        assert!(json["providers"]["primary"]["cooldown_remaining_secs"].is_u64());
    }

    #[tokio::test]
    async fn health_degraded_without_any_provider() {
        let mut state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        state.primary_configured = false;
        state.fallback_configured = false;
        let app = build_router(state, 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let state = test_state(Behavior::Succeed("ok"), Behavior::Quota, 5);
        let app = build_router(state, 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
