//! Orchestration of one analysis across the primary and fallback providers
//!
//! `analyze` is total: every outcome, including double exhaustion, yields a
//! complete `AnalysisResult`. Only quota exhaustion triggers failover; any
//! other primary failure is terminal, because retrying a malformed reply or
//! a server error on a different vendor costs a full model call with no
//! better odds.

use std::sync::Arc;
use std::time::Duration;

use provider::{AnalysisRequest, AnalysisResult, Provider, ProviderError};
use tracing::{error, info, warn};

use crate::config::{ProviderConfigStore, QUOTA_COOLDOWN};
use crate::quota;

/// Recommendation text for failures outside the provider call itself, such
/// as the task runner hitting its deadline.
pub const MSG_TASK_FAILED: &str = "Erro ao processar a análise";
/// Risk entry accompanying `MSG_TASK_FAILED`.
pub const RISK_TASK_FAILED: &str = "Não foi possível analisar o documento";

/// Recommendation text when the model reply could not be parsed.
pub const MSG_BAD_REPLY: &str =
    "Erro ao processar a resposta da análise. Por favor, tente novamente.";
/// Recommendation text for any other terminal provider failure.
pub const MSG_ANALYSIS_FAILED: &str =
    "Não foi possível analisar o edital. Por favor, tente novamente.";
/// Risk entry accompanying terminal provider failures.
pub const RISK_ANALYSIS_FAILED: &str = "Erro na análise do documento";

/// Routes one analysis to the primary provider, failing over to the
/// fallback on quota exhaustion.
pub struct Analyzer {
    primary: Arc<dyn Provider>,
    fallback: Arc<dyn Provider>,
    config: Arc<ProviderConfigStore>,
    cooldown: Duration,
}

impl Analyzer {
    pub fn new(
        primary: Arc<dyn Provider>,
        fallback: Arc<dyn Provider>,
        config: Arc<ProviderConfigStore>,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
            cooldown: QUOTA_COOLDOWN,
        }
    }

    /// Override the quota cooldown (tests use a zero cooldown).
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Shared routing state, for health reporting.
    pub fn config(&self) -> &Arc<ProviderConfigStore> {
        &self.config
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run one analysis. Never fails: adapter errors become well-formed
    /// error results.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        if self.primary.is_configured() {
            if self.config.primary_available(self.cooldown).await {
                match self.primary.analyze(request).await {
                    Ok(result) => {
                        info!(
                            provider = self.primary.id(),
                            analysis_id = %request.id,
                            "analysis completed on primary"
                        );
                        return result;
                    }
                    Err(e) if quota::is_quota_error(&e) => {
                        warn!(
                            provider = self.primary.id(),
                            analysis_id = %request.id,
                            error = %e,
                            "primary quota exhausted, failing over"
                        );
                        self.config.mark_primary_exhausted().await;
                    }
                    Err(e) => {
                        error!(
                            provider = self.primary.id(),
                            analysis_id = %request.id,
                            error = %e,
                            "primary analysis failed"
                        );
                        return failure_for(&request.id, &e);
                    }
                }
            } else {
                info!(
                    analysis_id = %request.id,
                    "primary in quota cooldown, using fallback"
                );
            }
        } else {
            info!(
                analysis_id = %request.id,
                "primary provider not configured, using fallback"
            );
        }

        match self.fallback.analyze(request).await {
            Ok(result) => {
                info!(
                    provider = self.fallback.id(),
                    analysis_id = %request.id,
                    "analysis completed on fallback"
                );
                result
            }
            Err(e) => {
                error!(
                    provider = self.fallback.id(),
                    analysis_id = %request.id,
                    error = %e,
                    "fallback analysis failed"
                );
                failure_for(&request.id, &e)
            }
        }
    }
}

/// Failure result for situations where no provider produced a result, such
/// as the background task hitting its execution ceiling.
pub fn task_failure(id: &str) -> AnalysisResult {
    AnalysisResult::failure(id, MSG_TASK_FAILED, RISK_TASK_FAILED)
}

/// Map a terminal provider error to its user-facing failure result.
fn failure_for(id: &str, error: &ProviderError) -> AnalysisResult {
    match error {
        ProviderError::Format(_) => AnalysisResult::failure(id, MSG_BAD_REPLY, RISK_ANALYSIS_FAILED),
        _ => AnalysisResult::failure(id, MSG_ANALYSIS_FAILED, RISK_ANALYSIS_FAILED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        name: &'static str,
        configured: bool,
        calls: AtomicUsize,
        replies: Mutex<VecDeque<provider::Result<AnalysisResult>>>,
    }

    impl MockProvider {
        fn new(name: &'static str, replies: Vec<provider::Result<AnalysisResult>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: true,
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into()),
            })
        }

        fn unconfigured(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: false,
                calls: AtomicUsize::new(0),
                replies: Mutex::new(VecDeque::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for MockProvider {
        fn id(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn analyze<'a>(
            &'a self,
            _request: &'a AnalysisRequest,
        ) -> Pin<Box<dyn Future<Output = provider::Result<AnalysisResult>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| panic!("unexpected call to provider {}", self.name))
            })
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            id: "t1".into(),
            file_name: "edital.pdf".into(),
            file_content: "ZWRpdGFs".into(),
            file_matricula_content: None,
            file_matricula_name: None,
            tipo_imovel: "Apartamento".into(),
            matricula: "1".into(),
            estado: "SP".into(),
            cidade: "São Paulo".into(),
            instrucoes: String::new(),
        }
    }

    fn ok_result(recomendacao: &str) -> provider::Result<AnalysisResult> {
        let mut result = AnalysisResult::failure("t1", "x", "y");
        result.summary.recomendacao = recomendacao.to_string();
        result.summary.riscos.clear();
        Ok(result)
    }

    fn quota_err() -> provider::Result<AnalysisResult> {
        Err(ProviderError::Quota("Quota exceeded".into()))
    }

    fn analyzer(
        primary: &Arc<MockProvider>,
        fallback: &Arc<MockProvider>,
    ) -> (Analyzer, Arc<ProviderConfigStore>) {
        let config = Arc::new(ProviderConfigStore::new());
        let analyzer = Analyzer::new(primary.clone(), fallback.clone(), config.clone());
        (analyzer, config)
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = MockProvider::new("gemini", vec![ok_result("via primary")]);
        let fallback = MockProvider::new("openrouter", vec![]);
        let (analyzer, config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, "via primary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert!(!config.get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn quota_error_fails_over_and_flags() {
        let primary = MockProvider::new("gemini", vec![quota_err()]);
        let fallback = MockProvider::new("openrouter", vec![ok_result("via fallback")]);
        let (analyzer, config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, "via fallback");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert!(config.get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn active_flag_routes_directly_to_fallback() {
        let primary = MockProvider::new("gemini", vec![]);
        let fallback = MockProvider::new("openrouter", vec![ok_result("via fallback")]);
        let (analyzer, config) = analyzer(&primary, &fallback);
        config.mark_primary_exhausted().await;

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, "via fallback");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn expired_flag_retries_primary() {
        let primary = MockProvider::new("gemini", vec![ok_result("via primary")]);
        let fallback = MockProvider::new("openrouter", vec![]);
        let (analyzer, config) = analyzer(&primary, &fallback);
        config.mark_primary_exhausted().await;

        let result = analyzer
            .with_cooldown(Duration::ZERO)
            .analyze(&request())
            .await;
        assert_eq!(result.summary.recomendacao, "via primary");
        assert_eq!(primary.calls(), 1);
        assert!(!config.get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn unconfigured_primary_goes_straight_to_fallback() {
        let primary = MockProvider::unconfigured("gemini");
        let fallback = MockProvider::new("openrouter", vec![ok_result("via fallback")]);
        let (analyzer, _config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, "via fallback");
        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn primary_format_error_is_terminal() {
        let primary = MockProvider::new(
            "gemini",
            vec![Err(ProviderError::Format("missing JSON segment".into()))],
        );
        let fallback = MockProvider::new("openrouter", vec![]);
        let (analyzer, config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, MSG_BAD_REPLY);
        assert_eq!(result.summary.riscos, vec![RISK_ANALYSIS_FAILED]);
        assert_eq!(fallback.calls(), 0);
        assert!(!config.get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn primary_server_error_is_terminal() {
        let primary = MockProvider::new(
            "gemini",
            vec![Err(ProviderError::Transport {
                status: Some(503),
                message: "service unavailable".into(),
            })],
        );
        let fallback = MockProvider::new("openrouter", vec![]);
        let (analyzer, _config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, MSG_ANALYSIS_FAILED);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn statusless_quota_message_triggers_failover() {
        let primary = MockProvider::new(
            "gemini",
            vec![Err(ProviderError::Transport {
                status: None,
                message: "call failed: Resource has been exhausted".into(),
            })],
        );
        let fallback = MockProvider::new("openrouter", vec![ok_result("via fallback")]);
        let (analyzer, config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, "via fallback");
        assert!(config.get().await.primary_quota_exceeded);
    }

    #[tokio::test]
    async fn both_providers_exhausted_yields_failure_result() {
        let primary = MockProvider::new("gemini", vec![quota_err()]);
        let fallback = MockProvider::new("openrouter", vec![quota_err()]);
        let (analyzer, _config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, MSG_ANALYSIS_FAILED);
        assert_eq!(result.summary.riscos, vec![RISK_ANALYSIS_FAILED]);
        assert!(result.html_content.contains("Erro na Análise"));
    }

    #[tokio::test]
    async fn fallback_format_error_yields_bad_reply_failure() {
        let primary = MockProvider::unconfigured("gemini");
        let fallback = MockProvider::new(
            "openrouter",
            vec![Err(ProviderError::Format("missing HTML segment".into()))],
        );
        let (analyzer, _config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, MSG_BAD_REPLY);
    }

    #[tokio::test]
    async fn unconfigured_fallback_yields_failure_result() {
        let primary = MockProvider::unconfigured("gemini");
        let fallback = MockProvider::new(
            "openrouter",
            vec![Err(ProviderError::MissingCredential("openrouter".into()))],
        );
        let (analyzer, _config) = analyzer(&primary, &fallback);

        let result = analyzer.analyze(&request()).await;
        assert_eq!(result.summary.recomendacao, MSG_ANALYSIS_FAILED);
    }

    #[test]
    fn task_failure_shape() {
        let result = task_failure("t9");
        assert_eq!(result.id, "t9");
        assert_eq!(result.summary.recomendacao, MSG_TASK_FAILED);
        assert_eq!(result.summary.riscos, vec![RISK_TASK_FAILED]);
    }
}
