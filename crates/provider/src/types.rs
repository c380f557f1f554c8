//! Request and result types shared by all adapters
//!
//! Field names follow the wire contract of the analysis API: requests and
//! stored results are serialized with the Portuguese camelCase names the
//! frontend and persistence layer expect (`tipoImovel`, `valorEstimado`,
//! `detalhesLeilao`, ...). `html_content` is the one snake_case exception,
//! kept for compatibility with the stored-report column name.

use serde::{Deserialize, Serialize};

use crate::extract::{self, HTML_END, HTML_START, JSON_END, JSON_START};
use crate::{ProviderError, Result};

/// Placeholder for fields the analysis could not fill.
pub const NOT_AVAILABLE: &str = "Não disponível";

/// Immutable input to one analysis: the auction-notice PDF (base64), an
/// optional registry-deed PDF, and the user-supplied property metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub id: String,
    pub file_name: String,
    /// Auction-notice PDF, base64-encoded
    pub file_content: String,
    /// Registry-deed (matrícula) PDF, base64-encoded, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_matricula_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_matricula_name: Option<String>,
    #[serde(default)]
    pub tipo_imovel: String,
    #[serde(default)]
    pub matricula: String,
    #[serde(default)]
    pub estado: String,
    #[serde(default)]
    pub cidade: String,
    #[serde(default)]
    pub instrucoes: String,
}

/// Structured property details extracted from the notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetails {
    #[serde(default)]
    pub endereco: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub descricao: String,
}

/// Structured auction details extracted from the notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDetails {
    #[serde(default)]
    pub data_leilao: String,
    #[serde(default)]
    pub valor_inicial: String,
    #[serde(default)]
    pub incremento_minimo: String,
    #[serde(default)]
    pub formas_pagamento: Vec<String>,
}

/// The summary block the model returns between the JSON markers.
///
/// Every field defaults so a partially filled model reply still
/// deserializes; serialization always emits the full shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    #[serde(default)]
    pub recomendacao: String,
    #[serde(default)]
    pub riscos: Vec<String>,
    #[serde(default)]
    pub oportunidades: Vec<String>,
    #[serde(default)]
    pub valor_estimado: String,
    #[serde(default)]
    pub detalhes_imovel: PropertyDetails,
    #[serde(default)]
    pub detalhes_leilao: AuctionDetails,
    #[serde(default)]
    pub analise_juridica: String,
    #[serde(default)]
    pub analise_financeira: String,
}

/// Output of one analysis. Produced exactly once per request, immutable
/// after creation; both success and failure paths yield the full shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    #[serde(rename = "html_content", default)]
    pub html_content: String,
}

impl AnalysisResult {
    /// Parse a raw model reply into a result.
    ///
    /// Pulls the JSON summary and the HTML report out of the free-text
    /// reply via the marker extractor. Either segment missing, or a summary
    /// that does not parse as JSON, is a format error, never a quota
    /// error, so the orchestrator will not fall back for it.
    pub fn from_model_reply(id: &str, raw: &str) -> Result<Self> {
        let json_segment = extract::extract_segment(raw, JSON_START, JSON_END);
        let html_segment = extract::extract_segment(raw, HTML_START, HTML_END);

        let (json_segment, html_content) = match (json_segment, html_segment) {
            (Some(j), Some(h)) => (j, h),
            _ => {
                return Err(ProviderError::Format(
                    "Formato de resposta inválido da API".into(),
                ));
            }
        };

        let summary: AnalysisSummary = serde_json::from_str(&json_segment).map_err(|e| {
            ProviderError::Format(format!("Erro ao processar o JSON da resposta da API: {e}"))
        })?;

        Ok(Self {
            id: id.to_string(),
            summary,
            html_content,
        })
    }

    /// Build the well-formed failure shape: every field present, the
    /// recommendation carrying a human-readable message, and a single
    /// diagnostic risk entry.
    pub fn failure(id: &str, mensagem: &str, risco: &str) -> Self {
        Self {
            id: id.to_string(),
            summary: AnalysisSummary {
                recomendacao: mensagem.to_string(),
                riscos: vec![risco.to_string()],
                oportunidades: Vec::new(),
                valor_estimado: NOT_AVAILABLE.to_string(),
                detalhes_imovel: PropertyDetails {
                    endereco: NOT_AVAILABLE.to_string(),
                    area: NOT_AVAILABLE.to_string(),
                    descricao: NOT_AVAILABLE.to_string(),
                },
                detalhes_leilao: AuctionDetails {
                    data_leilao: NOT_AVAILABLE.to_string(),
                    valor_inicial: NOT_AVAILABLE.to_string(),
                    incremento_minimo: NOT_AVAILABLE.to_string(),
                    formas_pagamento: vec![NOT_AVAILABLE.to_string()],
                },
                analise_juridica: "Não foi possível realizar a análise jurídica.".to_string(),
                analise_financeira: "Não foi possível realizar a análise financeira.".to_string(),
            },
            html_content: error_html(mensagem),
        }
    }
}

/// Minimal self-contained error report page, shown in place of the
/// model-generated HTML when the analysis failed.
fn error_html(mensagem: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Erro na Análise</title>
  <style>
    body {{ font-family: Arial, sans-serif; text-align: center; padding: 40px; color: #333; }}
    .error-container {{ max-width: 600px; margin: 0 auto; padding: 30px; background-color: #fff3f3; border-radius: 8px; }}
    h1 {{ color: #e74c3c; }}
    p {{ font-size: 16px; line-height: 1.6; }}
  </style>
</head>
<body>
  <div class="error-container">
    <h1>Erro na Análise</h1>
    <p>{mensagem}</p>
    <p>Por favor, tente novamente mais tarde ou entre em contato com o suporte se o problema persistir.</p>
  </div>
</body>
</html>
"#
    )
}
