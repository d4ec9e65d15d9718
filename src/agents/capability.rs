//! The external analysis capability and its evidence bundle.
//!
//! The capability is injected behind a trait so the orchestration core can
//! run against a deterministic implementation in tests and offline mode.
//! The live implementation talks to Ollama's chat API with a strict
//! response-shape contract.

use crate::audit::{AuditEntry, AuditTrail};
use crate::error::PipelineError;
use crate::findata;
use crate::models::{
    BankingSnapshot, DocumentType, InsightCategory, Message, PaymentSnapshot, SessionContext,
    TaskId, IMPACT_MAX, IMPACT_MIN,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum characters of raw text carried per document.
const MAX_EXCERPT_CHARS: usize = 400;

/// Capability call attempts before giving up on malformed output.
const MAX_ATTEMPTS: usize = 3;

/// Compact document view shipped to the capability.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub filename: String,
    pub confidence: f64,
    pub trust_score: f64,
    pub data: serde_json::Value,
    pub excerpt: String,
}

/// Everything one task hands to the analysis capability.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceBundle {
    pub task: TaskId,
    pub subject_id: String,
    pub documents: Vec<DocumentSummary>,
    pub payments: Option<PaymentSnapshot>,
    pub banking: Option<BankingSnapshot>,
    /// Peer broadcasts received before this task's own analysis ran.
    pub peer_findings: Vec<serde_json::Value>,
    /// Industry-specific calibration hints.
    pub calibration_hints: Vec<String>,
}

impl EvidenceBundle {
    pub fn from_context(
        task: TaskId,
        ctx: &SessionContext,
        peer_messages: Vec<Message>,
        calibration_hints: Vec<String>,
    ) -> Self {
        let documents = ctx
            .documents
            .iter()
            .map(|d| DocumentSummary {
                doc_type: d.doc_type,
                filename: d.filename.clone(),
                confidence: d.confidence,
                trust_score: d.trust_score,
                data: d.data.clone(),
                excerpt: d.raw_text.chars().take(MAX_EXCERPT_CHARS).collect(),
            })
            .collect();

        Self {
            task,
            subject_id: ctx.subject_id.clone(),
            documents,
            payments: ctx.payments.clone(),
            banking: ctx.banking.clone(),
            peer_findings: peer_messages.into_iter().map(|m| m.payload).collect(),
            calibration_hints,
        }
    }
}

/// One insight as returned by the capability, before task stamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightDraft {
    pub category: InsightCategory,
    pub title: String,
    pub description: String,
    /// Signed impact in [-40, +40].
    pub impact: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub evidence: Option<Vec<String>>,
}

/// Strict response shape the capability must return.
#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    insights: Vec<InsightDraft>,
}

/// The external, non-deterministic analysis call, behind a trait.
#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    /// Run the brief against the evidence bundle and return validated
    /// insight drafts, or a typed error.
    async fn analyze(
        &self,
        brief: &str,
        bundle: &EvidenceBundle,
    ) -> Result<Vec<InsightDraft>, PipelineError>;

    fn model_name(&self) -> &str;
}

/// Check the ranged fields of every draft.
fn validate_drafts(drafts: &[InsightDraft]) -> Result<(), String> {
    for draft in drafts {
        if !(IMPACT_MIN..=IMPACT_MAX).contains(&draft.impact) {
            return Err(format!(
                "impact {} outside [{}, {}] on \"{}\"",
                draft.impact, IMPACT_MIN, IMPACT_MAX, draft.title
            ));
        }
        if !(0.0..=1.0).contains(&draft.confidence) {
            return Err(format!(
                "confidence {} outside [0, 1] on \"{}\"",
                draft.confidence, draft.title
            ));
        }
    }
    Ok(())
}

/// Pull the outermost JSON object out of a model response, tolerating
/// code fences and surrounding prose.
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// Parse and validate a raw capability response.
fn parse_response(raw: &str) -> Result<Vec<InsightDraft>, String> {
    let json = extract_json(raw).ok_or("no JSON object in response")?;
    let response: AnalysisResponse =
        serde_json::from_str(json).map_err(|e| format!("malformed insights payload: {}", e))?;
    validate_drafts(&response.insights)?;
    Ok(response.insights)
}

/// System prompt shared by every specialist call.
const ANALYST_SYSTEM_PROMPT: &str = r#"You are a credit analyst assessing a company's bankability.
Work only from the evidence bundle you are given; never invent figures.
Respond with a single JSON object of the exact shape
{"insights": [{"category": "...", "title": "...", "description": "...", "impact": 0, "confidence": 0.0, "reasoning": "...", "evidence": ["..."]}]}
where impact is between -40 and 40 and confidence between 0 and 1.
Only output valid JSON, no explanations or markdown."#;

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Configuration for the live Ollama capability.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// Live analysis capability backed by Ollama's chat API.
pub struct OllamaCapability {
    config: OllamaConfig,
    http_client: reqwest::Client,
    audit: Arc<AuditTrail>,
}

impl OllamaCapability {
    pub fn new(config: OllamaConfig, audit: Arc<AuditTrail>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
            audit,
        }
    }

    fn build_prompt(&self, brief: &str, bundle: &EvidenceBundle) -> String {
        let evidence = serde_json::to_string_pretty(bundle)
            .unwrap_or_else(|_| "{}".to_string());

        let mut prompt = String::new();
        prompt.push_str(brief);
        prompt.push_str("\n\n=== EVIDENCE BUNDLE ===\n");
        prompt.push_str(&evidence);
        prompt.push_str("\n=== END OF EVIDENCE ===\n\n");
        prompt.push_str("Now produce your insights as JSON:");
        prompt
    }

    async fn send_chat(&self, prompt: &str) -> Result<OllamaChatResponse, PipelineError> {
        let url = format!("{}/api/chat", self.config.url);

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: ANALYST_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Capability(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    PipelineError::Capability(format!(
                        "cannot connect to Ollama at {}",
                        self.config.url
                    ))
                } else {
                    PipelineError::Capability(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Capability(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::Capability(format!("failed to parse Ollama response: {}", e)))
    }
}

#[async_trait]
impl AnalysisCapability for OllamaCapability {
    async fn analyze(
        &self,
        brief: &str,
        bundle: &EvidenceBundle,
    ) -> Result<Vec<InsightDraft>, PipelineError> {
        let prompt = self.build_prompt(brief, bundle);
        let mut last_reason = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let started = Instant::now();
            let chat = self.send_chat(&prompt).await?;
            let content = chat.message.content;

            self.audit.record(AuditEntry {
                agent: bundle.task,
                timestamp: Utc::now(),
                prompt_chars: prompt.len(),
                response_chars: content.len(),
                latency_ms: started.elapsed().as_millis() as u64,
                attempt,
                prompt_tokens: chat.prompt_eval_count,
                completion_tokens: chat.eval_count,
            });

            match parse_response(&content) {
                Ok(drafts) => {
                    debug!(
                        "{}: parsed {} insights on attempt {}",
                        bundle.task,
                        drafts.len(),
                        attempt
                    );
                    return Ok(drafts);
                }
                Err(reason) => {
                    warn!(
                        "{}: malformed analysis output (attempt {}/{}): {}",
                        bundle.task, attempt, MAX_ATTEMPTS, reason
                    );
                    last_reason = reason;
                }
            }
        }

        Err(PipelineError::AnalysisUnparseable {
            attempts: MAX_ATTEMPTS,
            reason: last_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Deterministic capability for offline runs and tests. Derives a small
/// set of insights from the bundle with fixed rules.
pub struct HeuristicCapability;

impl HeuristicCapability {
    fn financial_insights(bundle: &EvidenceBundle) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        for doc in &bundle.documents {
            if doc.doc_type != DocumentType::ProfitAndLoss {
                continue;
            }
            let revenue = findata::find_number(&doc.data, findata::REVENUE_KEYS);
            let net_income = findata::find_number(&doc.data, findata::NET_INCOME_KEYS);
            if let (Some(revenue), Some(net_income)) = (revenue, net_income) {
                if revenue > 0.0 {
                    let margin = net_income / revenue;
                    let impact = (margin * 100.0).clamp(-30.0, 30.0);
                    drafts.push(InsightDraft {
                        category: InsightCategory::FinancialHealth,
                        title: if net_income >= 0.0 {
                            "Profitable operations".to_string()
                        } else {
                            "Operating at a loss".to_string()
                        },
                        description: format!(
                            "Latest statement shows a net margin of {:.1}%.",
                            margin * 100.0
                        ),
                        impact,
                        confidence: doc.confidence.min(doc.trust_score),
                        reasoning: "Net income relative to revenue from the parsed statement."
                            .to_string(),
                        evidence: Some(vec![doc.filename.clone()]),
                    });
                }
                break;
            }
        }

        if let Some(banking) = &bundle.banking {
            if banking.cash_flow.runway_months > 0.0 && banking.cash_flow.runway_months < 6.0 {
                drafts.push(InsightDraft {
                    category: InsightCategory::CashFlow,
                    title: "Short cash runway".to_string(),
                    description: format!(
                        "Only {:.1} months of runway at the current burn rate.",
                        banking.cash_flow.runway_months
                    ),
                    impact: -25.0,
                    confidence: 0.9,
                    reasoning: "Runway below six months from the banking snapshot.".to_string(),
                    evidence: Some(vec!["banking snapshot".to_string()]),
                });
            }
        }

        drafts
    }

    fn legal_insights(bundle: &EvidenceBundle) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        let has_tax = bundle
            .documents
            .iter()
            .any(|d| d.doc_type == DocumentType::TaxFiling);
        if !has_tax && !bundle.documents.is_empty() {
            drafts.push(InsightDraft {
                category: InsightCategory::Compliance,
                title: "No tax filing on record".to_string(),
                description: "The document set contains no tax filing.".to_string(),
                impact: -12.0,
                confidence: 0.8,
                reasoning: "Required filing absent from the evidence.".to_string(),
                evidence: None,
            });
        }

        if bundle
            .documents
            .iter()
            .any(|d| d.doc_type == DocumentType::Contract)
        {
            drafts.push(InsightDraft {
                category: InsightCategory::Legal,
                title: "Customer contracts documented".to_string(),
                description: "At least one executed contract was provided.".to_string(),
                impact: 6.0,
                confidence: 0.7,
                reasoning: "Contract coverage reduces revenue enforceability risk.".to_string(),
                evidence: None,
            });
        }

        drafts
    }

    fn forecast_insights(bundle: &EvidenceBundle) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        if let Some(payments) = &bundle.payments {
            if payments.churn_rate > 0.08 {
                drafts.push(InsightDraft {
                    category: InsightCategory::Retention,
                    title: "Elevated customer churn".to_string(),
                    description: format!(
                        "Monthly churn of {:.1}% erodes recurring revenue.",
                        payments.churn_rate * 100.0
                    ),
                    impact: -22.0,
                    confidence: 0.85,
                    reasoning: "Churn above 8% monthly in the payment snapshot.".to_string(),
                    evidence: Some(vec!["payment snapshot".to_string()]),
                });
            }
            if payments.growth_rate > 0.05 {
                drafts.push(InsightDraft {
                    category: InsightCategory::Growth,
                    title: "Healthy revenue growth".to_string(),
                    description: format!(
                        "Revenue growing {:.1}% month over month.",
                        payments.growth_rate * 100.0
                    ),
                    impact: 15.0,
                    confidence: 0.8,
                    reasoning: "Growth rate from the payment snapshot.".to_string(),
                    evidence: Some(vec!["payment snapshot".to_string()]),
                });
            }
        }

        drafts
    }
}

#[async_trait]
impl AnalysisCapability for HeuristicCapability {
    async fn analyze(
        &self,
        _brief: &str,
        bundle: &EvidenceBundle,
    ) -> Result<Vec<InsightDraft>, PipelineError> {
        let mut drafts = match bundle.task {
            TaskId::Financial => Self::financial_insights(bundle),
            TaskId::Legal => Self::legal_insights(bundle),
            TaskId::Forecast => Self::forecast_insights(bundle),
        };

        if drafts.is_empty() {
            drafts.push(InsightDraft {
                category: InsightCategory::DataQuality,
                title: "No notable findings".to_string(),
                description: "The deterministic rules matched nothing in the evidence."
                    .to_string(),
                impact: 0.0,
                confidence: 0.6,
                reasoning: "Offline heuristic pass.".to_string(),
                evidence: None,
            });
        }

        Ok(drafts)
    }

    fn model_name(&self) -> &str {
        "heuristic-offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_fences_and_prose() {
        let raw = "Here you go:\n```json\n{\"insights\": []}\n```\nDone.";
        let json = extract_json(raw).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(parse_response(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_response_rejects_out_of_range_impact() {
        let raw = r#"{"insights": [{"category": "growth", "title": "t", "description": "d",
            "impact": 75.0, "confidence": 0.5}]}"#;
        let err = parse_response(raw).unwrap_err();
        assert!(err.contains("impact"));
    }

    #[test]
    fn test_parse_response_rejects_bad_confidence() {
        let raw = r#"{"insights": [{"category": "growth", "title": "t", "description": "d",
            "impact": 10.0, "confidence": 1.5}]}"#;
        assert!(parse_response(raw).unwrap_err().contains("confidence"));
    }

    #[test]
    fn test_parse_response_rejects_missing_shape() {
        assert!(parse_response("no json here").is_err());
        assert!(parse_response(r#"{"findings": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_heuristic_flags_churn_and_growth() {
        let bundle = EvidenceBundle {
            task: TaskId::Forecast,
            subject_id: "acme".to_string(),
            documents: Vec::new(),
            payments: Some(PaymentSnapshot {
                mrr: 50_000.0,
                growth_rate: 0.09,
                customer_count: 40,
                churn_rate: 0.12,
                ..Default::default()
            }),
            banking: None,
            peer_findings: Vec::new(),
            calibration_hints: Vec::new(),
        };

        let drafts = HeuristicCapability.analyze("", &bundle).await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().any(|d| d.category == InsightCategory::Retention));
        assert!(drafts.iter().any(|d| d.category == InsightCategory::Growth));
        validate_drafts(&drafts).unwrap();
    }

    #[tokio::test]
    async fn test_heuristic_returns_neutral_when_nothing_matches() {
        let bundle = EvidenceBundle {
            task: TaskId::Legal,
            subject_id: "acme".to_string(),
            documents: Vec::new(),
            payments: None,
            banking: None,
            peer_findings: Vec::new(),
            calibration_hints: Vec::new(),
        };

        let drafts = HeuristicCapability.analyze("", &bundle).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].impact, 0.0);
    }
}
