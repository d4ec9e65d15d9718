//! Specialist analysis tasks.
//!
//! Each specialist declares its identity, the insight categories it may
//! emit, and a natural-language brief, then runs the shared execution
//! procedure: subscribe, short-circuit on missing evidence, bundle the
//! evidence, call the capability, broadcast high-impact findings.

use crate::agents::capability::{AnalysisCapability, EvidenceBundle};
use crate::bus::TaskBus;
use crate::error::PipelineError;
use crate::models::{
    Insight, InsightCategory, Message, MessageType, Recipient, SessionContext, TaskId,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Findings with an absolute impact above this are broadcast to peers.
const BROADCAST_IMPACT_THRESHOLD: f64 = 20.0;

/// How long a task waits on a correlated peer query before treating the
/// answer as absent evidence.
const PEER_QUERY_TIMEOUT: Duration = Duration::from_millis(150);

/// One concurrently-runnable analysis task.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    fn id(&self) -> TaskId;

    /// Categories this task is authorized to emit.
    fn categories(&self) -> &[InsightCategory];

    async fn execute(
        &self,
        context: &SessionContext,
        bus: &Arc<TaskBus>,
    ) -> Result<Vec<Insight>, PipelineError>;
}

/// A specialist backed by the injected analysis capability.
pub struct SpecialistAgent {
    id: TaskId,
    categories: Vec<InsightCategory>,
    brief: &'static str,
    calibration_hints: Vec<String>,
    capability: Arc<dyn AnalysisCapability>,
    /// Peer this task queries before analyzing, if any.
    peer_query: Option<TaskId>,
}

impl SpecialistAgent {
    pub fn new(
        id: TaskId,
        categories: Vec<InsightCategory>,
        brief: &'static str,
        calibration_hints: Vec<String>,
        capability: Arc<dyn AnalysisCapability>,
        peer_query: Option<TaskId>,
    ) -> Self {
        Self {
            id,
            categories,
            brief,
            calibration_hints,
            capability,
            peer_query,
        }
    }
}

#[async_trait]
impl AnalysisTask for SpecialistAgent {
    fn id(&self) -> TaskId {
        self.id
    }

    fn categories(&self) -> &[InsightCategory] {
        &self.categories
    }

    async fn execute(
        &self,
        context: &SessionContext,
        bus: &Arc<TaskBus>,
    ) -> Result<Vec<Insight>, PipelineError> {
        let mut subscription = bus.subscribe(self.id);

        if !context.has_evidence() {
            info!("{}: no usable evidence, returning neutral insight", self.id);
            return Ok(vec![Insight::insufficient_data(self.id)]);
        }

        // Peer broadcasts that arrived before our own analysis; zero, one,
        // or many, in no guaranteed order.
        let mut peer_messages = subscription.drain();

        // Answer any correlated queries that arrived while we were idle.
        for message in &peer_messages {
            if message.message_type == MessageType::Query && message.correlation_id.is_some() {
                let _ = bus.respond(message, self.id, json!({"status": "analyzing"}));
            }
        }

        // Best-effort peer check; a timed-out or cleared request is absent
        // evidence, not a failure.
        if let Some(peer) = self.peer_query {
            match bus
                .request(
                    self.id,
                    peer,
                    MessageType::Query,
                    json!({"question": "status"}),
                    PEER_QUERY_TIMEOUT,
                )
                .await
            {
                Ok(response) => peer_messages.push(response),
                Err(e) => debug!("{}: peer {} unavailable: {}", self.id, peer, e),
            }
        }

        let bundle = EvidenceBundle::from_context(
            self.id,
            context,
            peer_messages,
            self.calibration_hints.clone(),
        );

        let drafts = self.capability.analyze(self.brief, &bundle).await?;

        let mut insights = Vec::new();
        for draft in drafts {
            if !self.categories.contains(&draft.category) {
                warn!(
                    "{}: dropping insight \"{}\" with unauthorized category {}",
                    self.id, draft.title, draft.category
                );
                continue;
            }

            let insight = Insight {
                task_id: self.id,
                category: draft.category,
                title: draft.title,
                description: draft.description,
                confidence: draft.confidence,
                impact: draft.impact,
                evidence: draft.evidence.unwrap_or_default(),
                reasoning: draft.reasoning,
            };

            if insight.impact.abs() > BROADCAST_IMPACT_THRESHOLD {
                bus.send(Message {
                    id: Uuid::new_v4().to_string(),
                    from: self.id,
                    to: Recipient::Broadcast,
                    message_type: MessageType::Finding,
                    payload: json!({
                        "category": insight.category,
                        "title": insight.title,
                        "impact": insight.impact,
                    }),
                    timestamp: Utc::now(),
                    correlation_id: None,
                });
            }

            insights.push(insight);
        }

        info!("{}: produced {} insights", self.id, insights.len());
        Ok(insights)
    }
}

/// Analysis brief for the financial specialist.
const FINANCIAL_BRIEF: &str = r#"Assess the company's financial health for lending purposes.
Focus on profitability, margins, cash position, burn and runway, and how
dependent revenue is on the largest customers. Weigh parsed statements by
their confidence and trust scores. Emit financial_health, cash_flow, and
concentration insights."#;

/// Analysis brief for the legal specialist.
const LEGAL_BRIEF: &str = r#"Assess legal and compliance standing for lending purposes.
Check which required filings are present (tax filings, insurance
certificates), whether customer contracts exist, and any obligations
visible in the evidence. Emit legal and compliance insights."#;

/// Analysis brief for the forecasting specialist.
const FORECAST_BRIEF: &str = r#"Forecast the company's revenue trajectory for lending purposes.
Focus on growth rate, customer churn and retention, and the revenue trend
across statement years. Emit growth and retention insights."#;

/// Build the three registered specialists, all sharing one capability.
pub fn default_specialists(
    capability: Arc<dyn AnalysisCapability>,
    calibration_hints: Vec<String>,
) -> Vec<Arc<dyn AnalysisTask>> {
    vec![
        Arc::new(SpecialistAgent::new(
            TaskId::Financial,
            vec![
                InsightCategory::FinancialHealth,
                InsightCategory::CashFlow,
                InsightCategory::Concentration,
                InsightCategory::DataQuality,
            ],
            FINANCIAL_BRIEF,
            calibration_hints.clone(),
            capability.clone(),
            Some(TaskId::Legal),
        )),
        Arc::new(SpecialistAgent::new(
            TaskId::Legal,
            vec![
                InsightCategory::Legal,
                InsightCategory::Compliance,
                InsightCategory::DataQuality,
            ],
            LEGAL_BRIEF,
            calibration_hints.clone(),
            capability.clone(),
            None,
        )),
        Arc::new(SpecialistAgent::new(
            TaskId::Forecast,
            vec![
                InsightCategory::Growth,
                InsightCategory::Retention,
                InsightCategory::DataQuality,
            ],
            FORECAST_BRIEF,
            calibration_hints,
            capability,
            None,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::capability::InsightDraft;
    use crate::models::PaymentSnapshot;

    /// Capability returning a fixed draft list.
    struct FixedCapability {
        drafts: Vec<InsightDraft>,
    }

    #[async_trait]
    impl AnalysisCapability for FixedCapability {
        async fn analyze(
            &self,
            _brief: &str,
            _bundle: &EvidenceBundle,
        ) -> Result<Vec<InsightDraft>, PipelineError> {
            Ok(self.drafts.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn context_with_payments() -> SessionContext {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.payments = Some(PaymentSnapshot {
            mrr: 10_000.0,
            customer_count: 5,
            ..Default::default()
        });
        ctx
    }

    fn draft(category: InsightCategory, impact: f64) -> InsightDraft {
        InsightDraft {
            category,
            title: format!("{} finding", category),
            description: String::new(),
            impact,
            confidence: 0.9,
            reasoning: String::new(),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn test_no_evidence_short_circuits_with_neutral_insight() {
        let bus = Arc::new(TaskBus::new());
        let ctx = SessionContext::new("s-1".to_string(), "acme");
        let agent = SpecialistAgent::new(
            TaskId::Financial,
            vec![InsightCategory::FinancialHealth],
            FINANCIAL_BRIEF,
            Vec::new(),
            Arc::new(FixedCapability {
                drafts: vec![draft(InsightCategory::FinancialHealth, 30.0)],
            }),
            None,
        );

        let insights = agent.execute(&ctx, &bus).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].impact, 0.0);
        assert_eq!(insights[0].category, InsightCategory::DataQuality);
    }

    #[tokio::test]
    async fn test_high_impact_insight_is_broadcast() {
        let bus = Arc::new(TaskBus::new());
        let mut peer = bus.subscribe(TaskId::Legal);
        let ctx = context_with_payments();

        let agent = SpecialistAgent::new(
            TaskId::Financial,
            vec![InsightCategory::FinancialHealth],
            FINANCIAL_BRIEF,
            Vec::new(),
            Arc::new(FixedCapability {
                drafts: vec![
                    draft(InsightCategory::FinancialHealth, -28.0),
                    draft(InsightCategory::FinancialHealth, 5.0),
                ],
            }),
            None,
        );

        let insights = agent.execute(&ctx, &bus).await.unwrap();
        assert_eq!(insights.len(), 2);

        // Only the |impact| > 20 finding reaches peers.
        let received = peer.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload["impact"], -28.0);
    }

    #[tokio::test]
    async fn test_unauthorized_category_is_dropped() {
        let bus = Arc::new(TaskBus::new());
        let ctx = context_with_payments();

        let agent = SpecialistAgent::new(
            TaskId::Legal,
            vec![InsightCategory::Legal, InsightCategory::Compliance],
            LEGAL_BRIEF,
            Vec::new(),
            Arc::new(FixedCapability {
                drafts: vec![
                    draft(InsightCategory::Legal, 10.0),
                    draft(InsightCategory::Growth, 10.0),
                ],
            }),
            None,
        );

        let insights = agent.execute(&ctx, &bus).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, InsightCategory::Legal);
    }

    #[tokio::test]
    async fn test_task_unsubscribes_when_done() {
        let bus = Arc::new(TaskBus::new());
        let ctx = context_with_payments();
        let agent = SpecialistAgent::new(
            TaskId::Forecast,
            vec![InsightCategory::Growth],
            FORECAST_BRIEF,
            Vec::new(),
            Arc::new(FixedCapability { drafts: Vec::new() }),
            None,
        );

        agent.execute(&ctx, &bus).await.unwrap();

        // A broadcast after completion reaches nobody and is only logged.
        bus.send(Message {
            id: Uuid::new_v4().to_string(),
            from: TaskId::Financial,
            to: Recipient::Broadcast,
            message_type: MessageType::Finding,
            payload: json!({}),
            timestamp: Utc::now(),
            correlation_id: None,
        });
        assert_eq!(bus.delivered_log().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_query_timeout_is_absent_evidence() {
        let bus = Arc::new(TaskBus::new());
        let ctx = context_with_payments();

        // Queries the legal task, which never subscribed; the request
        // times out and the analysis proceeds regardless.
        let agent = SpecialistAgent::new(
            TaskId::Financial,
            vec![InsightCategory::FinancialHealth],
            FINANCIAL_BRIEF,
            Vec::new(),
            Arc::new(FixedCapability {
                drafts: vec![draft(InsightCategory::FinancialHealth, 5.0)],
            }),
            Some(TaskId::Legal),
        );

        let insights = agent.execute(&ctx, &bus).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(bus.pending_len(), 0);
    }

    #[test]
    fn test_default_specialists_cover_all_task_ids() {
        let specialists =
            default_specialists(Arc::new(FixedCapability { drafts: Vec::new() }), Vec::new());
        let ids: Vec<TaskId> = specialists.iter().map(|s| s.id()).collect();
        assert_eq!(ids, TaskId::ALL.to_vec());
    }
}
