//! Data models for the bankability pipeline.
//!
//! This module contains all the core data structures used throughout
//! the application: evidence inputs, insights, risk factors, scores,
//! and remediation plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an analysis task (one per specialist).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskId {
    /// Financial-statement and cash-flow analyst.
    Financial,
    /// Legal and compliance analyst.
    Legal,
    /// Growth and retention forecaster.
    Forecast,
}

impl TaskId {
    /// All registered task identities, in canonical order.
    pub const ALL: [TaskId; 3] = [TaskId::Financial, TaskId::Legal, TaskId::Forecast];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::Financial => "financial",
            TaskId::Legal => "legal",
            TaskId::Forecast => "forecast",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification tag of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ProfitAndLoss,
    BalanceSheet,
    Contract,
    BankStatement,
    TaxFiling,
    InsuranceCertificate,
    Other,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentType::ProfitAndLoss => "Profit & Loss",
            DocumentType::BalanceSheet => "Balance Sheet",
            DocumentType::Contract => "Contract",
            DocumentType::BankStatement => "Bank Statement",
            DocumentType::TaxFiling => "Tax Filing",
            DocumentType::InsuranceCertificate => "Insurance Certificate",
            DocumentType::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

/// A parsed evidence document. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Classification of the document.
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Original filename.
    pub filename: String,
    /// When the document was parsed.
    pub parsed_at: DateTime<Utc>,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    /// Extracted structured data (untyped key/value tree).
    pub data: serde_json::Value,
    /// Raw text excerpt from the document.
    #[serde(default)]
    pub raw_text: String,
    /// Source reliability weight in [0, 1].
    pub trust_score: f64,
}

impl Document {
    /// Whether extraction produced any structured data at all.
    pub fn has_data(&self) -> bool {
        match &self.data {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

/// Revenue share of a single customer, as reported by the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerShare {
    pub name: String,
    /// Fraction of total revenue in [0, 1].
    pub share: f64,
}

/// Payment behavior summary from the payment processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentHistory {
    /// Fraction of invoices settled on time, in [0, 1].
    #[serde(default)]
    pub on_time_rate: f64,
    /// Invoices disputed or charged back in the reporting window.
    #[serde(default)]
    pub disputed_count: u32,
}

/// Normalized payment-processor snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    /// Monthly recurring revenue.
    pub mrr: f64,
    /// Month-over-month revenue growth rate (fraction, may be negative).
    #[serde(default)]
    pub growth_rate: f64,
    pub customer_count: u32,
    /// Monthly customer churn rate (fraction).
    #[serde(default)]
    pub churn_rate: f64,
    /// Largest customers by revenue share.
    #[serde(default)]
    pub top_customers: Vec<CustomerShare>,
    #[serde(default)]
    pub payment_history: PaymentHistory,
}

impl PaymentSnapshot {
    /// Whether the snapshot carries any informative fields.
    pub fn is_informative(&self) -> bool {
        self.mrr > 0.0 || self.customer_count > 0 || !self.top_customers.is_empty()
    }
}

/// A single bank account balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub name: String,
    pub balance: f64,
}

/// Aggregated transaction flows over the reporting window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionSummary {
    #[serde(default)]
    pub inflow_90d: f64,
    #[serde(default)]
    pub outflow_90d: f64,
}

/// Cash-flow metrics derived from banking data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashFlowMetrics {
    /// Monthly net cash burn (positive means losing cash).
    #[serde(default)]
    pub burn_rate: f64,
    /// Months of runway at the current burn rate.
    #[serde(default)]
    pub runway_months: f64,
    /// Net monthly cash flow (inflow minus outflow).
    #[serde(default)]
    pub net_cash_flow: f64,
}

/// Normalized banking snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankingSnapshot {
    #[serde(default)]
    pub accounts: Vec<BankAccount>,
    #[serde(default)]
    pub transactions: TransactionSummary,
    #[serde(default)]
    pub cash_flow: CashFlowMetrics,
}

impl BankingSnapshot {
    /// Whether the snapshot carries any informative fields.
    pub fn is_informative(&self) -> bool {
        !self.accounts.is_empty()
            || self.cash_flow.runway_months > 0.0
            || self.cash_flow.net_cash_flow != 0.0
            || self.transactions.inflow_90d > 0.0
    }
}

/// External snapshot, at most one per source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Snapshot {
    Payments(PaymentSnapshot),
    Banking(BankingSnapshot),
}

/// Category of an insight produced by an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    FinancialHealth,
    CashFlow,
    Concentration,
    Legal,
    Compliance,
    Growth,
    Retention,
    DataQuality,
}

impl fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsightCategory::FinancialHealth => "Financial Health",
            InsightCategory::CashFlow => "Cash Flow",
            InsightCategory::Concentration => "Concentration",
            InsightCategory::Legal => "Legal",
            InsightCategory::Compliance => "Compliance",
            InsightCategory::Growth => "Growth",
            InsightCategory::Retention => "Retention",
            InsightCategory::DataQuality => "Data Quality",
        };
        write!(f, "{}", name)
    }
}

/// Bounds of the signed insight impact range.
pub const IMPACT_MIN: f64 = -40.0;
pub const IMPACT_MAX: f64 = 40.0;

/// A single typed finding produced by exactly one analysis task.
/// Immutable once created; insights are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// The task that produced this insight.
    pub task_id: TaskId,
    pub category: InsightCategory,
    pub title: String,
    pub description: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Signed impact in [-40, +40].
    pub impact: f64,
    /// References to the evidence supporting the finding.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Free-text reasoning.
    #[serde(default)]
    pub reasoning: String,
}

impl Insight {
    /// Neutral insight emitted when a task has no usable evidence to analyze.
    pub fn insufficient_data(task_id: TaskId) -> Self {
        Self {
            task_id,
            category: InsightCategory::DataQuality,
            title: "Insufficient data".to_string(),
            description: format!(
                "The {} analysis found no documents or informative snapshot fields to work from.",
                task_id
            ),
            confidence: 1.0,
            impact: 0.0,
            evidence: Vec::new(),
            reasoning: "No evidence was available; no score contribution is fabricated."
                .to_string(),
        }
    }
}

/// Two insights in the same category pulling in strongly opposite directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub category: InsightCategory,
    /// Title of the positive-impact insight.
    pub positive: String,
    /// Title of the negative-impact insight.
    pub negative: String,
    pub detail: String,
}

/// One of the four weighted risk dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    Serviceability,
    Concentration,
    Retention,
    Compliance,
}

impl RiskFactorKind {
    /// Canonical factor order; ties elsewhere are broken by this order.
    pub const ALL: [RiskFactorKind; 4] = [
        RiskFactorKind::Serviceability,
        RiskFactorKind::Concentration,
        RiskFactorKind::Retention,
        RiskFactorKind::Compliance,
    ];

    /// Fixed factor weight; the four weights sum to 1.0.
    pub fn weight(&self) -> f64 {
        match self {
            RiskFactorKind::Serviceability => 0.30,
            RiskFactorKind::Concentration => 0.25,
            RiskFactorKind::Retention => 0.25,
            RiskFactorKind::Compliance => 0.20,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskFactorKind::Serviceability => "Serviceability",
            RiskFactorKind::Concentration => "Concentration",
            RiskFactorKind::Retention => "Retention",
            RiskFactorKind::Compliance => "Compliance",
        }
    }
}

impl fmt::Display for RiskFactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A sub-metric contributing to a risk factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskComponent {
    pub name: String,
    /// Component value in [0, 100].
    pub value: f64,
    /// Weight of this component within its factor.
    pub weight: f64,
    /// The raw metric the value was derived from, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
    /// Human interpretation of the metric.
    pub interpretation: String,
}

/// One weighted risk dimension with its component breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    /// Aggregate score in [0, 100].
    pub score: f64,
    /// Weight in [0, 1]; all four factors sum to 1.0.
    pub weight: f64,
    pub components: Vec<RiskComponent>,
    pub explanation: String,
}

/// The four risk factors, in canonical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskFactorMap {
    pub factors: Vec<RiskFactor>,
}

impl RiskFactorMap {
    pub fn get(&self, kind: RiskFactorKind) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.kind == kind)
    }

    /// Sum of the factor weights (1.0 for a well-formed map).
    pub fn weight_sum(&self) -> f64 {
        self.factors.iter().map(|f| f.weight).sum()
    }
}

/// Letter grade derived deterministically from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Step function over the final score (inclusive lower bounds).
    pub fn from_score(score: u32) -> Self {
        match score {
            80..=u32::MAX => Grade::A,
            65..=79 => Grade::B,
            50..=64 => Grade::C,
            35..=49 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        write!(f, "{}", letter)
    }
}

/// A penalty applied for a critical-threshold breach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePenalty {
    pub reason: String,
    /// Multiplier in (0, 1].
    pub multiplier: f64,
    /// Points removed from the raw score by this multiplier.
    pub points_lost: f64,
}

/// Structured explanation of a final score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreExplanation {
    /// Factors scoring 70 or above.
    pub strengths: Vec<String>,
    /// Factors scoring between 50 and 69.
    pub weaknesses: Vec<String>,
    /// Factors below 50, plus one line per applied penalty.
    pub critical_issues: Vec<String>,
    /// Full breakdown narrative with the penalty arithmetic.
    pub reasoning: String,
}

/// The composite creditworthiness measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankabilityScore {
    /// Final integer score in [0, 100].
    pub score: u32,
    pub grade: Grade,
    pub risk_factors: RiskFactorMap,
    pub penalties: Vec<ScorePenalty>,
    pub explanation: ScoreExplanation,
}

/// Difficulty tier of closing a score drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

impl Difficulty {
    /// Effort weight used in impact-per-effort and priority arithmetic.
    pub fn weight(&self) -> f64 {
        match self {
            Difficulty::Low => 1.0,
            Difficulty::Medium => 1.5,
            Difficulty::High => 2.0,
        }
    }

    /// One tier harder; saturates at High.
    pub fn bump(&self) -> Self {
        match self {
            Difficulty::Low => Difficulty::Medium,
            _ => Difficulty::High,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Low => "Low",
            Difficulty::Medium => "Medium",
            Difficulty::High => "High",
        };
        write!(f, "{}", name)
    }
}

/// A risk factor underperforming the remediation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDrag {
    pub factor: RiskFactorKind,
    pub current_score: f64,
    pub target: f64,
    /// Weighted points recovered if the gap is fully closed.
    pub impact_points: f64,
    pub difficulty: Difficulty,
    pub estimated_days: u32,
}

/// Category of a remediation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    QuickWin,
    Structural,
    Strategic,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskCategory::QuickWin => "Quick Win",
            TaskCategory::Structural => "Structural",
            TaskCategory::Strategic => "Strategic",
        };
        write!(f, "{}", name)
    }
}

/// A concrete remediation task generated from a score drag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationTask {
    /// Computed attractiveness; higher sorts first.
    pub priority: i64,
    pub factor: RiskFactorKind,
    pub title: String,
    pub description: String,
    /// Expected score gain from completing this task.
    pub expected_gain: f64,
    pub difficulty: Difficulty,
    pub estimated_days: u32,
    pub category: TaskCategory,
    pub actions: Vec<String>,
}

/// Rollup of one timeline bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub task_count: usize,
    pub max_days: u32,
    pub total_gain: f64,
}

/// Roadmap tasks bucketed by estimated duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    /// Tasks taking 14 days or fewer.
    pub quick_wins: TimelineBucket,
    /// Tasks taking 15 to 60 days.
    pub short_term: TimelineBucket,
    /// Tasks taking more than 60 days.
    pub long_term: TimelineBucket,
}

/// The prioritized remediation plan for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRoadmap {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub current_score: u32,
    /// Optimistic upper bound if every task lands; not a guarantee.
    pub projected_score: u32,
    pub drags: Vec<ScoreDrag>,
    pub tasks: Vec<RemediationTask>,
    pub timeline: Timeline,
}

/// Message type tag on the task bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A broadcast summary of a high-impact insight.
    Finding,
    /// A correlated question to a peer task.
    Query,
    /// The answer to a correlated query.
    Response,
}

/// Recipient of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Task(TaskId),
    Broadcast,
}

/// Inter-task message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: TaskId,
    pub to: Recipient,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Pairs a request with its response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// One analysis session's accumulated evidence and results.
///
/// Owned exclusively by the session context store and mutated only through
/// its append/set operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub subject_id: String,
    pub started_at: DateTime<Utc>,
    /// Ingested documents, in arrival order.
    pub documents: Vec<Document>,
    pub payments: Option<PaymentSnapshot>,
    pub banking: Option<BankingSnapshot>,
    /// Per-task insight log; append-only, insertion order preserved.
    pub insights: BTreeMap<TaskId, Vec<Insight>>,
    pub risk_factors: Option<RiskFactorMap>,
    pub contradictions: Vec<Contradiction>,
}

impl SessionContext {
    pub fn new(session_id: String, subject_id: &str) -> Self {
        Self {
            session_id,
            subject_id: subject_id.to_string(),
            started_at: Utc::now(),
            documents: Vec::new(),
            payments: None,
            banking: None,
            insights: BTreeMap::new(),
            risk_factors: None,
            contradictions: Vec::new(),
        }
    }

    /// Whether the context holds any usable evidence for analysis.
    pub fn has_evidence(&self) -> bool {
        !self.documents.is_empty()
            || self.payments.as_ref().is_some_and(|p| p.is_informative())
            || self.banking.as_ref().is_some_and(|b| b.is_informative())
    }

    /// Whether the context carries nothing at all (fresh session).
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
            && self.payments.is_none()
            && self.banking.is_none()
            && self.insights.is_empty()
    }

    /// All insights flattened in canonical task order, preserving each
    /// task's insertion order.
    pub fn all_insights(&self) -> Vec<Insight> {
        self.insights.values().flatten().cloned().collect()
    }

    /// Documents of the given type, in arrival order.
    pub fn documents_of_type(&self, doc_type: DocumentType) -> Vec<&Document> {
        self.documents
            .iter()
            .filter(|d| d.doc_type == doc_type)
            .collect()
    }
}
