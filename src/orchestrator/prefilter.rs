//! Obvious-case pre-filter.
//!
//! A pure function over the session context, evaluated before any analysis
//! task runs. Degenerate inputs whose outcome is mechanically certain get
//! a fixed score and a canned roadmap instead of paying for
//! non-deterministic analysis calls.

use crate::findata;
use crate::models::{
    BankabilityScore, Difficulty, DocumentType, Grade, RemediationRoadmap, RemediationTask,
    RiskComponent, RiskFactor, RiskFactorKind, RiskFactorMap, ScoreExplanation, SessionContext,
    TaskCategory, Timeline,
};
use chrono::Utc;
use serde::Serialize;
use std::fmt;

/// Degenerate input patterns, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObviousCase {
    /// No documents and no snapshots at all.
    NoData,
    /// Documents present but every one extracted empty.
    EmptyDocuments,
    /// Every available profit-and-loss period shows negative net income.
    AllNegativeNetIncome,
    /// Latest-period liabilities exceed assets, or equity is negative.
    InsolventBalanceSheet,
    /// Latest-period revenue is exactly zero.
    ZeroRevenue,
}

impl ObviousCase {
    pub fn score(&self) -> u32 {
        match self {
            ObviousCase::NoData | ObviousCase::EmptyDocuments => 0,
            ObviousCase::AllNegativeNetIncome => 15,
            ObviousCase::InsolventBalanceSheet => 12,
            ObviousCase::ZeroRevenue => 5,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ObviousCase::NoData => "No evidence was provided for this company.",
            ObviousCase::EmptyDocuments => {
                "Documents were provided but none yielded extractable data."
            }
            ObviousCase::AllNegativeNetIncome => {
                "Every available profit-and-loss period shows negative net income."
            }
            ObviousCase::InsolventBalanceSheet => {
                "The latest balance sheet shows liabilities exceeding assets."
            }
            ObviousCase::ZeroRevenue => "The latest period reports exactly zero revenue.",
        }
    }
}

impl fmt::Display for ObviousCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObviousCase::NoData => "no_data",
            ObviousCase::EmptyDocuments => "empty_documents",
            ObviousCase::AllNegativeNetIncome => "all_negative_net_income",
            ObviousCase::InsolventBalanceSheet => "insolvent_balance_sheet",
            ObviousCase::ZeroRevenue => "zero_revenue",
        };
        write!(f, "{}", name)
    }
}

/// First matching case wins; `None` means the full pipeline must run.
pub fn evaluate(ctx: &SessionContext) -> Option<ObviousCase> {
    if !ctx.has_evidence() {
        return Some(ObviousCase::NoData);
    }

    if !ctx.documents.is_empty() && ctx.documents.iter().all(|d| !d.has_data()) {
        return Some(ObviousCase::EmptyDocuments);
    }

    let net_income = findata::metric_by_year(ctx, DocumentType::ProfitAndLoss, findata::NET_INCOME_KEYS);
    if !net_income.is_empty() && net_income.iter().all(|(_, v)| *v < 0.0) {
        return Some(ObviousCase::AllNegativeNetIncome);
    }

    let assets = findata::latest_metric(ctx, DocumentType::BalanceSheet, findata::ASSETS_KEYS);
    let liabilities =
        findata::latest_metric(ctx, DocumentType::BalanceSheet, findata::LIABILITIES_KEYS);
    let equity = findata::latest_metric(ctx, DocumentType::BalanceSheet, findata::EQUITY_KEYS);
    let insolvent = matches!((assets, liabilities), (Some(a), Some(l)) if l > a)
        || matches!(equity, Some(e) if e < 0.0);
    if insolvent {
        return Some(ObviousCase::InsolventBalanceSheet);
    }

    if findata::latest_metric(ctx, DocumentType::ProfitAndLoss, findata::REVENUE_KEYS)
        == Some(0.0)
    {
        return Some(ObviousCase::ZeroRevenue);
    }

    None
}

/// Build the fixed score and canned roadmap for a matched case.
pub fn resolve(case: ObviousCase, ctx: &SessionContext) -> (BankabilityScore, RemediationRoadmap) {
    let score = case.score();
    let factors = equal_weighted_factors(case);

    let explanation = ScoreExplanation {
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        critical_issues: vec![case.summary().to_string()],
        reasoning: format!(
            "Obvious case {}: fixed score {} assigned without running analysis tasks.\n{}",
            case,
            score,
            case.summary()
        ),
    };

    let bankability = BankabilityScore {
        score,
        grade: Grade::from_score(score),
        risk_factors: factors,
        penalties: Vec::new(),
        explanation,
    };

    let tasks = canned_tasks(case);
    let total_gain: f64 = tasks.iter().map(|t| t.expected_gain).sum();
    let mut timeline = Timeline::default();
    for task in &tasks {
        let bucket = if task.estimated_days <= 14 {
            &mut timeline.quick_wins
        } else if task.estimated_days <= 60 {
            &mut timeline.short_term
        } else {
            &mut timeline.long_term
        };
        bucket.task_count += 1;
        bucket.max_days = bucket.max_days.max(task.estimated_days);
        bucket.total_gain += task.expected_gain;
    }

    let roadmap = RemediationRoadmap {
        session_id: ctx.session_id.clone(),
        generated_at: Utc::now(),
        current_score: score,
        projected_score: (f64::from(score) + total_gain).round().min(100.0) as u32,
        drags: Vec::new(),
        tasks,
        timeline,
    };

    (bankability, roadmap)
}

/// Minimal equal-weighted factor map, every factor scored at the case's
/// base score.
fn equal_weighted_factors(case: ObviousCase) -> RiskFactorMap {
    let value = f64::from(case.score());
    RiskFactorMap {
        factors: RiskFactorKind::ALL
            .into_iter()
            .map(|kind| RiskFactor {
                kind,
                score: value,
                weight: 0.25,
                components: vec![RiskComponent {
                    name: "obvious case".to_string(),
                    value,
                    weight: 1.0,
                    raw: None,
                    interpretation: case.summary().to_string(),
                }],
                explanation: format!("{} fixed at {:.0}: {}", kind, value, case.summary()),
            })
            .collect(),
    }
}

fn task(
    title: &str,
    description: &str,
    category: TaskCategory,
    days: u32,
    gain: f64,
    actions: &[&str],
) -> RemediationTask {
    let difficulty = match category {
        TaskCategory::QuickWin => Difficulty::Low,
        TaskCategory::Structural => Difficulty::Medium,
        TaskCategory::Strategic => Difficulty::High,
    };
    RemediationTask {
        priority: (gain * 100.0 / (difficulty.weight() * f64::from(days))).round() as i64,
        factor: RiskFactorKind::Serviceability,
        title: title.to_string(),
        description: description.to_string(),
        expected_gain: gain,
        difficulty,
        estimated_days: days,
        category,
        actions: actions.iter().map(|a| a.to_string()).collect(),
    }
}

/// Fixed single-stage remediation plan per case.
fn canned_tasks(case: ObviousCase) -> Vec<RemediationTask> {
    match case {
        ObviousCase::NoData => vec![task(
            "Provide financial documentation",
            "No evidence was available; the score cannot rise above zero until \
             documents or account connections are provided.",
            TaskCategory::QuickWin,
            14,
            40.0,
            &[
                "Upload the last two years of profit-and-loss statements",
                "Upload the latest balance sheet",
                "Connect the payment processor and bank accounts",
            ],
        )],
        ObviousCase::EmptyDocuments => vec![task(
            "Re-submit legible statements",
            "The uploaded documents produced no extractable data.",
            TaskCategory::QuickWin,
            7,
            35.0,
            &[
                "Export statements digitally instead of scanning",
                "Re-upload and confirm the extraction preview shows figures",
            ],
        )],
        ObviousCase::AllNegativeNetIncome => vec![
            task(
                "Cut operating costs to reach break-even",
                "Sustained losses across every reported period make debt \
                 service impossible at current spend.",
                TaskCategory::Structural,
                60,
                20.0,
                &[
                    "Build a monthly cost baseline from the statements",
                    "Cut the largest two discretionary cost lines",
                ],
            ),
            task(
                "Rework the revenue model",
                "Pricing or volume must change for any period to close profitable.",
                TaskCategory::Strategic,
                90,
                15.0,
                &[
                    "Identify the highest-margin offering and shift sales toward it",
                    "Re-price loss-making accounts at renewal",
                ],
            ),
        ],
        ObviousCase::InsolventBalanceSheet => vec![
            task(
                "Restructure balance-sheet obligations",
                "Liabilities exceed assets; lenders see negative equity.",
                TaskCategory::Strategic,
                90,
                20.0,
                &[
                    "Negotiate liability write-downs or term extensions",
                    "Convert founder loans to equity where possible",
                ],
            ),
            task(
                "Secure an equity injection",
                "Fresh capital is the fastest route back to positive equity.",
                TaskCategory::Structural,
                45,
                15.0,
                &["Prepare a funding memo", "Approach existing shareholders first"],
            ),
        ],
        ObviousCase::ZeroRevenue => vec![task(
            "Demonstrate first recurring revenue",
            "With zero reported revenue there is nothing to underwrite.",
            TaskCategory::Strategic,
            90,
            30.0,
            &[
                "Convert pilot users to paid contracts",
                "Report the first full quarter of invoiced revenue",
            ],
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Insight, PaymentSnapshot, TaskId};
    use serde_json::json;

    fn doc(doc_type: DocumentType, data: serde_json::Value) -> Document {
        Document {
            doc_type,
            filename: "doc.pdf".to_string(),
            parsed_at: Utc::now(),
            confidence: 0.9,
            data,
            raw_text: String::new(),
            trust_score: 0.8,
        }
    }

    #[test]
    fn test_no_data_regardless_of_insights() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.insights
            .entry(TaskId::Financial)
            .or_default()
            .push(Insight::insufficient_data(TaskId::Financial));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::NoData));

        let (score, _) = resolve(ObviousCase::NoData, &ctx);
        assert_eq!(score.score, 0);
        assert_eq!(score.grade, Grade::F);
    }

    #[test]
    fn test_empty_documents_case() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(DocumentType::ProfitAndLoss, json!({})));
        ctx.documents.push(doc(DocumentType::BalanceSheet, serde_json::Value::Null));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::EmptyDocuments));
    }

    #[test]
    fn test_all_negative_net_income_case() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::ProfitAndLoss,
            json!({
                "2022": {"revenue": 90_000.0, "net_income": -12_000.0},
                "2023": {"revenue": 110_000.0, "net_income": -9_000.0},
                "2024": {"revenue": 120_000.0, "net_income": -3_000.0}
            }),
        ));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::AllNegativeNetIncome));

        let (score, roadmap) = resolve(ObviousCase::AllNegativeNetIncome, &ctx);
        assert_eq!(score.score, 15);
        assert_eq!(score.grade, Grade::F);
        assert_eq!(roadmap.tasks.len(), 2);
    }

    #[test]
    fn test_one_profitable_year_is_not_obvious() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::ProfitAndLoss,
            json!({
                "2023": {"revenue": 100.0, "net_income": -10.0},
                "2024": {"revenue": 120.0, "net_income": 5.0}
            }),
        ));

        assert_eq!(evaluate(&ctx), None);
    }

    #[test]
    fn test_insolvent_balance_sheet_case() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::BalanceSheet,
            json!({"2024": {"assets": 50_000.0, "liabilities": 80_000.0}}),
        ));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::InsolventBalanceSheet));
        assert_eq!(resolve(ObviousCase::InsolventBalanceSheet, &ctx).0.score, 12);
    }

    #[test]
    fn test_negative_equity_alone_is_insolvent() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::BalanceSheet,
            json!({"2024": {"equity": -5_000.0}}),
        ));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::InsolventBalanceSheet));
    }

    #[test]
    fn test_zero_revenue_case() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::ProfitAndLoss,
            json!({"2024": {"revenue": 0.0, "net_income": 0.0}}),
        ));

        assert_eq!(evaluate(&ctx), Some(ObviousCase::ZeroRevenue));
        assert_eq!(resolve(ObviousCase::ZeroRevenue, &ctx).0.score, 5);
    }

    #[test]
    fn test_healthy_context_passes_through() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::ProfitAndLoss,
            json!({"2024": {"revenue": 200_000.0, "net_income": 20_000.0}}),
        ));
        ctx.payments = Some(PaymentSnapshot {
            mrr: 18_000.0,
            customer_count: 40,
            ..Default::default()
        });

        assert_eq!(evaluate(&ctx), None);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut ctx = SessionContext::new("s-1".to_string(), "acme");
        ctx.documents.push(doc(
            DocumentType::ProfitAndLoss,
            json!({"2024": {"revenue": 100.0, "net_income": -10.0}}),
        ));

        let first = evaluate(&ctx);
        let second = evaluate(&ctx);
        assert_eq!(first, second);

        let (a, _) = resolve(first.unwrap(), &ctx);
        let (b, _) = resolve(second.unwrap(), &ctx);
        assert_eq!(a.score, b.score);
        assert_eq!(a.grade, b.grade);
    }

    #[test]
    fn test_canned_factors_are_equal_weighted() {
        let factors = equal_weighted_factors(ObviousCase::NoData);
        assert_eq!(factors.factors.len(), 4);
        assert!((factors.weight_sum() - 1.0).abs() < 1e-9);
        for factor in &factors.factors {
            assert_eq!(factor.score, 0.0);
        }
    }
}
