//! Score calculator.
//!
//! Reduces the four risk factors into one 0–100 score. Penalty rules are
//! checked independently and composed multiplicatively, so their order
//! never matters. The final score and grade are a pure function of the
//! factor map and the penalty table.

use crate::models::{
    BankabilityScore, Grade, RiskFactorKind, RiskFactorMap, ScoreExplanation, ScorePenalty,
};

/// Critical-threshold penalty table: factor, threshold, multiplier.
const PENALTY_RULES: [(RiskFactorKind, f64, f64); 3] = [
    (RiskFactorKind::Compliance, 40.0, 0.80),
    (RiskFactorKind::Serviceability, 30.0, 0.70),
    (RiskFactorKind::Concentration, 25.0, 0.85),
];

/// A factor at or above this is a strength.
const STRENGTH_THRESHOLD: f64 = 70.0;
/// A factor below this is a critical issue.
const CRITICAL_THRESHOLD: f64 = 50.0;

/// Reduce the risk-factor map into the final bankability score.
pub fn calculate(factors: &RiskFactorMap) -> BankabilityScore {
    let raw: f64 = factors.factors.iter().map(|f| f.score * f.weight).sum();

    let mut penalties = Vec::new();
    for (kind, threshold, multiplier) in PENALTY_RULES {
        if let Some(factor) = factors.get(kind) {
            if factor.score < threshold {
                penalties.push(ScorePenalty {
                    reason: format!(
                        "{} score {:.0} below the critical threshold of {:.0}",
                        kind, factor.score, threshold
                    ),
                    multiplier,
                    // Each multiplier's own bite out of the raw score;
                    // independent of application order.
                    points_lost: (raw * (1.0 - multiplier) * 10.0).round() / 10.0,
                });
            }
        }
    }

    let product: f64 = penalties.iter().map(|p| p.multiplier).product();
    let score = (raw * product).clamp(0.0, 100.0).round() as u32;
    let grade = Grade::from_score(score);
    let explanation = build_explanation(factors, &penalties, raw, score, grade);

    BankabilityScore {
        score,
        grade,
        risk_factors: factors.clone(),
        penalties,
        explanation,
    }
}

/// Classify factors, append penalty lines to critical issues, and emit the
/// full breakdown narrative.
fn build_explanation(
    factors: &RiskFactorMap,
    penalties: &[ScorePenalty],
    raw: f64,
    score: u32,
    grade: Grade,
) -> ScoreExplanation {
    let mut explanation = ScoreExplanation::default();

    for factor in &factors.factors {
        let line = format!("{} ({:.0})", factor.kind, factor.score);
        if factor.score >= STRENGTH_THRESHOLD {
            explanation.strengths.push(line);
        } else if factor.score >= CRITICAL_THRESHOLD {
            explanation.weaknesses.push(line);
        } else {
            explanation.critical_issues.push(line);
        }
    }

    for penalty in penalties {
        explanation.critical_issues.push(format!(
            "Penalty ×{:.2}: {} (-{:.1} points)",
            penalty.multiplier, penalty.reason, penalty.points_lost
        ));
    }

    let mut lines = Vec::new();
    for factor in &factors.factors {
        lines.push(format!(
            "{}: {:.1} × {:.2} = {:.1} points",
            factor.kind,
            factor.score,
            factor.weight,
            factor.score * factor.weight
        ));
    }
    lines.push(format!("Raw weighted score: {:.1}", raw));
    for penalty in penalties {
        lines.push(format!("× {:.2} — {}", penalty.multiplier, penalty.reason));
    }
    lines.push(format!("Final score: {} (grade {})", score, grade));
    explanation.reasoning = lines.join("\n");

    explanation
}
