//! Risk synthesizer.
//!
//! Converts raw insights plus snapshot and document evidence into the four
//! weighted risk factors. Every factor follows the same fallback chain:
//! live snapshot metric, then latest-year document metric, then an
//! insight-derived proxy, then a neutral "insufficient data" component.

use crate::findata;
use crate::models::{
    DocumentType, Insight, InsightCategory, RiskComponent, RiskFactor, RiskFactorKind,
    RiskFactorMap, SessionContext,
};
use tracing::debug;

/// Neutral component values used when a factor has no signal at all.
fn neutral_value(kind: RiskFactorKind) -> f64 {
    match kind {
        RiskFactorKind::Serviceability => 55.0,
        RiskFactorKind::Concentration => 60.0,
        RiskFactorKind::Retention => 60.0,
        RiskFactorKind::Compliance => 50.0,
    }
}

/// Required document types for the compliance factor, with their weights.
const REQUIRED_DOCUMENTS: [(DocumentType, f64); 4] = [
    (DocumentType::ProfitAndLoss, 0.25),
    (DocumentType::BalanceSheet, 0.25),
    (DocumentType::TaxFiling, 0.30),
    (DocumentType::InsuranceCertificate, 0.20),
];

/// Herfindahl-Hirschman Index over revenue shares.
pub fn hhi(shares: &[f64]) -> f64 {
    shares.iter().map(|s| s * s).sum()
}

/// Standard concentration classification of an HHI value.
pub fn concentration_label(hhi: f64) -> &'static str {
    if hhi > 0.25 {
        "highly concentrated"
    } else if hhi >= 0.10 {
        "moderately concentrated"
    } else {
        "diversified"
    }
}

fn component(
    name: &str,
    value: f64,
    weight: f64,
    raw: Option<f64>,
    interpretation: String,
) -> RiskComponent {
    RiskComponent {
        name: name.to_string(),
        value: value.clamp(0.0, 100.0),
        weight,
        raw,
        interpretation,
    }
}

fn neutral_component(kind: RiskFactorKind) -> RiskComponent {
    component(
        "insufficient data",
        neutral_value(kind),
        1.0,
        None,
        format!("No {} signal in the evidence; neutral default.", kind),
    )
}

/// Weighted average of the components, clamped to [0, 100].
fn factor_from_components(kind: RiskFactorKind, components: Vec<RiskComponent>) -> RiskFactor {
    let weight_sum: f64 = components.iter().map(|c| c.weight).sum();
    let score = if weight_sum > 0.0 {
        components
            .iter()
            .map(|c| c.value * c.weight)
            .sum::<f64>()
            / weight_sum
    } else {
        neutral_value(kind)
    }
    .clamp(0.0, 100.0);

    let explanation = format!(
        "{} scored {:.0}: {}",
        kind,
        score,
        components
            .iter()
            .map(|c| c.interpretation.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    );

    RiskFactor {
        kind,
        score,
        weight: kind.weight(),
        components,
        explanation,
    }
}

/// Insight-derived proxy: average impact of category-matching insights,
/// mapped from the ±40 impact range onto [0, 100] around 50.
fn insight_proxy(insights: &[Insight], categories: &[InsightCategory]) -> Option<(f64, f64)> {
    let impacts: Vec<f64> = insights
        .iter()
        .filter(|i| categories.contains(&i.category))
        .map(|i| i.impact)
        .collect();

    if impacts.is_empty() {
        return None;
    }

    let avg = impacts.iter().sum::<f64>() / impacts.len() as f64;
    Some(((50.0 + avg * 1.25).clamp(0.0, 100.0), avg))
}

fn proxy_component(
    insights: &[Insight],
    categories: &[InsightCategory],
    what: &str,
) -> Option<RiskComponent> {
    insight_proxy(insights, categories).map(|(value, avg)| {
        component(
            "insight proxy",
            value,
            1.0,
            Some(avg),
            format!("Derived from {} insights (average impact {:+.1}).", what, avg),
        )
    })
}

fn serviceability(insights: &[Insight], ctx: &SessionContext) -> RiskFactor {
    let kind = RiskFactorKind::Serviceability;
    let mut components = Vec::new();

    if let Some(banking) = ctx.banking.as_ref().filter(|b| b.is_informative()) {
        let runway = banking.cash_flow.runway_months;
        components.push(component(
            "cash runway",
            runway / 24.0 * 100.0,
            0.6,
            Some(runway),
            format!("{:.1} months of runway at the current burn rate.", runway),
        ));

        let net = banking.cash_flow.net_cash_flow;
        let net_value = if net > 0.0 {
            80.0
        } else if net == 0.0 {
            50.0
        } else {
            30.0
        };
        components.push(component(
            "net cash flow",
            net_value,
            0.4,
            Some(net),
            if net >= 0.0 {
                "Cash flow positive month over month.".to_string()
            } else {
                format!("Burning {:.0} per month net.", -net)
            },
        ));
    } else if let (Some(revenue), Some(net_income)) = (
        findata::latest_metric(ctx, DocumentType::ProfitAndLoss, findata::REVENUE_KEYS),
        findata::latest_metric(ctx, DocumentType::ProfitAndLoss, findata::NET_INCOME_KEYS),
    ) {
        if revenue > 0.0 {
            let margin = net_income / revenue;
            components.push(component(
                "net margin",
                50.0 + margin * 200.0,
                1.0,
                Some(margin),
                format!("Latest-year net margin of {:.1}%.", margin * 100.0),
            ));
        }
    }

    if components.is_empty() {
        if let Some(c) = proxy_component(
            insights,
            &[InsightCategory::FinancialHealth, InsightCategory::CashFlow],
            "financial",
        ) {
            components.push(c);
        }
    }

    if components.is_empty() {
        components.push(neutral_component(kind));
    }

    factor_from_components(kind, components)
}

fn concentration(insights: &[Insight], ctx: &SessionContext) -> RiskFactor {
    let kind = RiskFactorKind::Concentration;
    let mut components = Vec::new();

    if let Some(payments) = ctx.payments.as_ref() {
        if !payments.top_customers.is_empty() {
            let shares: Vec<f64> = payments.top_customers.iter().map(|c| c.share).collect();
            let index = hhi(&shares);
            components.push(component(
                "customer HHI",
                100.0 - index * 200.0,
                0.7,
                Some(index),
                format!(
                    "HHI of {:.2} over top-customer shares: {}.",
                    index,
                    concentration_label(index)
                ),
            ));
        }
        if payments.customer_count > 0 {
            components.push(component(
                "customer base",
                f64::from(payments.customer_count) * 2.0,
                0.3,
                Some(f64::from(payments.customer_count)),
                format!("{} paying customers.", payments.customer_count),
            ));
        }
    }

    if components.is_empty() {
        if let Some(share) = findata::latest_metric(
            ctx,
            DocumentType::ProfitAndLoss,
            &["largest_customer_share", "top_customer_share"],
        ) {
            components.push(component(
                "largest customer",
                100.0 - share * 120.0,
                1.0,
                Some(share),
                format!("Largest customer at {:.0}% of revenue.", share * 100.0),
            ));
        }
    }

    if components.is_empty() {
        if let Some(c) = proxy_component(insights, &[InsightCategory::Concentration], "concentration")
        {
            components.push(c);
        }
    }

    if components.is_empty() {
        components.push(neutral_component(kind));
    }

    factor_from_components(kind, components)
}

fn retention(insights: &[Insight], ctx: &SessionContext) -> RiskFactor {
    let kind = RiskFactorKind::Retention;
    let mut components = Vec::new();

    if let Some(payments) = ctx.payments.as_ref().filter(|p| p.is_informative()) {
        let churn = payments.churn_rate;
        components.push(component(
            "churn rate",
            100.0 - churn * 500.0,
            0.6,
            Some(churn),
            format!("Monthly churn of {:.1}%.", churn * 100.0),
        ));
        components.push(component(
            "revenue trend",
            50.0 + payments.growth_rate * 300.0,
            0.4,
            Some(payments.growth_rate),
            format!(
                "Revenue {} {:.1}% month over month.",
                if payments.growth_rate >= 0.0 {
                    "growing"
                } else {
                    "shrinking"
                },
                payments.growth_rate.abs() * 100.0
            ),
        ));
    } else {
        let series = findata::metric_by_year(ctx, DocumentType::ProfitAndLoss, findata::REVENUE_KEYS);
        if series.len() >= 2 {
            let (_, prev) = series[series.len() - 2];
            let (_, last) = series[series.len() - 1];
            if prev != 0.0 {
                let growth = (last - prev) / prev.abs();
                components.push(component(
                    "year-over-year revenue",
                    50.0 + growth * 100.0,
                    1.0,
                    Some(growth),
                    format!("Revenue changed {:+.1}% against the prior year.", growth * 100.0),
                ));
            }
        }
    }

    if components.is_empty() {
        if let Some(c) = proxy_component(
            insights,
            &[InsightCategory::Retention, InsightCategory::Growth],
            "retention",
        ) {
            components.push(c);
        }
    }

    if components.is_empty() {
        components.push(neutral_component(kind));
    }

    factor_from_components(kind, components)
}

fn compliance(insights: &[Insight], ctx: &SessionContext) -> RiskFactor {
    let kind = RiskFactorKind::Compliance;
    let mut components = Vec::new();

    if !ctx.documents.is_empty() {
        for (doc_type, weight) in REQUIRED_DOCUMENTS {
            let present = !ctx.documents_of_type(doc_type).is_empty();
            components.push(component(
                doc_type.to_string().as_str(),
                if present { 100.0 } else { 0.0 },
                weight,
                None,
                format!(
                    "{} {}.",
                    doc_type,
                    if present { "on record" } else { "missing" }
                ),
            ));
        }
    }

    if components.is_empty() {
        if let Some(c) = proxy_component(
            insights,
            &[InsightCategory::Compliance, InsightCategory::Legal],
            "compliance",
        ) {
            components.push(c);
        }
    }

    if components.is_empty() {
        components.push(neutral_component(kind));
    }

    factor_from_components(kind, components)
}

/// Reduce insights and context evidence into the four risk factors.
pub fn synthesize(insights: &[Insight], ctx: &SessionContext) -> RiskFactorMap {
    let factors = vec![
        serviceability(insights, ctx),
        concentration(insights, ctx),
        retention(insights, ctx),
        compliance(insights, ctx),
    ];

    for factor in &factors {
        debug!("{}: {:.1} ({} components)", factor.kind, factor.score, factor.components.len());
    }

    RiskFactorMap { factors }
}
