//! Markdown and JSON report generation.
//!
//! Renders the final `(BankabilityScore, RemediationRoadmap)` pair into a
//! comprehensive Markdown document or a machine-readable JSON payload.

use crate::models::{BankabilityScore, Grade, RemediationRoadmap, TimelineBucket};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about the analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub subject_id: String,
    pub session_id: String,
    pub analysis_date: DateTime<Utc>,
    pub model_used: String,
    pub tasks_run: usize,
    pub tasks_failed: usize,
    pub duration_seconds: f64,
    /// Name of the obvious case when the run short-circuited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obvious_case: Option<String>,
}

/// Complete report payload for JSON output.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    score: &'a BankabilityScore,
    roadmap: &'a RemediationRoadmap,
}

/// Serialize the full report as pretty JSON.
pub fn generate_json_report(
    metadata: &ReportMetadata,
    score: &BankabilityScore,
    roadmap: &RemediationRoadmap,
) -> Result<String> {
    let report = JsonReport {
        metadata,
        score,
        roadmap,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn grade_emoji(grade: Grade) -> &'static str {
    match grade {
        Grade::A => "🟢",
        Grade::B => "🟢",
        Grade::C => "🟡",
        Grade::D => "🟠",
        Grade::F => "🔴",
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(
    metadata: &ReportMetadata,
    score: &BankabilityScore,
    roadmap: &RemediationRoadmap,
) -> String {
    let mut output = String::new();

    output.push_str("# Bankability Report\n\n");
    output.push_str(&generate_metadata_section(metadata));
    output.push_str(&generate_score_section(score));
    output.push_str(&generate_factor_section(score));
    output.push_str(&generate_explanation_section(score));
    output.push_str(&generate_roadmap_section(roadmap));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Subject:** {}\n", metadata.subject_id));
    section.push_str(&format!("- **Session:** `{}`\n", metadata.session_id));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Tasks Run:** {}\n", metadata.tasks_run));
    if metadata.tasks_failed > 0 {
        section.push_str(&format!("- **Tasks Failed:** {}\n", metadata.tasks_failed));
    }
    if let Some(case) = &metadata.obvious_case {
        section.push_str(&format!("- **Short-circuited:** `{}`\n", case));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_score_section(score: &BankabilityScore) -> String {
    let mut section = String::new();

    section.push_str("## Score\n\n");
    section.push_str(&format!(
        "# {} {} / 100 — Grade {}\n\n",
        grade_emoji(score.grade),
        score.score,
        score.grade
    ));

    if !score.penalties.is_empty() {
        section.push_str("### Applied Penalties\n\n");
        section.push_str("| Multiplier | Reason | Points Lost |\n");
        section.push_str("|:---:|:---|:---:|\n");
        for penalty in &score.penalties {
            section.push_str(&format!(
                "| ×{:.2} | {} | {:.1} |\n",
                penalty.multiplier, penalty.reason, penalty.points_lost
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_factor_section(score: &BankabilityScore) -> String {
    let mut section = String::new();

    section.push_str("## Risk Factors\n\n");
    section.push_str("| Factor | Score | Weight | Contribution |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for factor in &score.risk_factors.factors {
        section.push_str(&format!(
            "| {} | {:.0} | {:.2} | {:.1} |\n",
            factor.kind,
            factor.score,
            factor.weight,
            factor.score * factor.weight
        ));
    }
    section.push('\n');

    for factor in &score.risk_factors.factors {
        section.push_str(&format!("### {}\n\n", factor.kind));
        section.push_str(&format!("{}\n\n", factor.explanation));
        if !factor.components.is_empty() {
            section.push_str("| Component | Value | Weight |\n");
            section.push_str("|:---|:---:|:---:|\n");
            for component in &factor.components {
                section.push_str(&format!(
                    "| {} | {:.0} | {:.2} |\n",
                    component.name, component.value, component.weight
                ));
            }
            section.push('\n');
        }
    }

    section
}

fn generate_explanation_section(score: &BankabilityScore) -> String {
    let mut section = String::new();
    let explanation = &score.explanation;

    section.push_str("## Assessment\n\n");

    if !explanation.strengths.is_empty() {
        section.push_str("**Strengths**\n\n");
        for line in &explanation.strengths {
            section.push_str(&format!("- {}\n", line));
        }
        section.push('\n');
    }

    if !explanation.weaknesses.is_empty() {
        section.push_str("**Needs Improvement**\n\n");
        for line in &explanation.weaknesses {
            section.push_str(&format!("- {}\n", line));
        }
        section.push('\n');
    }

    if !explanation.critical_issues.is_empty() {
        section.push_str("**Critical Issues**\n\n");
        for line in &explanation.critical_issues {
            section.push_str(&format!("- {}\n", line));
        }
        section.push('\n');
    }

    section.push_str("### Score Breakdown\n\n");
    section.push_str("```\n");
    section.push_str(&explanation.reasoning);
    section.push_str("\n```\n\n");

    section
}

fn timeline_row(label: &str, bucket: &TimelineBucket) -> String {
    format!(
        "| {} | {} | {} | {:.1} |\n",
        label, bucket.task_count, bucket.max_days, bucket.total_gain
    )
}

fn generate_roadmap_section(roadmap: &RemediationRoadmap) -> String {
    let mut section = String::new();

    section.push_str("## Remediation Roadmap\n\n");
    section.push_str(&format!(
        "Current score **{}**, projected **{}** if every task lands.\n\n",
        roadmap.current_score, roadmap.projected_score
    ));

    if roadmap.tasks.is_empty() {
        section.push_str("All risk factors meet the target. No remediation needed. 🎉\n\n");
        return section;
    }

    if !roadmap.drags.is_empty() {
        section.push_str("### Score Drags\n\n");
        section.push_str("| Factor | Score | Target | Impact | Difficulty | Est. Days |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
        for drag in &roadmap.drags {
            section.push_str(&format!(
                "| {} | {:.0} | {:.0} | {:.0} | {} | {} |\n",
                drag.factor,
                drag.current_score,
                drag.target,
                drag.impact_points,
                drag.difficulty,
                drag.estimated_days
            ));
        }
        section.push('\n');
    }

    section.push_str("### Prioritized Tasks\n\n");
    for (i, task) in roadmap.tasks.iter().enumerate() {
        section.push_str(&format!(
            "#### {}. {} ({})\n\n",
            i + 1,
            task.title,
            task.category
        ));
        section.push_str(&format!(
            "*Factor: {} | Priority: {} | Expected gain: {:.1} | {} | ~{} days*\n\n",
            task.factor, task.priority, task.expected_gain, task.difficulty, task.estimated_days
        ));
        section.push_str(&format!("{}\n\n", task.description));
        for action in &task.actions {
            section.push_str(&format!("- [ ] {}\n", action));
        }
        section.push('\n');
    }

    section.push_str("### Timeline\n\n");
    section.push_str("| Bucket | Tasks | Max Days | Total Gain |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    section.push_str(&timeline_row("Quick wins (≤14d)", &roadmap.timeline.quick_wins));
    section.push_str(&timeline_row("Short term (15–60d)", &roadmap.timeline.short_term));
    section.push_str(&timeline_row("Long term (>60d)", &roadmap.timeline.long_term));
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Generated by Bankability — scores are advisory, not lending decisions.*\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Difficulty, RemediationTask, RiskFactor, RiskFactorKind, RiskFactorMap, ScoreExplanation,
        ScorePenalty, TaskCategory, Timeline,
    };

    fn test_metadata() -> ReportMetadata {
        ReportMetadata {
            subject_id: "acme".to_string(),
            session_id: "s-1".to_string(),
            analysis_date: Utc::now(),
            model_used: "test-model".to_string(),
            tasks_run: 3,
            tasks_failed: 1,
            duration_seconds: 12.5,
            obvious_case: None,
        }
    }

    fn test_score() -> BankabilityScore {
        BankabilityScore {
            score: 58,
            grade: Grade::C,
            risk_factors: RiskFactorMap {
                factors: RiskFactorKind::ALL
                    .into_iter()
                    .map(|kind| RiskFactor {
                        kind,
                        score: 58.0,
                        weight: kind.weight(),
                        components: Vec::new(),
                        explanation: format!("{} explanation", kind),
                    })
                    .collect(),
            },
            penalties: vec![ScorePenalty {
                reason: "compliance score 35 below the critical threshold of 40".to_string(),
                multiplier: 0.8,
                points_lost: 11.6,
            }],
            explanation: ScoreExplanation {
                strengths: vec!["Retention (72)".to_string()],
                weaknesses: vec!["Serviceability (58)".to_string()],
                critical_issues: vec!["Compliance (35)".to_string()],
                reasoning: "Raw weighted score: 58.0".to_string(),
            },
        }
    }

    fn test_roadmap() -> RemediationRoadmap {
        RemediationRoadmap {
            session_id: "s-1".to_string(),
            generated_at: Utc::now(),
            current_score: 58,
            projected_score: 71,
            drags: Vec::new(),
            tasks: vec![RemediationTask {
                priority: 24,
                factor: RiskFactorKind::Compliance,
                title: "File the missing documents".to_string(),
                description: "Close the filing gaps.".to_string(),
                expected_gain: 4.0,
                difficulty: Difficulty::Low,
                estimated_days: 7,
                category: TaskCategory::QuickWin,
                actions: vec!["Upload the tax filing".to_string()],
            }],
            timeline: Timeline::default(),
        }
    }

    #[test]
    fn test_markdown_report_contains_all_sections() {
        let markdown = generate_markdown_report(&test_metadata(), &test_score(), &test_roadmap());

        assert!(markdown.contains("# Bankability Report"));
        assert!(markdown.contains("58 / 100 — Grade C"));
        assert!(markdown.contains("## Risk Factors"));
        assert!(markdown.contains("Applied Penalties"));
        assert!(markdown.contains("File the missing documents"));
        assert!(markdown.contains("Tasks Failed:"));
        assert!(markdown.contains("acme"));
    }

    #[test]
    fn test_markdown_empty_roadmap_message() {
        let mut roadmap = test_roadmap();
        roadmap.tasks.clear();

        let markdown = generate_markdown_report(&test_metadata(), &test_score(), &roadmap);
        assert!(markdown.contains("No remediation needed"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let json = generate_json_report(&test_metadata(), &test_score(), &test_roadmap()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["score"]["score"], 58);
        assert_eq!(value["metadata"]["subject_id"], "acme");
        assert_eq!(value["roadmap"]["projected_score"], 71);
    }
}
