//! Remediation engine.
//!
//! Identifies which risk factors fall short of the target, expands each
//! drag into template tasks, prioritizes by impact-per-effort, and rolls
//! the tasks up into a duration timeline. Running the engine twice on the
//! same inputs produces the same plan; there is no hidden randomness.

use crate::models::{
    BankabilityScore, Difficulty, RemediationRoadmap, RemediationTask, RiskFactorKind,
    RiskFactorMap, ScoreDrag, SessionContext, TaskCategory, Timeline, TimelineBucket,
};
use chrono::Utc;
use tracing::debug;

/// Default score every factor is remediated toward.
pub const DEFAULT_TARGET: f64 = 75.0;

/// A gap wider than this bumps the drag one difficulty tier.
const HARD_GAP: f64 = 30.0;

/// One task blueprint for a dragging factor.
struct TaskTemplate {
    title: &'static str,
    description: &'static str,
    category: TaskCategory,
    days: u32,
    actions: &'static [&'static str],
}

fn base_difficulty(kind: RiskFactorKind) -> Difficulty {
    match kind {
        RiskFactorKind::Serviceability | RiskFactorKind::Concentration => Difficulty::High,
        RiskFactorKind::Retention => Difficulty::Medium,
        RiskFactorKind::Compliance => Difficulty::Low,
    }
}

fn base_days(kind: RiskFactorKind) -> f64 {
    match kind {
        RiskFactorKind::Serviceability => 90.0,
        RiskFactorKind::Concentration => 120.0,
        RiskFactorKind::Retention => 60.0,
        RiskFactorKind::Compliance => 21.0,
    }
}

fn templates_for(kind: RiskFactorKind) -> &'static [TaskTemplate] {
    match kind {
        RiskFactorKind::Serviceability => &[
            TaskTemplate {
                title: "Trim discretionary spend",
                description: "Cut non-essential operating costs to lower the monthly burn.",
                category: TaskCategory::QuickWin,
                days: 14,
                actions: &[
                    "Review the last three months of outgoing payments",
                    "Cancel unused subscriptions and services",
                    "Set a monthly burn ceiling with the finance lead",
                ],
            },
            TaskTemplate {
                title: "Refinance short-term obligations",
                description: "Convert expensive short-term debt into serviceable terms.",
                category: TaskCategory::Structural,
                days: 45,
                actions: &[
                    "Inventory outstanding obligations and their rates",
                    "Negotiate extended terms with the two largest creditors",
                ],
            },
            TaskTemplate {
                title: "Rework pricing for margin",
                description: "Raise gross margin through a structured pricing review.",
                category: TaskCategory::Strategic,
                days: 90,
                actions: &[
                    "Benchmark pricing against the top three competitors",
                    "Pilot a price change on one customer segment",
                    "Roll out the new price book",
                ],
            },
        ],
        RiskFactorKind::Concentration => &[
            TaskTemplate {
                title: "Open a second customer segment",
                description: "Stand up a sales motion outside the current anchor accounts.",
                category: TaskCategory::Structural,
                days: 60,
                actions: &[
                    "Pick one adjacent segment with existing inbound interest",
                    "Close three lighthouse deals in that segment",
                ],
            },
            TaskTemplate {
                title: "Reduce anchor-customer dependence",
                description: "Bring the largest customer's revenue share under a third.",
                category: TaskCategory::Strategic,
                days: 120,
                actions: &[
                    "Set a quarterly concentration ceiling",
                    "Shift account-management capacity toward mid-size accounts",
                ],
            },
        ],
        RiskFactorKind::Retention => &[
            TaskTemplate {
                title: "Stand up churn-risk alerts",
                description: "Flag accounts with falling usage before they cancel.",
                category: TaskCategory::QuickWin,
                days: 10,
                actions: &[
                    "Define a usage-drop threshold per plan",
                    "Route alerts to the account owner",
                ],
            },
            TaskTemplate {
                title: "Introduce annual contracts",
                description: "Move month-to-month customers onto annual terms with a discount.",
                category: TaskCategory::Structural,
                days: 30,
                actions: &[
                    "Draft annual terms with legal",
                    "Offer conversion to the top half of the customer base",
                ],
            },
            TaskTemplate {
                title: "Build a customer success program",
                description: "Dedicated onboarding and review cadence for every account.",
                category: TaskCategory::Strategic,
                days: 75,
                actions: &[
                    "Hire or assign a customer success owner",
                    "Run quarterly business reviews for the top accounts",
                ],
            },
        ],
        RiskFactorKind::Compliance => &[
            TaskTemplate {
                title: "File the missing documents",
                description: "Close the gaps in required filings and certificates.",
                category: TaskCategory::QuickWin,
                days: 7,
                actions: &[
                    "List which required document types are absent",
                    "Obtain and upload current versions",
                ],
            },
            TaskTemplate {
                title: "Adopt a compliance calendar",
                description: "Quarterly cadence so filings never lapse again.",
                category: TaskCategory::Structural,
                days: 21,
                actions: &[
                    "Map every recurring filing and its deadline",
                    "Assign an owner and reminders per filing",
                ],
            },
        ],
    }
}

/// Remediation plan generator.
pub struct RemediationEngine {
    target: f64,
}

impl Default for RemediationEngine {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET,
        }
    }
}

impl RemediationEngine {
    pub fn new(target: f64) -> Self {
        Self { target }
    }

    /// Build the prioritized roadmap for the current score.
    pub fn generate(
        &self,
        score: &BankabilityScore,
        factors: &RiskFactorMap,
        ctx: &SessionContext,
    ) -> RemediationRoadmap {
        let mut drags = self.identify_drags(factors);

        // Impact-per-effort, descending; stable sort keeps canonical
        // factor order on ties.
        drags.sort_by(|a, b| {
            let a_key = a.impact_points / (f64::from(a.estimated_days) * a.difficulty.weight());
            let b_key = b.impact_points / (f64::from(b.estimated_days) * b.difficulty.weight());
            b_key.partial_cmp(&a_key).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut tasks: Vec<RemediationTask> = Vec::new();
        for drag in &drags {
            tasks.extend(expand_drag(drag));
        }
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        let total_gain: f64 = tasks.iter().map(|t| t.expected_gain).sum();
        let projected_score = (f64::from(score.score) + total_gain).round().min(100.0) as u32;

        debug!(
            "remediation: {} drags, {} tasks, projected {} from {}",
            drags.len(),
            tasks.len(),
            projected_score,
            score.score
        );

        RemediationRoadmap {
            session_id: ctx.session_id.clone(),
            generated_at: Utc::now(),
            current_score: score.score,
            projected_score,
            timeline: build_timeline(&tasks),
            drags,
            tasks,
        }
    }

    /// One drag per factor strictly below the target.
    fn identify_drags(&self, factors: &RiskFactorMap) -> Vec<ScoreDrag> {
        let mut drags = Vec::new();

        for kind in RiskFactorKind::ALL {
            let Some(factor) = factors.get(kind) else {
                continue;
            };
            if factor.score >= self.target {
                continue;
            }

            let gap = self.target - factor.score;
            let mut difficulty = base_difficulty(kind);
            if gap > HARD_GAP {
                difficulty = difficulty.bump();
            }

            drags.push(ScoreDrag {
                factor: kind,
                current_score: factor.score,
                target: self.target,
                impact_points: (gap * factor.weight).round(),
                difficulty,
                estimated_days: ((base_days(kind) * gap / 50.0).round() as u32).max(7),
            });
        }

        drags
    }
}

/// Expand one drag into its template tasks, splitting the drag's impact
/// evenly across them.
fn expand_drag(drag: &ScoreDrag) -> Vec<RemediationTask> {
    let templates = templates_for(drag.factor);
    let gain = drag.impact_points / templates.len() as f64;

    templates
        .iter()
        .map(|template| {
            let priority =
                (gain * 100.0 / (drag.difficulty.weight() * f64::from(template.days))).round()
                    as i64;
            RemediationTask {
                priority,
                factor: drag.factor,
                title: template.title.to_string(),
                description: template.description.to_string(),
                expected_gain: gain,
                difficulty: drag.difficulty,
                estimated_days: template.days,
                category: template.category,
                actions: template.actions.iter().map(|a| a.to_string()).collect(),
            }
        })
        .collect()
}

/// Bucket tasks by estimated duration.
fn build_timeline(tasks: &[RemediationTask]) -> Timeline {
    let mut timeline = Timeline::default();

    for task in tasks {
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

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, RiskFactor, ScoreExplanation};

    fn factor_map(scores: [f64; 4]) -> RiskFactorMap {
        RiskFactorMap {
            factors: RiskFactorKind::ALL
                .into_iter()
                .zip(scores)
                .map(|(kind, score)| RiskFactor {
                    kind,
                    score,
                    weight: kind.weight(),
                    components: Vec::new(),
                    explanation: String::new(),
                })
                .collect(),
        }
    }

    fn bankability(score: u32, factors: &RiskFactorMap) -> BankabilityScore {
        BankabilityScore {
            score,
            grade: Grade::from_score(score),
            risk_factors: factors.clone(),
            penalties: Vec::new(),
            explanation: ScoreExplanation::default(),
        }
    }

    #[test]
    fn test_drag_exists_iff_below_target() {
        let engine = RemediationEngine::default();
        let factors = factor_map([75.0, 74.9, 80.0, 10.0]);
        let drags = engine.identify_drags(&factors);

        let dragged: Vec<RiskFactorKind> = drags.iter().map(|d| d.factor).collect();
        assert_eq!(
            dragged,
            vec![RiskFactorKind::Concentration, RiskFactorKind::Compliance]
        );
    }

    #[test]
    fn test_impact_points_formula() {
        let engine = RemediationEngine::default();
        let factors = factor_map([80.0, 55.0, 80.0, 80.0]);
        let drags = engine.identify_drags(&factors);

        assert_eq!(drags.len(), 1);
        // (75 - 55) * 0.25 = 5 points.
        assert_eq!(drags[0].impact_points, 5.0);
    }

    #[test]
    fn test_wide_gap_bumps_difficulty() {
        let engine = RemediationEngine::default();
        let factors = factor_map([80.0, 80.0, 40.0, 30.0]);
        let drags = engine.identify_drags(&factors);

        let retention = drags.iter().find(|d| d.factor == RiskFactorKind::Retention).unwrap();
        let compliance = drags.iter().find(|d| d.factor == RiskFactorKind::Compliance).unwrap();

        // Retention gap 35 > 30: Medium bumps to High.
        assert_eq!(retention.difficulty, Difficulty::High);
        // Compliance gap 45 > 30: Low bumps to Medium.
        assert_eq!(compliance.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_tasks_sorted_by_priority_descending() {
        let engine = RemediationEngine::default();
        let factors = factor_map([40.0, 40.0, 40.0, 40.0]);
        let score = bankability(40, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let roadmap = engine.generate(&score, &factors, &ctx);
        assert!(!roadmap.tasks.is_empty());
        for pair in roadmap.tasks.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let engine = RemediationEngine::default();
        let factors = factor_map([42.0, 58.0, 63.0, 30.0]);
        let score = bankability(47, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let first = engine.generate(&score, &factors, &ctx);
        let second = engine.generate(&score, &factors, &ctx);

        let titles = |r: &RemediationRoadmap| -> Vec<String> {
            r.tasks.iter().map(|t| t.title.clone()).collect()
        };
        let priorities =
            |r: &RemediationRoadmap| -> Vec<i64> { r.tasks.iter().map(|t| t.priority).collect() };

        assert_eq!(titles(&first), titles(&second));
        assert_eq!(priorities(&first), priorities(&second));
        assert_eq!(first.drags.len(), second.drags.len());
        assert_eq!(first.projected_score, second.projected_score);
    }

    #[test]
    fn test_expected_gain_split_evenly() {
        let engine = RemediationEngine::default();
        let factors = factor_map([80.0, 80.0, 35.0, 80.0]);
        let score = bankability(70, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let roadmap = engine.generate(&score, &factors, &ctx);
        // Retention drag: (75 - 35) * 0.25 = 10 points over 3 templates.
        assert_eq!(roadmap.tasks.len(), 3);
        for task in &roadmap.tasks {
            assert!((task.expected_gain - 10.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_timeline_buckets_by_duration() {
        let engine = RemediationEngine::default();
        let factors = factor_map([40.0, 80.0, 80.0, 40.0]);
        let score = bankability(55, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let roadmap = engine.generate(&score, &factors, &ctx);
        let timeline = &roadmap.timeline;

        // Serviceability templates (14/45/90) and compliance (7/21).
        assert_eq!(timeline.quick_wins.task_count, 2);
        assert_eq!(timeline.short_term.task_count, 2);
        assert_eq!(timeline.long_term.task_count, 1);
        assert_eq!(timeline.long_term.max_days, 90);

        let bucket_total = timeline.quick_wins.total_gain
            + timeline.short_term.total_gain
            + timeline.long_term.total_gain;
        let task_total: f64 = roadmap.tasks.iter().map(|t| t.expected_gain).sum();
        assert!((bucket_total - task_total).abs() < 1e-9);
    }

    #[test]
    fn test_projected_score_capped_at_100() {
        let engine = RemediationEngine::default();
        let factors = factor_map([10.0, 10.0, 10.0, 10.0]);
        let score = bankability(95, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let roadmap = engine.generate(&score, &factors, &ctx);
        assert_eq!(roadmap.projected_score, 100);
    }

    #[test]
    fn test_healthy_factors_produce_empty_roadmap() {
        let engine = RemediationEngine::default();
        let factors = factor_map([90.0, 85.0, 80.0, 75.0]);
        let score = bankability(84, &factors);
        let ctx = SessionContext::new("s-1".to_string(), "acme");

        let roadmap = engine.generate(&score, &factors, &ctx);
        assert!(roadmap.drags.is_empty());
        assert!(roadmap.tasks.is_empty());
        assert_eq!(roadmap.projected_score, 84);
    }
}
