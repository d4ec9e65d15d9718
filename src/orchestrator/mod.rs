//! Analysis orchestrator.
//!
//! Owns the workflow: pre-screen for obvious cases, otherwise fan out all
//! registered tasks concurrently, persist their insights as they arrive,
//! and drive the three synthesis stages in order. A single task failure
//! degrades coverage but never fails the run; failures outside the
//! per-task isolation boundary abort into the error state.

pub mod prefilter;

pub use prefilter::ObviousCase;

use crate::agents::AnalysisTask;
use crate::bus::TaskBus;
use crate::error::PipelineError;
use crate::models::{
    BankabilityScore, Contradiction, Insight, RemediationRoadmap, SessionContext, TaskId,
};
use crate::remediation::RemediationEngine;
use crate::session::ContextStore;
use crate::synthesis;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Workflow states. `Error` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Analyzing,
    Synthesizing,
    Complete,
    Error,
}

/// Per-task progress within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRunStatus {
    Pending,
    Running,
    Complete,
    Failed(String),
}

/// Impact magnitude above which opposed insights count as contradictory.
const CONTRADICTION_THRESHOLD: f64 = 15.0;

/// Result of a completed orchestration run.
pub struct AnalysisOutcome {
    pub score: BankabilityScore,
    pub roadmap: RemediationRoadmap,
    /// Set when the run short-circuited without running any task.
    pub obvious_case: Option<ObviousCase>,
}

/// Drives one analysis session end to end.
pub struct Orchestrator {
    store: Arc<ContextStore>,
    bus: Arc<TaskBus>,
    tasks: Vec<Arc<dyn AnalysisTask>>,
    remediation: RemediationEngine,
    state: Mutex<RunState>,
    statuses: Mutex<BTreeMap<TaskId, TaskRunStatus>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ContextStore>,
        bus: Arc<TaskBus>,
        tasks: Vec<Arc<dyn AnalysisTask>>,
        remediation: RemediationEngine,
    ) -> Self {
        Self {
            store,
            bus,
            tasks,
            remediation,
            state: Mutex::new(RunState::Initializing),
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().expect("state mutex poisoned")
    }

    pub fn task_statuses(&self) -> BTreeMap<TaskId, TaskRunStatus> {
        self.statuses.lock().expect("status mutex poisoned").clone()
    }

    /// Tasks that failed in the last run, with their errors.
    pub fn failed_tasks(&self) -> Vec<(TaskId, String)> {
        self.task_statuses()
            .into_iter()
            .filter_map(|(id, status)| match status {
                TaskRunStatus::Failed(e) => Some((id, e)),
                _ => None,
            })
            .collect()
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    fn set_status(&self, task_id: TaskId, status: TaskRunStatus) {
        self.statuses
            .lock()
            .expect("status mutex poisoned")
            .insert(task_id, status);
    }

    /// Run the full workflow for a subject.
    pub async fn analyze(&self, subject_id: &str) -> Result<AnalysisOutcome, PipelineError> {
        match self.run(subject_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.set_state(RunState::Error);
                Err(e)
            }
        }
    }

    async fn run(&self, subject_id: &str) -> Result<AnalysisOutcome, PipelineError> {
        self.set_state(RunState::Initializing);

        // Idempotent resume: reuse an existing non-empty context for this
        // subject, otherwise start fresh.
        let ctx = match self.store.get_context().await {
            Ok(existing) if existing.subject_id == subject_id && !existing.is_empty() => {
                info!("Resuming session {} for {}", existing.session_id, subject_id);
                existing
            }
            _ => self.store.create_session(subject_id).await,
        };

        if let Some(case) = prefilter::evaluate(&ctx) {
            info!("Obvious case {} matched; skipping analysis tasks", case);
            let (score, roadmap) = prefilter::resolve(case, &ctx);
            self.set_state(RunState::Complete);
            return Ok(AnalysisOutcome {
                score,
                roadmap,
                obvious_case: Some(case),
            });
        }

        self.set_state(RunState::Analyzing);
        self.fan_out(&ctx).await?;
        self.record_contradictions().await?;

        self.set_state(RunState::Synthesizing);
        let ctx = self.store.get_context().await?;
        let insights = ctx.all_insights();

        let factors = synthesis::synthesize(&insights, &ctx);
        self.store.set_risk_factors(factors.clone()).await?;

        let score = synthesis::calculate(&factors);
        let roadmap = self.remediation.generate(&score, &factors, &ctx);

        self.set_state(RunState::Complete);
        info!(
            "Analysis complete for {}: score {} ({})",
            subject_id, score.score, score.grade
        );

        Ok(AnalysisOutcome {
            score,
            roadmap,
            obvious_case: None,
        })
    }

    /// Launch every registered task concurrently and persist insights as
    /// each task completes. Task failures are recorded, not propagated.
    async fn fan_out(&self, ctx: &SessionContext) -> Result<(), PipelineError> {
        for task in &self.tasks {
            self.set_status(task.id(), TaskRunStatus::Pending);
        }

        let mut running = FuturesUnordered::new();
        for task in &self.tasks {
            let task = Arc::clone(task);
            let ctx = ctx.clone();
            let bus = Arc::clone(&self.bus);
            debug!(
                "Launching {} ({} authorized categories)",
                task.id(),
                task.categories().len()
            );
            self.set_status(task.id(), TaskRunStatus::Running);
            running.push(async move {
                let result = task.execute(&ctx, &bus).await;
                (task.id(), result)
            });
        }

        while let Some((task_id, result)) = running.next().await {
            match result {
                Ok(insights) => {
                    for insight in insights {
                        self.store.append_insight(task_id, insight).await?;
                    }
                    self.set_status(task_id, TaskRunStatus::Complete);
                }
                Err(e) => {
                    warn!("Task {} failed: {}", task_id, e);
                    self.set_status(task_id, TaskRunStatus::Failed(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Detect strongly opposed same-category insights across tasks and
    /// record them on the context.
    async fn record_contradictions(&self) -> Result<(), PipelineError> {
        let ctx = self.store.get_context().await?;
        for contradiction in detect_contradictions(&ctx.all_insights()) {
            self.store.add_contradiction(contradiction).await?;
        }
        Ok(())
    }
}

/// Same-category insight pairs pulling hard in opposite directions.
fn detect_contradictions(insights: &[Insight]) -> Vec<Contradiction> {
    let mut contradictions = Vec::new();

    let mut categories: Vec<_> = insights.iter().map(|i| i.category).collect();
    categories.sort();
    categories.dedup();

    for category in categories {
        let in_category: Vec<&Insight> =
            insights.iter().filter(|i| i.category == category).collect();

        let best = in_category
            .iter()
            .cloned()
            .max_by(|a, b| a.impact.partial_cmp(&b.impact).unwrap_or(std::cmp::Ordering::Equal));
        let worst = in_category
            .iter()
            .cloned()
            .min_by(|a, b| a.impact.partial_cmp(&b.impact).unwrap_or(std::cmp::Ordering::Equal));

        if let (Some(best), Some(worst)) = (best, worst) {
            if best.impact >= CONTRADICTION_THRESHOLD && worst.impact <= -CONTRADICTION_THRESHOLD {
                contradictions.push(Contradiction {
                    category,
                    positive: best.title.clone(),
                    negative: worst.title.clone(),
                    detail: format!(
                        "\"{}\" ({:+.0}) and \"{}\" ({:+.0}) disagree on {}.",
                        best.title, best.impact, worst.title, worst.impact, category
                    ),
                });
            }
        }
    }

    contradictions
}
