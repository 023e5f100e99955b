//! Analysis pipeline used by both the CLI and the GUI.
//!
//! `plan_analysis` groups the table and renders every prompt without touching
//! the network; `run_plan` then issues the insight and backlog calls for each
//! group and collects a typed result per group.

use crate::grouping::{
    group_feedback, ColumnRoles, FeedbackGroup, GroupKey, GroupingMode, MarketBreakdown,
};
use crate::llm::{ChatRequest, CompletionClient, LlmError};
use crate::prompts::{build_prompts, PromptPair, SYSTEM_PROMPT};
use crate::table::FeedbackTable;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Feedback and category column selection
    pub roles: ColumnRoles,
    /// Also generate the EPIC / user story backlog for each group
    pub include_backlog: bool,
    /// Groups analysed concurrently (1 = sequential)
    pub workers: usize,
    /// System message sent with every request
    pub system_prompt: String,
}

impl AnalysisConfig {
    pub fn new(roles: ColumnRoles) -> Self {
        Self {
            roles,
            include_backlog: true,
            workers: 1,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Output token limits for the two calls of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub insights: u32,
    pub backlog: u32,
}

pub fn token_budget(mode: GroupingMode) -> TokenBudget {
    match mode {
        GroupingMode::EpisodeMarket => TokenBudget {
            insights: 700,
            backlog: 900,
        },
        GroupingMode::Flat | GroupingMode::Episode | GroupingMode::EpisodeMarketCountry => {
            TokenBudget {
                insights: 500,
                backlog: 700,
            }
        }
    }
}

/// Progress information reported after each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProgress {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
}

// ============================================================================
// Planning
// ============================================================================

/// A group together with its rendered prompts.
#[derive(Debug, Clone)]
pub struct PlannedGroup {
    pub group: FeedbackGroup,
    pub prompts: PromptPair,
}

/// Everything needed to run the analysis, before any API call.
#[derive(Debug, Clone)]
pub struct AnalysisPlan {
    pub mode: GroupingMode,
    pub budget: TokenBudget,
    pub groups: Vec<PlannedGroup>,
    pub dropped_rows: usize,
}

/// Group the table and build the prompts for every group.
pub fn plan_analysis(table: &FeedbackTable, roles: &ColumnRoles) -> Result<AnalysisPlan> {
    let grouped = group_feedback(table, roles)?;
    let groups = grouped
        .groups
        .into_iter()
        .map(|group| {
            let prompts = build_prompts(&group.key, &group.feedback, group.breakdown.as_ref());
            PlannedGroup { group, prompts }
        })
        .collect();

    Ok(AnalysisPlan {
        mode: grouped.mode,
        budget: token_budget(grouped.mode),
        groups,
        dropped_rows: grouped.dropped_rows,
    })
}

// ============================================================================
// Running
// ============================================================================

/// Texts produced for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInsights {
    pub insights: String,
    /// `None` when backlog generation was not requested
    pub backlog: Option<String>,
}

/// Result for one group: its texts, or the error that stopped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAnalysis {
    pub key: GroupKey,
    pub row_count: usize,
    pub breakdown: Option<MarketBreakdown>,
    pub outcome: Result<GroupInsights, LlmError>,
}

/// All group results of a run, in grouping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub mode: GroupingMode,
    pub groups: Vec<GroupAnalysis>,
    pub dropped_rows: usize,
}

impl AnalysisReport {
    pub fn failed_count(&self) -> usize {
        self.groups.iter().filter(|g| g.outcome.is_err()).count()
    }
}

/// Plan and run in one step.
pub fn analyze(
    table: &FeedbackTable,
    config: &AnalysisConfig,
    client: &dyn CompletionClient,
    on_progress: &(dyn Fn(&AnalysisProgress) + Sync),
) -> Result<AnalysisReport> {
    let plan = plan_analysis(table, &config.roles)?;
    run_plan(&plan, config, client, on_progress)
}

/// Issue the API calls for a plan.
///
/// In flat mode an API error aborts the run. In grouped modes it becomes the
/// failing group's outcome and the remaining groups still run.
pub fn run_plan(
    plan: &AnalysisPlan,
    config: &AnalysisConfig,
    client: &dyn CompletionClient,
    on_progress: &(dyn Fn(&AnalysisProgress) + Sync),
) -> Result<AnalysisReport> {
    let total = plan.groups.len();
    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    log::info!(
        "Analyzing {} group(s) {} with {} worker(s)",
        total,
        plan.mode,
        config.workers.max(1)
    );

    let process = |planned: &PlannedGroup| -> GroupAnalysis {
        let outcome = analyze_group(planned, plan.budget, config, client);
        if let Err(e) = &outcome {
            failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("{}: {}", planned.group.key, e);
        }
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        on_progress(&AnalysisProgress {
            completed: done,
            total,
            failed: failed.load(Ordering::Relaxed),
        });
        GroupAnalysis {
            key: planned.group.key.clone(),
            row_count: planned.group.rows.len(),
            breakdown: planned.group.breakdown.clone(),
            outcome,
        }
    };

    let groups: Vec<GroupAnalysis> = if !plan.mode.is_grouped() {
        let mut out = Vec::with_capacity(total);
        for planned in &plan.groups {
            let result = process(planned);
            if let Err(e) = &result.outcome {
                return Err(e.clone()).context("LLM API error");
            }
            out.push(result);
        }
        out
    } else if config.workers <= 1 {
        plan.groups.iter().map(process).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .context("Failed to build worker pool")?;
        pool.install(|| plan.groups.par_iter().map(process).collect())
    };

    Ok(AnalysisReport {
        mode: plan.mode,
        groups,
        dropped_rows: plan.dropped_rows,
    })
}

/// Insights first, then the backlog; the first failure ends the group.
fn analyze_group(
    planned: &PlannedGroup,
    budget: TokenBudget,
    config: &AnalysisConfig,
    client: &dyn CompletionClient,
) -> Result<GroupInsights, LlmError> {
    let insights = client.complete(&ChatRequest {
        system: config.system_prompt.clone(),
        user: planned.prompts.insights.clone(),
        max_tokens: budget.insights,
    })?;

    let backlog = if config.include_backlog {
        Some(client.complete(&ChatRequest {
            system: config.system_prompt.clone(),
            user: planned.prompts.backlog.clone(),
            max_tokens: budget.backlog,
        })?)
    } else {
        None
    };

    Ok(GroupInsights { insights, backlog })
}
