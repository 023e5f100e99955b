//! Markdown rendering of analysis plans and results.
//!
//! Every group becomes one collapsible `<details>` section, in grouping order.

use crate::grouping::MarketBreakdown;
use crate::pipeline::{AnalysisPlan, AnalysisReport, GroupAnalysis};
use anyhow::Result;
use std::fmt::Write;

pub const INSIGHTS_HEADING: &str = "Key Pain Points & Opportunities";
pub const BACKLOG_HEADING: &str = "Generated Backlog (EPICs & User Stories)";
pub const DONE_MESSAGE: &str = "Done! You can copy the backlog items above to your planning tool.";

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// Market lines for a breakdown, e.g. `- US: 2 feedback lines`.
pub fn breakdown_lines(breakdown: &MarketBreakdown) -> Vec<String> {
    breakdown
        .markets
        .iter()
        .map(|(market, lines)| format!("- {}: {}", market, plural(lines.len(), "feedback line")))
        .collect()
}

/// Render a finished run.
pub fn render_report(report: &AnalysisReport) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "# Feedback Analysis ({})", report.mode)?;
    writeln!(out)?;
    writeln!(
        out,
        "{}, {} failed, {} dropped for missing values.",
        plural(report.groups.len(), "group"),
        report.failed_count(),
        plural(report.dropped_rows, "row")
    )?;

    if report.groups.is_empty() {
        writeln!(out)?;
        writeln!(out, "_No feedback left to analyze._")?;
    }

    for group in &report.groups {
        writeln!(out)?;
        render_group(&mut out, group)?;
    }

    Ok(out)
}

fn render_group(out: &mut String, group: &GroupAnalysis) -> Result<()> {
    writeln!(out, "<details open>")?;
    writeln!(
        out,
        "<summary><b>{}</b> ({})</summary>",
        group.key,
        plural(group.row_count, "feedback row")
    )?;
    writeln!(out)?;

    if let Some(breakdown) = &group.breakdown {
        writeln!(out, "**Markets**")?;
        writeln!(out)?;
        for line in breakdown_lines(breakdown) {
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
    }

    match &group.outcome {
        Ok(result) => {
            writeln!(out, "### {}", INSIGHTS_HEADING)?;
            writeln!(out)?;
            writeln!(out, "{}", result.insights.trim_end())?;
            if let Some(backlog) = &result.backlog {
                writeln!(out)?;
                writeln!(out, "### {}", BACKLOG_HEADING)?;
                writeln!(out)?;
                writeln!(out, "```markdown")?;
                writeln!(out, "{}", backlog.trim_end())?;
                writeln!(out, "```")?;
            }
        }
        Err(e) => {
            writeln!(out, "> **Error:** {}", e)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "</details>")?;
    Ok(())
}

/// Render a dry run: groups, sizes and the exact prompts.
pub fn render_plan(plan: &AnalysisPlan) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "# Analysis Preview ({})", plan.mode)?;
    writeln!(out)?;
    writeln!(
        out,
        "{}, {} dropped for missing values. Token budget: {} (insights) / {} (backlog).",
        plural(plan.groups.len(), "group"),
        plural(plan.dropped_rows, "row"),
        plan.budget.insights,
        plan.budget.backlog
    )?;

    for planned in &plan.groups {
        writeln!(out)?;
        writeln!(out, "<details>")?;
        writeln!(
            out,
            "<summary><b>{}</b> ({})</summary>",
            planned.group.key,
            plural(planned.group.rows.len(), "feedback row")
        )?;
        writeln!(out)?;
        if let Some(breakdown) = &planned.group.breakdown {
            for line in breakdown_lines(breakdown) {
                writeln!(out, "{}", line)?;
            }
            writeln!(out)?;
        }
        writeln!(out, "#### Insight prompt")?;
        writeln!(out)?;
        writeln!(out, "```text\n{}```", planned.prompts.insights)?;
        writeln!(out)?;
        writeln!(out, "#### Backlog prompt")?;
        writeln!(out)?;
        writeln!(out, "```text\n{}```", planned.prompts.backlog)?;
        writeln!(out)?;
        writeln!(out, "</details>")?;
    }

    Ok(out)
}
