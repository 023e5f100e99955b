//! Prompt templates for insight extraction and backlog generation.

use crate::grouping::{GroupKey, MarketBreakdown};

/// Maximum feedback lines sent for one un-nested group.
pub const SAMPLE_CAP: usize = 200;

/// Maximum feedback lines per market inside one episode.
pub const MARKET_SAMPLE_CAP: usize = 30;

pub const SYSTEM_PROMPT: &str = "You are a helpful product manager.";

/// Required line format when insights are attributed to markets.
pub const MARKET_ATTRIBUTION_FORMAT: &str =
    "Pain Point/Opportunity: <description> | Markets: <comma-separated markets>";

/// Required user story wording when feedback is grouped by episode.
pub const USER_STORY_FORMAT: &str = "As a [role], I want [an action] so that [a benefit]";

/// The two prompts sent for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub insights: String,
    pub backlog: String,
}

/// First `cap` items, in order.
pub fn truncate_sample(feedback: &[String], cap: usize) -> &[String] {
    &feedback[..feedback.len().min(cap)]
}

/// Render the feedback block that is interpolated into both templates.
///
/// With a breakdown, each market gets a heading and at most
/// [`MARKET_SAMPLE_CAP`] lines; there is no cap across markets.
pub fn render_sample(feedback: &[String], breakdown: Option<&MarketBreakdown>) -> String {
    match breakdown {
        Some(b) => b
            .markets
            .iter()
            .map(|(market, lines)| {
                let items: Vec<String> = truncate_sample(lines, MARKET_SAMPLE_CAP)
                    .iter()
                    .map(|l| format!("- {}", l))
                    .collect();
                format!("Market: {}\n{}", market, items.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        None => truncate_sample(feedback, SAMPLE_CAP).join("\n"),
    }
}

/// Build the insight and backlog prompts for one group.
pub fn build_prompts(
    key: &GroupKey,
    feedback: &[String],
    breakdown: Option<&MarketBreakdown>,
) -> PromptPair {
    let sample = render_sample(feedback, breakdown);
    let scope = if key.is_flat() {
        None
    } else {
        Some(key.to_string())
    };
    let by_market = breakdown.is_some() || key.market.is_some();
    let by_episode = key.episode.is_some();

    PromptPair {
        insights: insight_prompt(scope.as_deref(), &sample, by_market),
        backlog: backlog_prompt(scope.as_deref(), &sample, by_episode),
    }
}

fn insight_prompt(scope: Option<&str>, sample: &str, by_market: bool) -> String {
    let mut prompt = String::from(
        "You are a product manager. Analyze this list of consumer feedback",
    );
    if let Some(scope) = scope {
        prompt.push_str(&format!(" ({})", scope));
    }
    prompt.push_str(
        ". Identify exactly 5 pain points and exactly 5 opportunities for improvement. \
         List each pain point/opportunity with a short summary.",
    );
    if by_market {
        prompt.push_str(&format!(
            " For every item, name the markets where it was raised, one item per line, \
             using exactly this format:\n{}",
            MARKET_ATTRIBUTION_FORMAT
        ));
    }
    let heading = if by_market && sample.starts_with("Market: ") {
        "Feedback by market"
    } else {
        "Feedback"
    };
    prompt.push_str(&format!("\n\n{}:\n{}\n", heading, sample));
    prompt
}

fn backlog_prompt(scope: Option<&str>, sample: &str, by_episode: bool) -> String {
    let mut prompt = String::from(
        "Based on the following consumer feedback, generate a backlog of product enhancements",
    );
    if let Some(scope) = scope {
        prompt.push_str(&format!(" for {}", scope));
    }
    prompt.push_str(
        ". Format as:\n- EPIC: <epic name>\n  - User Story 1: <user story>\n  - User Story 2: <user story>\n",
    );
    if by_episode {
        prompt.push_str(&format!(
            "Write every user story exactly in the form: {}.\n",
            USER_STORY_FORMAT
        ));
    }
    prompt.push_str(&format!(
        "Focus on addressing pain points and leveraging opportunities.\n\nFeedback:\n{}\n",
        sample
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    fn episode(e: &str) -> GroupKey {
        GroupKey {
            episode: Some(e.to_string()),
            ..GroupKey::default()
        }
    }

    #[test]
    fn test_flat_sample_capped_in_order() {
        let feedback = lines(250);
        let sample = render_sample(&feedback, None);
        let rendered: Vec<&str> = sample.lines().collect();
        assert_eq!(rendered.len(), SAMPLE_CAP);
        assert_eq!(rendered[0], "line 0");
        assert_eq!(rendered[199], "line 199");
    }

    #[test]
    fn test_market_sample_capped_per_market() {
        let breakdown = MarketBreakdown {
            markets: vec![
                ("UK".to_string(), lines(40)),
                ("US".to_string(), lines(5)),
            ],
        };
        let sample = render_sample(&[], Some(&breakdown));
        let uk_items = sample
            .split("\n\n")
            .next()
            .unwrap()
            .lines()
            .filter(|l| l.starts_with("- "))
            .count();
        assert_eq!(uk_items, MARKET_SAMPLE_CAP);
        assert!(sample.contains("Market: US\n- line 0"));
        assert!(sample.contains("- line 29"));
        assert!(!sample.contains("- line 30"));
    }

    #[test]
    fn test_flat_prompts_match_plain_templates() {
        let prompts = build_prompts(&GroupKey::default(), &lines(2), None);
        assert!(prompts.insights.contains("exactly 5 pain points"));
        assert!(prompts.insights.ends_with("Feedback:\nline 0\nline 1\n"));
        assert!(!prompts.insights.contains("Markets:"));
        assert!(prompts.backlog.contains("- EPIC: <epic name>"));
        assert!(!prompts.backlog.contains(USER_STORY_FORMAT));
    }

    #[test]
    fn test_episode_backlog_requires_user_story_format() {
        let prompts = build_prompts(&episode("E1"), &lines(3), None);
        assert!(prompts
            .backlog
            .contains("As a [role], I want [an action] so that [a benefit]"));
        assert!(prompts.backlog.contains("for Episode: E1"));
    }

    #[test]
    fn test_episode_market_insights_require_market_attribution() {
        let breakdown = MarketBreakdown {
            markets: vec![("US".to_string(), lines(2))],
        };
        let prompts = build_prompts(&episode("E1"), &lines(2), Some(&breakdown));
        assert!(prompts
            .insights
            .contains("Markets: <comma-separated markets>"));
        assert!(prompts.insights.contains(MARKET_ATTRIBUTION_FORMAT));
        assert!(prompts.insights.contains("Feedback by market:\nMarket: US"));
    }
}
