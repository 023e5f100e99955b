//! Partition feedback rows by episode, market and country.
//!
//! Rows missing any selected value are dropped. The remaining rows form flat
//! Cartesian groups; in episode+market mode each episode group also carries a
//! per-market breakdown used for sample capping and prompt layout.

use crate::table::FeedbackTable;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;

/// Which table columns play which role in the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    /// Column holding the free-text feedback
    pub feedback: String,
    pub episode: Option<String>,
    pub market: Option<String>,
    pub country: Option<String>,
}

impl ColumnRoles {
    pub fn flat(feedback: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
            ..Self::default()
        }
    }

    pub fn with_episode(mut self, column: impl Into<String>) -> Self {
        self.episode = Some(column.into());
        self
    }

    pub fn with_market(mut self, column: impl Into<String>) -> Self {
        self.market = Some(column.into());
        self
    }

    pub fn with_country(mut self, column: impl Into<String>) -> Self {
        self.country = Some(column.into());
        self
    }
}

// ============================================================================
// Grouping mode
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingMode {
    /// All feedback in one group
    Flat,
    /// One group per episode
    Episode,
    /// One group per episode, with markets nested inside it
    EpisodeMarket,
    /// One group per (episode, market, country)
    EpisodeMarketCountry,
}

impl GroupingMode {
    /// Derive the mode from which categorical roles are filled in.
    pub fn from_roles(roles: &ColumnRoles) -> Result<Self> {
        match (
            roles.episode.is_some(),
            roles.market.is_some(),
            roles.country.is_some(),
        ) {
            (false, false, false) => Ok(GroupingMode::Flat),
            (true, false, false) => Ok(GroupingMode::Episode),
            (true, true, false) => Ok(GroupingMode::EpisodeMarket),
            (true, true, true) => Ok(GroupingMode::EpisodeMarketCountry),
            (false, _, _) => Err(anyhow::anyhow!(
                "A market or country column requires an episode column"
            )),
            (true, false, true) => Err(anyhow::anyhow!(
                "A country column requires a market column"
            )),
        }
    }

    pub fn is_grouped(self) -> bool {
        self != GroupingMode::Flat
    }
}

impl fmt::Display for GroupingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupingMode::Flat => "no grouping",
            GroupingMode::Episode => "by episode",
            GroupingMode::EpisodeMarket => "by episode, markets nested",
            GroupingMode::EpisodeMarketCountry => "by episode x market x country",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Groups
// ============================================================================

/// Categorical values identifying one group. All `None` in flat mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub episode: Option<String>,
    pub market: Option<String>,
    pub country: Option<String>,
}

impl GroupKey {
    pub fn is_flat(&self) -> bool {
        self.episode.is_none() && self.market.is_none() && self.country.is_none()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_flat() {
            return f.write_str("All feedback");
        }
        let parts: Vec<String> = [
            ("Episode", &self.episode),
            ("Market", &self.market),
            ("Country", &self.country),
        ]
        .iter()
        .filter_map(|(label, v)| v.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
        f.write_str(&parts.join(" | "))
    }
}

/// Feedback of one episode split by market, markets in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketBreakdown {
    pub markets: Vec<(String, Vec<String>)>,
}

impl MarketBreakdown {
    pub fn market_names(&self) -> Vec<&str> {
        self.markets.iter().map(|(m, _)| m.as_str()).collect()
    }

    pub fn feedback_for(&self, market: &str) -> Option<&[String]> {
        self.markets
            .iter()
            .find(|(m, _)| m == market)
            .map(|(_, f)| f.as_slice())
    }
}

/// One partition of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackGroup {
    pub key: GroupKey,
    /// Indices of the table rows in this group, ascending
    pub rows: Vec<usize>,
    /// Feedback text in row order
    pub feedback: Vec<String>,
    pub breakdown: Option<MarketBreakdown>,
}

/// Output of [`group_feedback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedFeedback {
    pub mode: GroupingMode,
    pub groups: Vec<FeedbackGroup>,
    /// Rows dropped for a missing value in a selected column
    pub dropped_rows: usize,
}

#[derive(Default)]
struct Accumulator {
    rows: Vec<usize>,
    feedback: Vec<String>,
    markets: BTreeMap<String, Vec<String>>,
}

/// Partition the table according to `roles`.
pub fn group_feedback(table: &FeedbackTable, roles: &ColumnRoles) -> Result<GroupedFeedback> {
    let mode = GroupingMode::from_roles(roles)?;

    let feedback_idx = table.require_column(&roles.feedback)?;
    let resolve = |col: &Option<String>| -> Result<Option<usize>> {
        col.as_deref().map(|c| table.require_column(c)).transpose()
    };
    let episode_idx = resolve(&roles.episode)?;
    let market_idx = resolve(&roles.market)?;
    let country_idx = resolve(&roles.country)?;

    let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
    let mut dropped_rows = 0usize;

    for row in 0..table.len() {
        let value = |idx: Option<usize>| -> Option<Option<String>> {
            match idx {
                Some(i) => table.cell(row, i).as_text().map(Some),
                None => Some(None),
            }
        };

        let (Some(feedback), Some(episode), Some(market), Some(country)) = (
            table.cell(row, feedback_idx).as_text(),
            value(episode_idx),
            value(market_idx),
            value(country_idx),
        ) else {
            dropped_rows += 1;
            continue;
        };

        let nested = mode == GroupingMode::EpisodeMarket;
        let key = GroupKey {
            episode,
            market: if nested { None } else { market.clone() },
            country,
        };

        let acc = groups.entry(key).or_default();
        acc.rows.push(row);
        if let (true, Some(m)) = (nested, market) {
            acc.markets.entry(m).or_default().push(feedback.clone());
        }
        acc.feedback.push(feedback);
    }

    let groups: Vec<FeedbackGroup> = groups
        .into_iter()
        .map(|(key, acc)| FeedbackGroup {
            key,
            rows: acc.rows,
            feedback: acc.feedback,
            breakdown: if mode == GroupingMode::EpisodeMarket {
                Some(MarketBreakdown {
                    markets: acc.markets.into_iter().collect(),
                })
            } else {
                None
            },
        })
        .collect();

    log::info!(
        "Grouped {} rows into {} group(s) {} ({} dropped for missing values)",
        table.len() - dropped_rows,
        groups.len(),
        mode,
        dropped_rows
    );

    Ok(GroupedFeedback {
        mode,
        groups,
        dropped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_csv_from;

    fn table(csv: &str) -> FeedbackTable {
        read_csv_from(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_mode_from_roles() {
        let base = ColumnRoles::flat("feedback");
        assert_eq!(GroupingMode::from_roles(&base).unwrap(), GroupingMode::Flat);
        assert_eq!(
            GroupingMode::from_roles(&base.clone().with_episode("ep").with_market("m")).unwrap(),
            GroupingMode::EpisodeMarket
        );
        assert!(GroupingMode::from_roles(&base.clone().with_market("m")).is_err());
        assert!(GroupingMode::from_roles(&base.with_episode("ep").with_country("c")).is_err());
    }

    #[test]
    fn test_flat_drops_missing_feedback() {
        let t = table("feedback,score\ngood,1\n,2\nbad,3\n");
        let grouped = group_feedback(&t, &ColumnRoles::flat("feedback")).unwrap();
        assert_eq!(grouped.groups.len(), 1);
        assert_eq!(grouped.groups[0].feedback, vec!["good", "bad"]);
        assert_eq!(grouped.groups[0].rows, vec![0, 2]);
        assert_eq!(grouped.dropped_rows, 1);
        assert!(grouped.groups[0].key.is_flat());
    }

    #[test]
    fn test_flat_with_no_feedback_yields_no_groups() {
        let t = table("feedback,episode\n,E1\n");
        let grouped = group_feedback(&t, &ColumnRoles::flat("feedback")).unwrap();
        assert!(grouped.groups.is_empty());
    }

    #[test]
    fn test_episode_groups_sorted_and_complete() {
        let t = table(
            "feedback,episode\n\
             a,E2\n\
             b,E1\n\
             c,\n\
             d,E2\n",
        );
        let grouped =
            group_feedback(&t, &ColumnRoles::flat("feedback").with_episode("episode")).unwrap();
        let labels: Vec<String> = grouped.groups.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(labels, vec!["Episode: E1", "Episode: E2"]);
        assert_eq!(grouped.groups[1].feedback, vec!["a", "d"]);

        let total: usize = grouped.groups.iter().map(|g| g.rows.len()).sum();
        assert_eq!(total + grouped.dropped_rows, t.len());
        assert!(grouped.groups.iter().all(|g| !g.rows.is_empty()));
    }

    #[test]
    fn test_episode_market_nests_markets() {
        let t = table(
            "feedback,episode,market\n\
             one,E1,US\n\
             two,E1,UK\n\
             three,E1,US\n",
        );
        let roles = ColumnRoles::flat("feedback")
            .with_episode("episode")
            .with_market("market");
        let grouped = group_feedback(&t, &roles).unwrap();
        assert_eq!(grouped.mode, GroupingMode::EpisodeMarket);
        assert_eq!(grouped.groups.len(), 1);

        let group = &grouped.groups[0];
        assert_eq!(group.key.episode.as_deref(), Some("E1"));
        assert_eq!(group.key.market, None);
        let breakdown = group.breakdown.as_ref().unwrap();
        assert_eq!(breakdown.market_names(), vec!["UK", "US"]);
        assert_eq!(breakdown.feedback_for("US").unwrap(), &["one", "three"]);
        assert_eq!(breakdown.feedback_for("UK").unwrap(), &["two"]);
    }

    #[test]
    fn test_cartesian_groups() {
        let t = table(
            "feedback,episode,market,country\n\
             a,E1,EU,DE\n\
             b,E1,EU,FR\n\
             c,E1,EU,DE\n\
             d,E1,,DE\n",
        );
        let roles = ColumnRoles::flat("feedback")
            .with_episode("episode")
            .with_market("market")
            .with_country("country");
        let grouped = group_feedback(&t, &roles).unwrap();
        assert_eq!(grouped.groups.len(), 2);
        assert_eq!(
            grouped.groups[0].key.to_string(),
            "Episode: E1 | Market: EU | Country: DE"
        );
        assert_eq!(grouped.groups[0].feedback, vec!["a", "c"]);
        assert!(grouped.groups[0].breakdown.is_none());
        assert_eq!(grouped.dropped_rows, 1);
    }

    #[test]
    fn test_numeric_looking_values_stay_distinct() {
        let t = table(
            "feedback,episode\n\
             007 is great,01\n\
             meh,1\n\
             fine,pilot\n\
             1.50,x\n",
        );
        let grouped =
            group_feedback(&t, &ColumnRoles::flat("feedback").with_episode("episode")).unwrap();
        let labels: Vec<String> = grouped.groups.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(
            labels,
            vec!["Episode: 01", "Episode: 1", "Episode: pilot", "Episode: x"]
        );
        assert_eq!(grouped.groups[0].feedback, vec!["007 is great"]);
        assert_eq!(grouped.groups[3].feedback, vec!["1.50"]);
    }

    #[test]
    fn test_na_marker_counts_as_missing() {
        let t = table("feedback,episode,market\na,E1,NA\nb,E1,EU\n");
        let roles = ColumnRoles::flat("feedback")
            .with_episode("episode")
            .with_market("market");
        let grouped = group_feedback(&t, &roles).unwrap();
        assert_eq!(grouped.dropped_rows, 1);
        let breakdown = grouped.groups[0].breakdown.as_ref().unwrap();
        assert_eq!(breakdown.market_names(), vec!["EU"]);
    }

    #[test]
    fn test_same_column_for_two_roles() {
        let t = table("feedback\nx\ny\n");
        let roles = ColumnRoles::flat("feedback").with_episode("feedback");
        let grouped = group_feedback(&t, &roles).unwrap();
        assert_eq!(grouped.groups.len(), 2);
    }

    #[test]
    fn test_unknown_column() {
        let t = table("feedback\nx\n");
        assert!(group_feedback(&t, &ColumnRoles::flat("comment")).is_err());
    }
}
