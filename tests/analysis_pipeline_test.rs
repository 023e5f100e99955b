//! End-to-end tests for loading, grouping and analyzing feedback files
//!
//! The network is replaced by a recording client so every outbound request
//! can be inspected.

use feedback_backlog::pipeline::{analyze, plan_analysis, AnalysisConfig};
use feedback_backlog::prompts::USER_STORY_FORMAT;
use feedback_backlog::report::render_report;
use feedback_backlog::table::{load_table, ColumnKind};
use feedback_backlog::{ChatRequest, ColumnRoles, CompletionClient, GroupingMode, LlmError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Answers every request, failing those whose prompt mentions `fail_on`.
struct RecordingClient {
    requests: Mutex<Vec<ChatRequest>>,
    fail_on: Option<String>,
}

impl RecordingClient {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    fn failing_on(marker: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_on: Some(marker.to_string()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionClient for RecordingClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.fail_on {
            Some(marker) if request.user.contains(marker.as_str()) => {
                Err(LlmError::Transport("connection reset".to_string()))
            }
            _ if request.user.contains("backlog") => Ok("- EPIC: Faster playback".to_string()),
            _ => Ok("Pain Point: buffering | Markets: US".to_string()),
        }
    }
}

fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn test_three_row_episode_market_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "feedback.csv",
        "feedback,episode,market\n\
         Video keeps buffering,E1,US\n\
         Subtitles out of sync,E1,UK\n\
         Loved the finale,E1,US\n",
    );

    let table = load_table(&path).unwrap();
    let roles = ColumnRoles::flat("feedback")
        .with_episode("episode")
        .with_market("market");

    let plan = plan_analysis(&table, &roles).unwrap();
    assert_eq!(plan.mode, GroupingMode::EpisodeMarket);
    assert_eq!(plan.groups.len(), 1);
    let breakdown = plan.groups[0].group.breakdown.as_ref().unwrap();
    assert_eq!(breakdown.feedback_for("US").unwrap().len(), 2);
    assert_eq!(breakdown.feedback_for("UK").unwrap().len(), 1);
    assert!(plan.groups[0]
        .prompts
        .insights
        .contains("Markets: <comma-separated markets>"));
    assert!(plan.groups[0].prompts.backlog.contains(USER_STORY_FORMAT));

    let client = RecordingClient::new();
    let report = analyze(&table, &AnalysisConfig::new(roles), &client, &|_| {}).unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].key.to_string(), "Episode: E1");
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].max_tokens, 700);
    assert_eq!(requests[1].max_tokens, 900);

    let md = render_report(&report).unwrap();
    assert!(md.contains("- UK: 1 feedback line"));
    assert!(md.contains("- US: 2 feedback lines"));
}

#[test]
fn test_failed_group_does_not_block_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "feedback.csv",
        "comment,episode\n\
         app crashes on launch,E1\n\
         great soundtrack,E2\n",
    );
    let table = load_table(&path).unwrap();
    let client = RecordingClient::failing_on("crashes");
    let config = AnalysisConfig::new(ColumnRoles::flat("comment").with_episode("episode"));

    let report = analyze(&table, &config, &client, &|_| {}).unwrap();

    assert_eq!(report.groups.len(), 2);
    assert_eq!(
        report.groups[0].outcome,
        Err(LlmError::Transport("connection reset".to_string()))
    );
    let ok = report.groups[1].outcome.as_ref().unwrap();
    assert_eq!(ok.insights, "Pain Point: buffering | Markets: US");
    assert_eq!(ok.backlog.as_deref(), Some("- EPIC: Faster playback"));

    let md = render_report(&report).unwrap();
    assert!(md.contains("> **Error:** request failed: connection reset"));
    assert!(md.contains("- EPIC: Faster playback"));
}

#[test]
fn test_groups_cover_exactly_the_complete_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("feedback,episode,market,country\n");
    let mut complete = 0;
    for i in 0..60 {
        let feedback = if i % 7 == 0 { String::new() } else { format!("note {}", i) };
        let market = if i % 11 == 0 { "" } else if i % 2 == 0 { "EU" } else { "AM" };
        let country = ["DE", "FR", "US"][i % 3];
        if !feedback.is_empty() && !market.is_empty() {
            complete += 1;
        }
        csv.push_str(&format!("{},E{},{},{}\n", feedback, i % 4, market, country));
    }
    let path = write_csv(dir.path(), "feedback.csv", &csv);
    let table = load_table(&path).unwrap();

    let roles = ColumnRoles::flat("feedback")
        .with_episode("episode")
        .with_market("market")
        .with_country("country");
    let plan = plan_analysis(&table, &roles).unwrap();

    let mut rows: Vec<usize> = plan.groups.iter().flat_map(|g| g.group.rows.clone()).collect();
    rows.sort_unstable();
    rows.dedup();
    assert_eq!(rows.len(), complete);
    assert_eq!(plan.dropped_rows, table.len() - complete);
    assert!(plan.groups.iter().all(|g| !g.group.rows.is_empty()));
    assert!(plan.groups.iter().all(|g| g.group.breakdown.is_none()));
}

#[test]
fn test_xlsx_first_sheet_loaded() {
    use rust_xlsxwriter::Workbook;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feedback.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "response").unwrap();
    sheet.write_string(0, 1, "rating").unwrap();
    sheet.write_string(0, 2, "episode").unwrap();
    sheet.write_string(1, 0, "Too many ads").unwrap();
    sheet.write_number(1, 1, 2.0).unwrap();
    sheet.write_string(1, 2, "E1").unwrap();
    sheet.write_string(2, 0, "Great pacing").unwrap();
    sheet.write_number(2, 1, 5.0).unwrap();
    sheet.write_string(2, 2, "E2").unwrap();
    let other = workbook.add_worksheet();
    other.write_string(0, 0, "ignored").unwrap();
    workbook.save(&path).unwrap();

    let table = load_table(&path).unwrap();
    assert_eq!(table.columns(), &["response", "rating", "episode"]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.column_kind(1), ColumnKind::Numeric);
    assert_eq!(table.text_columns(), vec!["response", "episode"]);
}

#[test]
fn test_unreadable_file_fails_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.csv");
    assert!(load_table(&missing).is_err());

    let bad = write_csv(dir.path(), "bad.csv", "a,b\n1,2,3,4\n");
    let err = load_table(&bad).unwrap_err();
    assert!(format!("{:#}", err).contains("Error reading file"));

    let not_xlsx = write_csv(dir.path(), "fake.xlsx", "not a workbook");
    assert!(load_table(&not_xlsx).is_err());
}
