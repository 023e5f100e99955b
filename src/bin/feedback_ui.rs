//! Feedback Backlog Generator - Graphical User Interface
//!
//! Upload a CSV or Excel file of consumer feedback, pick the feedback and
//! category columns, and generate pain points, opportunities and a backlog
//! of EPICs and user stories, one collapsible section per group.

use feedback_backlog::config::Settings;
use feedback_backlog::pipeline::{self, AnalysisConfig, AnalysisReport, GroupAnalysis};
use feedback_backlog::report::{breakdown_lines, BACKLOG_HEADING, DONE_MESSAGE, INSIGHTS_HEADING};
use feedback_backlog::table::{load_table, FeedbackTable};
use feedback_backlog::{ColumnRoles, GroqClient, GroupingMode};
use iced::widget::{
    button, checkbox, column, container, pick_list, progress_bar, row, rule, scrollable, text,
    text_input,
};
use iced::{Center, Element, Fill, Task, Theme};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Pick-list entry meaning "do not group by this column".
const NO_COLUMN: &str = "(none)";

fn main() -> iced::Result {
    env_logger::init();
    iced::application(App::new, App::update, App::view)
        .theme(App::theme)
        .centered()
        .run()
}

// ============================================================================
// App State
// ============================================================================

struct App {
    // Sidebar
    api_key: String,
    settings: Settings,
    settings_path: Option<PathBuf>,
    workers: String,
    advanced_open: bool,

    // Upload and column selection
    input_path: String,
    table: Option<Arc<FeedbackTable>>,
    load_error: Option<String>,
    text_columns: Vec<String>,
    optional_columns: Vec<String>,
    feedback_col: Option<String>,
    episode_col: String,
    market_col: String,
    country_col: String,
    include_backlog: bool,

    // Task state
    is_running: bool,
    progress: f32,
    progress_completed: usize,
    progress_total: usize,
    progress_failed: usize,
    status_text: String,

    // Results
    report: Option<AnalysisReport>,
    expanded: Vec<bool>,
}

impl App {
    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn new() -> (Self, Task<Message>) {
        let settings_path = Settings::default_path();
        let settings = Settings::load_default();
        (
            App {
                api_key: String::new(),
                workers: settings.workers.to_string(),
                settings,
                settings_path,
                advanced_open: false,
                input_path: String::new(),
                table: None,
                load_error: None,
                text_columns: Vec::new(),
                optional_columns: Vec::new(),
                feedback_col: None,
                episode_col: NO_COLUMN.to_string(),
                market_col: NO_COLUMN.to_string(),
                country_col: NO_COLUMN.to_string(),
                include_backlog: true,
                is_running: false,
                progress: 0.0,
                progress_completed: 0,
                progress_total: 0,
                progress_failed: 0,
                status_text: String::new(),
                report: None,
                expanded: Vec::new(),
            },
            Task::none(),
        )
    }

    /// Column roles from the current pick-list selections.
    fn roles(&self) -> Option<ColumnRoles> {
        let optional = |c: &String| {
            if c == NO_COLUMN {
                None
            } else {
                Some(c.clone())
            }
        };
        Some(ColumnRoles {
            feedback: self.feedback_col.clone()?,
            episode: optional(&self.episode_col),
            market: optional(&self.market_col),
            country: optional(&self.country_col),
        })
    }

    /// Grouping mode for the current selection, or the reason it is invalid.
    fn grouping_mode(&self) -> Option<Result<GroupingMode, String>> {
        self.roles()
            .map(|r| GroupingMode::from_roles(&r).map_err(|e| e.to_string()))
    }

    fn can_analyze(&self) -> bool {
        !self.is_running
            && !self.api_key.trim().is_empty()
            && self.table.is_some()
            && matches!(self.grouping_mode(), Some(Ok(_)))
    }

    fn save_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save(path) {
                log::warn!("{:#}", e);
            }
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
enum Message {
    // Sidebar
    ApiKeyChanged(String),
    ToggleAdvanced,
    WorkersChanged(String),
    BaseUrlChanged(String),
    ModelChanged(String),
    SystemPromptChanged(String),

    // File upload
    BrowseFile,
    FileSelected(Option<PathBuf>),
    TableLoaded(Result<Arc<FeedbackTable>, String>),

    // Column selection
    FeedbackColumnSelected(String),
    EpisodeColumnSelected(String),
    MarketColumnSelected(String),
    CountryColumnSelected(String),
    BacklogToggled(bool),

    // Analysis
    AnalyzeStart,
    ProgressUpdate {
        completed: usize,
        total: usize,
        failed: usize,
    },
    AnalysisFinished(Result<AnalysisReport, String>),
    ToggleGroup(usize),
}

// ============================================================================
// Update
// ============================================================================

impl App {
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            // -- Sidebar --
            Message::ApiKeyChanged(v) => {
                self.api_key = v;
                Task::none()
            }
            Message::ToggleAdvanced => {
                self.advanced_open = !self.advanced_open;
                Task::none()
            }
            Message::WorkersChanged(v) => {
                if let Ok(n) = v.trim().parse::<usize>() {
                    if n > 0 {
                        self.settings.workers = n;
                        self.save_settings();
                    }
                }
                self.workers = v;
                Task::none()
            }
            Message::BaseUrlChanged(v) => {
                self.settings.base_url = v;
                self.save_settings();
                Task::none()
            }
            Message::ModelChanged(v) => {
                self.settings.model = v;
                self.save_settings();
                Task::none()
            }
            Message::SystemPromptChanged(v) => {
                self.settings.system_prompt = v;
                self.save_settings();
                Task::none()
            }

            // -- File upload --
            Message::BrowseFile => Task::perform(
                async {
                    let file = rfd::AsyncFileDialog::new()
                        .set_title("Upload your feedback CSV or Excel file")
                        .add_filter("Feedback files", &["csv", "xlsx"])
                        .pick_file()
                        .await;
                    file.map(|f| f.path().to_path_buf())
                },
                Message::FileSelected,
            ),
            Message::FileSelected(path) => {
                let Some(p) = path else {
                    return Task::none();
                };
                self.input_path = p.display().to_string();
                // A new upload discards the previous table and results
                self.table = None;
                self.load_error = None;
                self.report = None;
                self.expanded.clear();
                self.status_text.clear();
                Task::perform(
                    async move {
                        load_table(&p)
                            .map(Arc::new)
                            .map_err(|e| format!("{:#}", e))
                    },
                    Message::TableLoaded,
                )
            }
            Message::TableLoaded(result) => {
                match result {
                    Ok(table) => {
                        self.text_columns = table.text_columns();
                        self.optional_columns = std::iter::once(NO_COLUMN.to_string())
                            .chain(self.text_columns.iter().cloned())
                            .collect();
                        self.feedback_col = self.text_columns.first().cloned();
                        self.episode_col = NO_COLUMN.to_string();
                        self.market_col = NO_COLUMN.to_string();
                        self.country_col = NO_COLUMN.to_string();
                        if self.text_columns.is_empty() {
                            self.load_error =
                                Some("The file has no text columns to analyze.".to_string());
                        }
                        self.table = Some(table);
                    }
                    Err(e) => {
                        self.load_error = Some(format!("Error reading file: {}", e));
                        self.text_columns.clear();
                        self.optional_columns.clear();
                        self.feedback_col = None;
                    }
                }
                Task::none()
            }

            // -- Column selection --
            Message::FeedbackColumnSelected(c) => {
                self.feedback_col = Some(c);
                Task::none()
            }
            Message::EpisodeColumnSelected(c) => {
                self.episode_col = c;
                Task::none()
            }
            Message::MarketColumnSelected(c) => {
                self.market_col = c;
                Task::none()
            }
            Message::CountryColumnSelected(c) => {
                self.country_col = c;
                Task::none()
            }
            Message::BacklogToggled(v) => {
                self.include_backlog = v;
                Task::none()
            }

            // -- Analysis --
            Message::AnalyzeStart => {
                let (Some(table), Some(roles)) = (self.table.clone(), self.roles()) else {
                    return Task::none();
                };
                if !self.can_analyze() {
                    return Task::none();
                }

                self.is_running = true;
                self.progress = 0.0;
                self.progress_completed = 0;
                self.progress_total = 0;
                self.progress_failed = 0;
                self.report = None;
                self.expanded.clear();
                self.status_text =
                    "Analyzing feedback, extracting pain points & opportunities...".to_string();

                let config = AnalysisConfig {
                    roles,
                    include_backlog: self.include_backlog,
                    workers: self.settings.workers,
                    system_prompt: self.settings.system_prompt.clone(),
                };
                Task::run(
                    analysis_stream(table, config, self.api_key.clone(), self.settings.clone()),
                    |msg| msg,
                )
            }
            Message::ProgressUpdate {
                completed,
                total,
                failed,
            } => {
                self.progress_completed = completed;
                self.progress_total = total;
                self.progress_failed = failed;
                self.progress = if total > 0 {
                    completed as f32 / total as f32
                } else {
                    0.0
                };
                Task::none()
            }
            Message::AnalysisFinished(result) => {
                self.is_running = false;
                self.progress = 0.0;
                self.status_text = finished_status(&result);
                if let Ok(report) = result {
                    self.expanded = vec![report.groups.len() == 1; report.groups.len()];
                    self.report = Some(report);
                }
                Task::none()
            }
            Message::ToggleGroup(i) => {
                if let Some(open) = self.expanded.get_mut(i) {
                    *open = !*open;
                }
                Task::none()
            }
        }
    }
}

// ============================================================================
// View
// ============================================================================

impl App {
    fn view(&self) -> Element<'_, Message> {
        let sidebar = container(self.view_sidebar()).padding(20).width(300);
        let main = container(scrollable(self.view_main()).height(Fill))
            .padding(20)
            .width(Fill)
            .height(Fill);

        row![sidebar, rule::vertical(1), main].into()
    }

    fn view_sidebar(&self) -> Element<'_, Message> {
        let key_section = column![
            text("Enter your Groq API key").size(14),
            text_input("gsk_...", &self.api_key)
                .secure(true)
                .on_input(Message::ApiKeyChanged),
            text("Get one at https://console.groq.com/")
                .size(12)
                .color(iced::Color::from_rgb(0.6, 0.6, 0.6)),
        ]
        .spacing(6);

        let disabled = self.is_running;
        let advanced_header = button(
            text(if self.advanced_open {
                "v Advanced Settings"
            } else {
                "> Advanced Settings"
            })
            .size(13),
        )
        .on_press(Message::ToggleAdvanced)
        .style(button::text);

        let advanced_panel = if self.advanced_open {
            column![
                text("Model:").size(13),
                text_input("llama3-70b-8192", &self.settings.model).on_input_maybe(
                    if disabled {
                        None
                    } else {
                        Some(Message::ModelChanged)
                    }
                ),
                text("API base URL:").size(13),
                text_input("https://api.groq.com/openai/v1", &self.settings.base_url)
                    .on_input_maybe(if disabled {
                        None
                    } else {
                        Some(Message::BaseUrlChanged)
                    }),
                text("System prompt:").size(13),
                text_input("You are a helpful product manager.", &self.settings.system_prompt)
                    .on_input_maybe(if disabled {
                        None
                    } else {
                        Some(Message::SystemPromptChanged)
                    }),
                row![
                    text("Parallel groups:").size(13).width(120),
                    text_input("1", &self.workers)
                        .on_input_maybe(if disabled {
                            None
                        } else {
                            Some(Message::WorkersChanged)
                        })
                        .width(60),
                ]
                .spacing(10)
                .align_y(Center),
            ]
            .spacing(6)
        } else {
            column![]
        };

        column![key_section, rule::horizontal(1), advanced_header, advanced_panel]
            .spacing(12)
            .into()
    }

    fn view_main(&self) -> Element<'_, Message> {
        let title = text("Consumer Feedback to Product Backlog Generator").size(26);
        let intro = column![
            text("Upload a CSV or Excel file with consumer feedback to generate a backlog of product enhancements (EPICs & user stories).").size(14),
            text("  - Your file should have a column with the feedback (e.g. \"feedback\", \"comment\", \"response\").").size(13),
            text("  - Optionally pick episode, market and country columns to analyze each group separately.").size(13),
            text("  - Enter your Groq API key in the sidebar.").size(13),
        ]
        .spacing(4);

        let mut browse = button(text("Browse").size(13));
        if !self.is_running {
            browse = browse.on_press(Message::BrowseFile);
        }
        let upload = row![
            text("Feedback file:").width(130),
            text_input("Select a .csv or .xlsx file...", &self.input_path).width(Fill),
            browse,
        ]
        .spacing(10)
        .align_y(Center);

        let mut items: Vec<Element<'_, Message>> =
            vec![title.into(), intro.into(), upload.into()];

        if let Some(err) = &self.load_error {
            items.push(
                text(err)
                    .size(13)
                    .color(iced::Color::from_rgb(0.9, 0.4, 0.4))
                    .into(),
            );
        }

        if self.table.is_none() {
            if self.load_error.is_none() {
                items.push(text("Upload a CSV or Excel file to get started.").size(13).into());
            }
            return column(items).spacing(16).into();
        }

        items.push(self.view_columns());
        items.push(self.view_actions());

        if let Some(report) = &self.report {
            items.push(rule::horizontal(1).into());
            items.push(self.view_results(report));
        }

        column(items).spacing(16).into()
    }

    fn view_columns(&self) -> Element<'_, Message> {
        let rows_note = self
            .table
            .as_ref()
            .map(|t| format!("{} rows, {} text column(s)", t.len(), self.text_columns.len()))
            .unwrap_or_default();

        let mut section = column![
            text("Step 1: Select Columns").size(18),
            text(rows_note).size(12),
            column_picker(
                "Feedback text:",
                pick_list(
                    self.text_columns.as_slice(),
                    self.feedback_col.as_ref(),
                    Message::FeedbackColumnSelected,
                )
                .placeholder("Select the column containing feedback text")
                .into(),
            ),
            column_picker(
                "Episode:",
                pick_list(
                    self.optional_columns.as_slice(),
                    Some(&self.episode_col),
                    Message::EpisodeColumnSelected,
                )
                .into(),
            ),
            column_picker(
                "Market:",
                pick_list(
                    self.optional_columns.as_slice(),
                    Some(&self.market_col),
                    Message::MarketColumnSelected,
                )
                .into(),
            ),
            column_picker(
                "Country:",
                pick_list(
                    self.optional_columns.as_slice(),
                    Some(&self.country_col),
                    Message::CountryColumnSelected,
                )
                .into(),
            ),
            checkbox(self.include_backlog)
                .label("Generate backlog (EPICs & user stories)")
                .on_toggle_maybe(if self.is_running {
                    None
                } else {
                    Some(Message::BacklogToggled)
                }),
        ]
        .spacing(10);

        match self.grouping_mode() {
            Some(Ok(mode)) => {
                section = section.push(text(format!("Grouping: {}", mode)).size(12));
            }
            Some(Err(e)) => {
                section = section.push(
                    text(e)
                        .size(12)
                        .color(iced::Color::from_rgb(0.9, 0.4, 0.4)),
                );
            }
            None => {}
        }

        section.into()
    }

    fn view_actions(&self) -> Element<'_, Message> {
        let analyze_btn = button(text("Analyze Feedback")).on_press_maybe(if self.can_analyze() {
            Some(Message::AnalyzeStart)
        } else {
            None
        });

        let mut items: Vec<Element<'_, Message>> = vec![row![analyze_btn]
            .spacing(10)
            .align_y(Center)
            .into()];

        if self.api_key.trim().is_empty() && !self.is_running {
            items.push(
                text("Please enter your Groq API key in the sidebar to enable analysis.")
                    .size(13)
                    .into(),
            );
        }

        if self.is_running {
            items.push(progress_bar(0.0..=1.0, self.progress).into());
            items.push(
                text(format!(
                    "{}/{} groups ({} errors)",
                    self.progress_completed, self.progress_total, self.progress_failed
                ))
                .size(13)
                .into(),
            );
        }

        if !self.status_text.is_empty() {
            items.push(text(&self.status_text).size(13).into());
        }

        column(items).spacing(8).into()
    }

    fn view_results<'a>(&'a self, report: &'a AnalysisReport) -> Element<'a, Message> {
        let mut sections: Vec<Element<'a, Message>> = Vec::new();
        sections.push(
            text(format!(
                "Results ({}, {} dropped row(s))",
                report.mode, report.dropped_rows
            ))
            .size(18)
            .into(),
        );

        for (i, group) in report.groups.iter().enumerate() {
            let open = self.expanded.get(i).copied().unwrap_or(false);
            sections.push(group_section(i, group, open));
        }

        column(sections).spacing(8).into()
    }
}

// ============================================================================
// Helper widgets
// ============================================================================

/// Label + pick list row.
/// Status line shown once a run ends.
///
/// A run-level error may come from grouping or client setup as well as from
/// the API, so it is reported without naming the provider.
fn finished_status(result: &Result<AnalysisReport, String>) -> String {
    match result {
        Ok(report) => {
            let failed = report.failed_count();
            if report.groups.is_empty() {
                "No feedback left to analyze after dropping rows with missing values.".to_string()
            } else if failed == report.groups.len() {
                format!("All {} group(s) failed.", failed)
            } else if failed > 0 {
                format!("{} ({} group(s) failed)", DONE_MESSAGE, failed)
            } else {
                DONE_MESSAGE.to_string()
            }
        }
        Err(e) => format!("Analysis failed: {}", e),
    }
}

fn column_picker<'a>(label: &'a str, picker: Element<'a, Message>) -> Element<'a, Message> {
    row![text(label).width(130), picker]
        .spacing(10)
        .align_y(Center)
        .into()
}

/// Collapsible section for one group's results.
fn group_section(index: usize, group: &GroupAnalysis, open: bool) -> Element<'_, Message> {
    let marker = if open { "v" } else { ">" };
    let status = if group.outcome.is_err() { "  [failed]" } else { "" };
    let header = button(
        text(format!(
            "{} {} ({} feedback rows){}",
            marker, group.key, group.row_count, status
        ))
        .size(14),
    )
    .on_press(Message::ToggleGroup(index))
    .style(button::text);

    if !open {
        return column![header].into();
    }

    let mut body: Vec<Element<'_, Message>> = Vec::new();

    if let Some(breakdown) = &group.breakdown {
        body.push(text("Markets").size(13).into());
        body.push(
            text(breakdown_lines(breakdown).join("\n"))
                .size(12)
                .font(iced::Font::MONOSPACE)
                .into(),
        );
    }

    match &group.outcome {
        Ok(result) => {
            body.push(text(INSIGHTS_HEADING).size(16).into());
            body.push(text(&result.insights).size(13).into());
            if let Some(backlog) = &result.backlog {
                body.push(text(BACKLOG_HEADING).size(16).into());
                body.push(
                    container(text(backlog).size(12).font(iced::Font::MONOSPACE))
                        .padding(8)
                        .width(Fill)
                        .into(),
                );
            }
        }
        Err(e) => {
            body.push(
                text(format!("Groq API error: {}", e))
                    .size(13)
                    .color(iced::Color::from_rgb(0.9, 0.4, 0.4))
                    .into(),
            );
        }
    }

    column![header, container(column(body).spacing(8)).padding([0, 20])]
        .spacing(4)
        .into()
}

// ============================================================================
// Background analysis
// ============================================================================

/// Run the analysis on a worker thread and stream progress to the UI.
///
/// Yields `ProgressUpdate` after each group and a final `AnalysisFinished`.
fn analysis_stream(
    table: Arc<FeedbackTable>,
    config: AnalysisConfig,
    api_key: String,
    settings: Settings,
) -> impl futures::Stream<Item = Message> {
    let (tx, rx) = futures::channel::mpsc::unbounded();

    std::thread::spawn(move || {
        let client = match GroqClient::new(&api_key, &settings) {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.unbounded_send(Message::AnalysisFinished(Err(e.to_string())));
                return;
            }
        };

        let progress_tx = Mutex::new(tx.clone());
        let result = pipeline::analyze(&table, &config, &client, &|p| {
            if let Ok(tx) = progress_tx.lock() {
                let _ = tx.unbounded_send(Message::ProgressUpdate {
                    completed: p.completed,
                    total: p.total,
                    failed: p.failed,
                });
            }
        });

        let _ = tx.unbounded_send(Message::AnalysisFinished(
            result.map_err(|e| format!("{:#}", e)),
        ));
    });

    rx
}
