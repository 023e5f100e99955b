//! Feedback Backlog Generator
//!
//! Turns consumer feedback spreadsheets into pain points, opportunities and a
//! backlog of EPICs and user stories by way of a hosted LLM.
//!
//! This library provides:
//! - `table`: CSV/XLSX loading and text-column detection
//! - `grouping`: partitioning by episode, market and country
//! - `prompts`: insight and backlog prompt templates
//! - `llm`: OpenAI-compatible chat-completion client
//! - `pipeline`: the end-to-end analysis run
//! - `report`: Markdown rendering of plans and results
//! - `config`: non-secret settings
//!
//! Binaries:
//! - `feedback-backlog`: command-line front end
//! - `feedback-ui`: desktop front end

pub mod config;
pub mod grouping;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod table;

pub use grouping::{ColumnRoles, GroupKey, GroupingMode};
pub use llm::{ChatRequest, CompletionClient, GroqClient, LlmError};
pub use pipeline::{AnalysisConfig, AnalysisReport};
pub use table::{load_table, FeedbackTable};
