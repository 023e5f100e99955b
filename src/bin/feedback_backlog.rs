//! Feedback Backlog CLI - analyze consumer feedback with a hosted LLM
//!
//! Loads a CSV or XLSX file of feedback, optionally groups it by episode,
//! market and country, and asks the LLM for pain points, opportunities and a
//! backlog of EPICs and user stories per group.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use feedback_backlog::config::Settings;
use feedback_backlog::pipeline::{self, AnalysisConfig, AnalysisProgress};
use feedback_backlog::report;
use feedback_backlog::table::{load_table, FeedbackTable};
use feedback_backlog::{ColumnRoles, GroqClient};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "feedback-backlog")]
#[command(about = "Generate pain points, opportunities and a product backlog from consumer feedback")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ColumnArgs {
    /// Input CSV or XLSX file
    #[arg(short, long)]
    input: PathBuf,

    /// Column containing the feedback text (default: first text column)
    #[arg(short, long)]
    feedback_column: Option<String>,

    /// Column holding the episode, to analyze each episode separately
    #[arg(long)]
    episode_column: Option<String>,

    /// Column holding the market (requires --episode-column)
    #[arg(long)]
    market_column: Option<String>,

    /// Column holding the country (requires --market-column)
    #[arg(long)]
    country_column: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the columns of a file and which ones hold text
    Columns {
        /// Input CSV or XLSX file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the groups and prompts that would be sent, without calling the API
    Preview {
        #[command(flatten)]
        columns: ColumnArgs,
    },

    /// Analyze feedback and generate insights and a backlog
    Analyze {
        #[command(flatten)]
        columns: ColumnArgs,

        /// Groq API key. Set via GROQ_API_KEY env var to avoid exposing it in shell history.
        #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Only extract pain points and opportunities, skip the backlog
        #[arg(long)]
        insights_only: bool,

        /// Number of groups analyzed in parallel (default from settings, else 1)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override the API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Override the model identifier
        #[arg(long)]
        model: Option<String>,

        /// Override the system message sent with each request
        #[arg(long)]
        system_prompt: Option<String>,

        /// Settings file (default: ~/.feedback-backlog.conf)
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Columns { input } => list_columns(&input)?,
        Commands::Preview { columns } => preview(&columns)?,
        Commands::Analyze {
            columns,
            api_key,
            insights_only,
            workers,
            base_url,
            model,
            system_prompt,
            settings,
        } => {
            let mut resolved = match settings {
                Some(path) => Settings::load(&path)?,
                None => Settings::load_default(),
            };
            if let Some(n) = workers {
                resolved.workers = n.max(1);
            }
            if let Some(url) = base_url {
                resolved.base_url = url;
            }
            if let Some(m) = model {
                resolved.model = m;
            }
            if let Some(p) = system_prompt {
                resolved.system_prompt = p;
            }
            analyze(&columns, api_key.as_deref(), insights_only, &resolved)?;
        }
    }

    Ok(())
}

fn list_columns(input: &PathBuf) -> Result<()> {
    let table = load_table(input)?;

    println!("{} rows\n", table.len());
    println!("{:<30} {:>8} {:>10}  {}", "Column", "Kind", "Non-empty", "Feedback?");
    println!("{:-<62}", "");
    for summary in table.column_summaries() {
        let candidate = if summary.kind == feedback_backlog::table::ColumnKind::Text {
            "yes"
        } else {
            ""
        };
        println!(
            "{:<30} {:>8} {:>10}  {}",
            summary.name, summary.kind.to_string(), summary.non_empty, candidate
        );
    }
    Ok(())
}

/// Build roles from the flags, defaulting the feedback column to the first text column.
fn resolve_roles(table: &FeedbackTable, args: &ColumnArgs) -> Result<ColumnRoles> {
    let text_columns = table.text_columns();
    if text_columns.is_empty() {
        anyhow::bail!("No text columns found in {}", args.input.display());
    }

    let feedback = match &args.feedback_column {
        Some(col) => {
            if !text_columns.contains(col) {
                anyhow::bail!(
                    "Column '{}' is not a text column. Text columns: {}",
                    col,
                    text_columns.join(", ")
                );
            }
            col.clone()
        }
        None => {
            log::info!("Using '{}' as the feedback column", text_columns[0]);
            text_columns[0].clone()
        }
    };

    Ok(ColumnRoles {
        feedback,
        episode: args.episode_column.clone(),
        market: args.market_column.clone(),
        country: args.country_column.clone(),
    })
}

fn preview(args: &ColumnArgs) -> Result<()> {
    let table = load_table(&args.input)?;
    let roles = resolve_roles(&table, args)?;
    let plan = pipeline::plan_analysis(&table, &roles)?;
    print!("{}", report::render_plan(&plan)?);
    Ok(())
}

fn analyze(
    args: &ColumnArgs,
    api_key: Option<&str>,
    insights_only: bool,
    settings: &Settings,
) -> Result<()> {
    let api_key = match api_key {
        Some(k) if !k.trim().is_empty() => k,
        _ => anyhow::bail!(
            "Please provide your Groq API key with --api-key or GROQ_API_KEY to enable analysis."
        ),
    };

    let table = load_table(&args.input)?;
    let roles = resolve_roles(&table, args)?;
    let client = GroqClient::new(api_key, settings)?;

    let config = AnalysisConfig {
        roles,
        include_backlog: !insights_only,
        workers: settings.workers,
        system_prompt: settings.system_prompt.clone(),
    };

    let plan = pipeline::plan_analysis(&table, &config.roles)?;
    eprintln!(
        "Analyzing feedback, extracting pain points & opportunities ({} groups)...",
        plan.groups.len()
    );

    let on_progress = |p: &AnalysisProgress| {
        eprint!(
            "\r[{}/{}] Analyzing groups... ({} errors)    ",
            p.completed, p.total, p.failed
        );
        std::io::stderr().flush().ok();
    };
    let result = pipeline::run_plan(&plan, &config, &client, &on_progress);
    eprintln!();
    let analysis = result?;

    print!("{}", report::render_report(&analysis)?);

    if analysis.groups.len() > analysis.failed_count() {
        println!();
        println!("{}", report::DONE_MESSAGE);
    }
    Ok(())
}
