//! Command-line interface for namerec.
//!
//! Provides commands for inspecting review progress, browsing records,
//! recording label decisions, and running an interactive review loop
//! against the shared record file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{FileRecordStore, RecordStore};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    evaluable_labels, pending_labels, select_next, select_previous, unique_concept_groups,
    DecisionLog, RecordFilter, ReviewSession, StatusFilter, WriteOutcome,
};
use crate::domain::{concept_url, Evaluation, Record};

pub mod review;

/// namerec - Review name-reconciliation suggestions
#[derive(Parser, Debug)]
#[command(name = "namerec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Reviewer identity (overrides config)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Records file (overrides config)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Evaluation-status filter
    #[arg(short, long, global = true, value_enum)]
    pub filter: Option<FilterArg>,

    /// Only records whose idx contains this text
    #[arg(short, long, global = true)]
    pub text: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show review progress
    Status,

    /// Show a record with its suggested matches
    Show {
        /// Record ID
        record_id: String,
    },

    /// Pick a random record still waiting for review
    Pick,

    /// Find the nearest useful record before or after another
    Navigate {
        /// Record ID to start from
        record_id: String,

        #[arg(short, long, value_enum, default_value = "next")]
        direction: Direction,
    },

    /// Record a decision on one suggested label
    Evaluate {
        /// Record ID
        record_id: String,

        /// idx of the suggested label
        label_idx: String,

        #[arg(value_enum)]
        decision: Decision,

        /// Clear the decision if the label already holds it
        #[arg(long)]
        toggle: bool,
    },

    /// Mark a record as reviewed and pick the next one
    Advance {
        /// Record ID
        record_id: String,

        /// Advance even if labels are still undecided
        #[arg(long)]
        force: bool,
    },

    /// Review records interactively
    Review,

    /// Show resolved configuration (debug)
    Config,
}

/// Status filter for CLI (maps to StatusFilter)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FilterArg {
    All,
    Evaluated,
    Unevaluated,
}

impl From<FilterArg> for StatusFilter {
    fn from(f: FilterArg) -> Self {
        match f {
            FilterArg::All => StatusFilter::All,
            FilterArg::Evaluated => StatusFilter::Evaluated,
            FilterArg::Unevaluated => StatusFilter::Unevaluated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Next,
    Previous,
}

/// Label decision for CLI; `clear` removes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    Yes,
    No,
    Unsure,
    Clear,
}

impl Decision {
    pub fn evaluation(self) -> Option<Evaluation> {
        match self {
            Decision::Yes => Some(Evaluation::Yes),
            Decision::No => Some(Evaluation::No),
            Decision::Unsure => Some(Evaluation::Unsure),
            Decision::Clear => None,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let ctx = CliContext::new(&self, cfg);

        match self.command {
            Commands::Status => show_status(&ctx).await,
            Commands::Show { record_id } => show_record(&ctx, &record_id).await,
            Commands::Pick => pick_record(&ctx).await,
            Commands::Navigate {
                record_id,
                direction,
            } => navigate(&ctx, &record_id, direction).await,
            Commands::Evaluate {
                record_id,
                label_idx,
                decision,
                toggle,
            } => evaluate(&ctx, &record_id, &label_idx, decision, toggle).await,
            Commands::Advance { record_id, force } => advance(&ctx, &record_id, force).await,
            Commands::Review => review::run(&ctx).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Settings shared by every command, after applying CLI overrides
pub struct CliContext {
    pub reviewer: Option<String>,
    pub store_path: PathBuf,
    pub decisions_path: PathBuf,
    pub filter: RecordFilter,
    pub concept_base_url: String,
}

impl CliContext {
    fn new(cli: &Cli, cfg: &ResolvedConfig) -> Self {
        let status = cli.filter.map(StatusFilter::from).unwrap_or(cfg.default_filter);
        Self {
            reviewer: cli.user.clone().or_else(|| cfg.reviewer.clone()),
            store_path: cli.store.clone().unwrap_or_else(|| cfg.store.clone()),
            decisions_path: cfg.decisions.clone(),
            filter: RecordFilter::new(cli.text.clone(), status),
            concept_base_url: cfg.concept_base_url.clone(),
        }
    }

    /// Reviewer identity, required for anything that writes
    pub fn require_reviewer(&self) -> Result<&str> {
        self.reviewer
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .context("No reviewer set. Use --user <id>, NAMEREC_REVIEWER, or review.reviewer in config")
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::new(FileRecordStore::new(&self.store_path))
    }

    /// Session loaded with one snapshot of the store
    pub async fn session(&self) -> Result<ReviewSession> {
        let store = self.store();
        let snapshot = store
            .snapshot()
            .await
            .with_context(|| format!("Failed to read records: {}", self.store_path.display()))?;

        let reviewer = self.reviewer.clone().unwrap_or_else(|| "anonymous".to_string());
        let mut session = ReviewSession::new(store, reviewer)
            .with_filter(self.filter.clone())
            .with_decision_log(DecisionLog::open(&self.decisions_path))
            .await;
        session.apply_snapshot(&snapshot);
        Ok(session)
    }
}

/// Show review progress over the whole collection
async fn show_status(ctx: &CliContext) -> Result<()> {
    let session = ctx.session().await?;
    let summary = session.summary();

    println!(
        "Store:    {} ({})",
        ctx.store_path.display(),
        session.store().name()
    );
    println!("Filter:   {}", describe_filter(session.filter()));
    println!();
    println!("Records:  {}", summary.total_records);
    println!("Useful:   {}", summary.total_useful);
    println!("{}", summary.remaining_message());
    println!();
    if let Some(reviewer) = &ctx.reviewer {
        println!("Your decisions ({}): {}", reviewer, summary.user_decisions);
    }
    match &summary.leading_evaluator {
        Some(leader) => println!("Leading reviewer: {} ({} decisions)", leader, summary.leading_count),
        None => println!("Leading reviewer: (no decisions yet)"),
    }

    Ok(())
}

/// Show one record
async fn show_record(ctx: &CliContext, record_id: &str) -> Result<()> {
    let mut session = ctx.session().await?;
    let record = find_record(&session, record_id)?.clone();

    let position = session
        .jump_to(record_id)
        .and_then(|_| session.useful_position());
    print_record(&record, position, &ctx.concept_base_url);
    Ok(())
}

/// Pick a random unevaluated record in view
async fn pick_record(ctx: &CliContext) -> Result<()> {
    let mut session = ctx.session().await?;
    session.random();

    match session.current_record() {
        Some(record) if crate::core::is_useful(record) => {
            print_record(record, session.useful_position(), &ctx.concept_base_url);
        }
        _ => eprintln!("No useful records in view"),
    }
    Ok(())
}

/// Print the nearest useful record id in the given direction
async fn navigate(ctx: &CliContext, record_id: &str, direction: Direction) -> Result<()> {
    let session = ctx.session().await?;
    let view = session.view();
    let current = view
        .iter()
        .position(|r| r.id == record_id)
        .with_context(|| format!("Record {} is not in the current view", record_id))?;

    let target = match direction {
        Direction::Next => select_next(current, &view),
        Direction::Previous => select_previous(current, &view),
    };

    if target == current {
        eprintln!("No other useful record in view");
    }
    println!("{}", view[target].id);
    Ok(())
}

/// Record one label decision
async fn evaluate(
    ctx: &CliContext,
    record_id: &str,
    label_idx: &str,
    decision: Decision,
    toggle: bool,
) -> Result<()> {
    ctx.require_reviewer()?;
    let mut session = ctx.session().await?;

    let outcome = match (toggle, decision.evaluation()) {
        (true, Some(chosen)) => session.toggle(record_id, label_idx, chosen).await?,
        (_, result) => {
            session
                .set_label_evaluation(record_id, label_idx, result)
                .await?
        }
    };

    let record = find_record(&session, record_id)?;
    let value = record
        .evaluation_for(label_idx)
        .map(|e| e.as_str())
        .unwrap_or("(cleared)");
    println!("{} / {}: {}", record_id, label_idx, value);
    report_outcome(outcome);

    let remaining = pending_labels(record);
    if remaining > 0 {
        eprintln!("{} label(s) still undecided on this record", remaining);
    }
    Ok(())
}

/// Stamp a record as reviewed and print the next pick
async fn advance(ctx: &CliContext, record_id: &str, force: bool) -> Result<()> {
    ctx.require_reviewer()?;
    let mut session = ctx.session().await?;

    session
        .jump_to(record_id)
        .with_context(|| format!("Record {} is not in the current view", record_id))?;

    if !force && !session.can_advance() {
        anyhow::bail!(
            "Record {} cannot be advanced yet: decide every label first (or use --force)",
            record_id
        );
    }

    let outcome = session.advance().await?;
    println!("Advanced past {}", record_id);
    report_outcome(outcome);

    if let Some(next) = session.current_record() {
        println!();
        print_record(next, session.useful_position(), &ctx.concept_base_url);
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("namerec configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Records:    {}", cfg.store.display());
    println!("  Decisions:  {}", cfg.decisions.display());
    println!();
    println!("Review:");
    println!("  Reviewer:      {}", cfg.reviewer.as_deref().unwrap_or("(not set)"));
    println!("  Filter:        {}", cfg.default_filter);
    println!("  Concept links: {}", cfg.concept_base_url);

    Ok(())
}

fn find_record<'a>(session: &'a ReviewSession, record_id: &str) -> Result<&'a Record> {
    session
        .records()
        .iter()
        .find(|r| r.id == record_id)
        .with_context(|| format!("Record not found: {}", record_id))
}

fn report_outcome(outcome: WriteOutcome) {
    if outcome == WriteOutcome::LocalOnly {
        eprintln!("Warning: could not save to the record store; see log for details");
    }
}

pub(crate) fn describe_filter(filter: &RecordFilter) -> String {
    match &filter.text {
        Some(text) => format!("{} (idx contains \"{}\")", filter.status, text),
        None => filter.status.to_string(),
    }
}

/// Print a record with its numbered suggested labels
pub(crate) fn print_record(record: &Record, position: Option<(usize, usize)>, base_url: &str) {
    match position {
        Some((pos, total)) => println!("Record {} of {}  [{}]", pos + 1, total, record.id),
        None => println!("Record [{}]", record.id),
    }
    println!("  Label: {}", record.label);
    println!("  idx:   {}", record.idx);
    if let Some(url) = concept_url(base_url, &record.idx) {
        println!("  Link:  {}", url);
    }
    if let Some(evaluator) = record.evaluator_id.as_deref().filter(|e| !e.trim().is_empty()) {
        println!("  Reviewed by: {}", evaluator);
    }

    println!();
    println!("  Suggested matches:");
    for (n, label) in evaluable_labels(record).enumerate() {
        let state = record
            .evaluation_for(&label.idx)
            .map(|e| e.as_str())
            .unwrap_or("-");
        println!("  {:>3}. [{:^6}] {}  ({})", n + 1, state, label.label, label.idx);
    }

    if !record.candidates.is_empty() {
        println!();
        println!("  Candidates:");
        for candidate in &record.candidates {
            println!(
                "       {:.3}  {}  ({})",
                candidate.similarity, candidate.label, candidate.idx
            );
        }
    }

    let groups = unique_concept_groups(record);
    if groups.len() > 1 {
        println!();
        println!("  Concept groups: {}", groups.join(", "));
    }
}
