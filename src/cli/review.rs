//! Interactive review loop.
//!
//! Reads one command per line from stdin while the store subscription keeps
//! the session current with other reviewers' writes.

use std::str::FromStr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::core::{evaluable_labels, RecordFilter, ReviewSession, StatusFilter};
use crate::domain::Evaluation;

use super::{describe_filter, print_record, CliContext};

const HELP: &str = "\
Commands:
  yes N | no N | unsure N   decide suggested label N (again to clear)
  clear N                   clear the decision on label N
  next | prev               move to the nearest useful record
  random                    jump to a random record awaiting review
  advance [!]               mark reviewed and move on (! skips the check)
  filter STATUS [TEXT]      STATUS is all, evaluated or unevaluated
  status                    show progress
  show                      show the current record again
  help                      show this help
  quit                      leave";

/// One line of reviewer input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewCommand {
    /// Toggle a decision on the Nth suggested label (1-based)
    Decide(usize, Evaluation),
    Clear(usize),
    Next,
    Previous,
    Random,
    Advance { force: bool },
    Filter(RecordFilter),
    Status,
    Show,
    Help,
    Quit,
}

impl FromStr for ReviewCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "Empty command".to_string())?;

        let label_number = |arg: Option<&str>| -> Result<usize, String> {
            let arg = arg.ok_or_else(|| format!("'{}' needs a label number", verb))?;
            match arg.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(format!("Not a label number: {}", arg)),
            }
        };

        let command = match verb.to_lowercase().as_str() {
            "yes" | "y" => Self::Decide(label_number(words.next())?, Evaluation::Yes),
            "no" => Self::Decide(label_number(words.next())?, Evaluation::No),
            "unsure" | "u" | "?" => Self::Decide(label_number(words.next())?, Evaluation::Unsure),
            "clear" | "c" => Self::Clear(label_number(words.next())?),
            "next" | "n" | "]" => Self::Next,
            "prev" | "previous" | "p" | "[" => Self::Previous,
            "random" | "r" => Self::Random,
            "advance" | "a" => Self::Advance {
                force: words.next() == Some("!"),
            },
            "filter" | "f" => {
                let status = words
                    .next()
                    .map(StatusFilter::from_str)
                    .transpose()?
                    .unwrap_or_default();
                let text = words.next().map(str::to_string);
                Self::Filter(RecordFilter::new(text, status))
            }
            "status" | "s" => Self::Status,
            "show" => Self::Show,
            "help" | "h" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command: {} (try 'help')", other)),
        };
        Ok(command)
    }
}

/// Run the interactive loop until `quit` or end of input
pub async fn run(ctx: &CliContext) -> Result<()> {
    ctx.require_reviewer()?;
    let mut session = ctx.session().await?;

    let mut updates = session
        .store()
        .subscribe_all()
        .await
        .with_context(|| format!("Failed to watch records: {}", ctx.store_path.display()))?;
    let snapshot = updates.borrow_and_update().clone();
    session.apply_snapshot(&snapshot);

    eprintln!("Reviewing as {} ({})", session.reviewer(), describe_filter(session.filter()));
    eprintln!("Type 'help' for commands.");
    println!();
    show_current(&session, ctx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<ReviewCommand>() {
                    Ok(ReviewCommand::Quit) => break,
                    Ok(command) => handle(&mut session, ctx, command).await,
                    Err(e) => eprintln!("{}", e),
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Record subscription closed, continuing with last known records");
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                let before = session.current_record().map(|r| r.id.clone());
                session.apply_snapshot(&snapshot);
                session.refresh_attribution().await;
                debug!(records = snapshot.len(), "Applied snapshot");

                let after = session.current_record().map(|r| r.id.clone());
                if before != after {
                    eprintln!("Records changed; current record moved");
                    show_current(&session, ctx);
                }
            }
        }
    }

    let summary = session.summary();
    eprintln!("{}", summary.remaining_message());
    Ok(())
}

async fn handle(session: &mut ReviewSession, ctx: &CliContext, command: ReviewCommand) {
    match command {
        ReviewCommand::Decide(n, chosen) => decide(session, ctx, n, Some(chosen)).await,
        ReviewCommand::Clear(n) => decide(session, ctx, n, None).await,
        ReviewCommand::Next => {
            session.next();
            show_current(session, ctx);
        }
        ReviewCommand::Previous => {
            session.previous();
            show_current(session, ctx);
        }
        ReviewCommand::Random => {
            session.random();
            show_current(session, ctx);
        }
        ReviewCommand::Advance { force } => {
            if !force && !session.can_advance() {
                eprintln!("Decide every suggested label first (or 'advance !')");
                return;
            }
            if let Err(e) = session.advance().await {
                eprintln!("{}", e);
                return;
            }
            show_current(session, ctx);
        }
        ReviewCommand::Filter(filter) => {
            session.set_filter(filter);
            eprintln!("Filter: {}", describe_filter(session.filter()));
            show_current(session, ctx);
        }
        ReviewCommand::Status => {
            let summary = session.summary();
            println!("{}", summary.remaining_message());
            println!(
                "Your decisions: {}  |  leading: {} ({})",
                summary.user_decisions,
                summary.leading_evaluator.as_deref().unwrap_or("-"),
                summary.leading_count
            );
        }
        ReviewCommand::Show => show_current(session, ctx),
        ReviewCommand::Help => println!("{}", HELP),
        ReviewCommand::Quit => {}
    }
}

/// Toggle or clear the Nth evaluable label of the current record
async fn decide(session: &mut ReviewSession, ctx: &CliContext, n: usize, chosen: Option<Evaluation>) {
    let Some(record) = session.current_record() else {
        eprintln!("No record selected");
        return;
    };
    let record_id = record.id.clone();
    let Some(label_idx) = evaluable_labels(record).nth(n - 1).map(|l| l.idx.clone()) else {
        eprintln!("No suggested label {}", n);
        return;
    };

    let result = match chosen {
        Some(chosen) => session.toggle(&record_id, &label_idx, chosen).await,
        None => session.set_label_evaluation(&record_id, &label_idx, None).await,
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        return;
    }
    show_current(session, ctx);
}

fn show_current(session: &ReviewSession, ctx: &CliContext) {
    match session.current_record() {
        Some(record) if crate::core::is_useful(record) => {
            print_record(record, session.useful_position(), &ctx.concept_base_url);
            if session.can_advance() {
                println!("\n  All labels decided. 'advance' to move on.");
            }
        }
        _ => println!("No useful records in view."),
    }
}
