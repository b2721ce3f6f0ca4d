use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use ticket_pipeline::gateway::AckStatus;
use ticket_pipeline::ticket::Gate;
use ticket_pipeline::{
    init_telemetry, load_tickets, shutdown_telemetry, AdvanceOutcome, Checkpoint, CommandAck,
    CommandGateway, PipelineConfig, RiskLevel, Stage, TicketRecord, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "ticket-pipeline")]
#[command(about = "Checkpointed stage workflow for governance tickets")]
#[command(long_about = "Runs governance tickets through category check, SLA prioritization, \
                       ownership enrichment, app owner check, evidence collection, closure and \
                       logging, pausing for human confirmation at the priority, review and \
                       closure checkpoints.")]
struct Cli {
    /// Configuration file (defaults to ticket-pipeline.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stage table and its checkpoints
    Stages,
    /// List the tickets in a ticket file
    List {
        /// Ticket file (JSON array); falls back to data.tickets_file
        #[arg(long)]
        tickets: Option<PathBuf>,
        /// Only show tickets in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Run tickets through the pipeline, streaming events as JSON lines
    Run {
        /// Ticket file (JSON array); falls back to data.tickets_file
        #[arg(long)]
        tickets: Option<PathBuf>,
        /// Only run this ticket
        #[arg(long)]
        ticket: Option<String>,
        /// Confirm every checkpoint as soon as it is reached
        #[arg(long, help = "Answer priority, review and closure checkpoints automatically")]
        auto_approve: bool,
        /// Risk level to confirm at the priority checkpoint
        #[arg(long, value_parser = parse_risk_level)]
        priority: Option<RiskLevel>,
    },
}

/// Events the printer may fall behind by before the hub drops it
const PRINTER_BUFFER: usize = 4096;

fn parse_risk_level(value: &str) -> Result<RiskLevel, String> {
    value.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    PipelineConfig::load_env_file()?;
    let config = PipelineConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    let result = match cli.command {
        Commands::Stages => {
            stages_command();
            Ok(())
        }
        Commands::List { tickets, category } => list_command(&config, tickets, category),
        Commands::Run {
            tickets,
            ticket,
            auto_approve,
            priority,
        } => tokio::runtime::Runtime::new()?
            .block_on(async { run_command(&config, tickets, ticket, auto_approve, priority).await }),
    };

    shutdown_telemetry();
    result
}

fn stages_command() {
    println!("📋 Ticket pipeline stages");
    println!();
    for stage in Stage::ALL {
        let gate = match stage.gate() {
            Gate::None if stage == Stage::TicketFetching => "precondition (loader)".to_string(),
            Gate::None => String::new(),
            Gate::AfterProcessor(checkpoint) => format!("⏸️  {checkpoint} confirmation after processing"),
            Gate::BeforeProcessor(checkpoint) => format!("⏸️  {checkpoint} confirmation before processing"),
        };
        let terminal = if stage.definition().rejection_is_terminal {
            " (rejection ends the ticket)"
        } else {
            ""
        };
        println!("  {}. {:<22} {}{}", stage.index() + 1, stage.name(), gate, terminal);
    }
}

fn tickets_path(config: &PipelineConfig, tickets: Option<PathBuf>) -> Result<PathBuf> {
    tickets
        .or_else(|| config.data.tickets_file.clone())
        .context("No ticket file given; pass --tickets or set data.tickets_file")
}

fn list_command(config: &PipelineConfig, tickets: Option<PathBuf>, category: Option<String>) -> Result<()> {
    let path = tickets_path(config, tickets)?;
    let batch = load_tickets(&path)?;
    let shown: Vec<_> = batch
        .iter()
        .filter(|t| {
            category
                .as_deref()
                .map_or(true, |c| t.category.eq_ignore_ascii_case(c))
        })
        .collect();

    println!("🎫 {} ticket(s) in {}", shown.len(), path.display());
    for t in shown {
        println!(
            "  {:<12} {:<10} SLA {:<26} {}",
            t.ticket_id,
            t.category,
            t.sla_deadline.as_deref().unwrap_or("-"),
            t.description
        );
    }
    Ok(())
}

async fn run_command(
    config: &PipelineConfig,
    tickets: Option<PathBuf>,
    only: Option<String>,
    auto_approve: bool,
    priority: Option<RiskLevel>,
) -> Result<()> {
    let path = tickets_path(config, tickets)?;
    let engine = Arc::new(WorkflowEngine::from_config(config)?);
    let batch = load_tickets(&path)?;
    engine
        .load_batch(batch)
        .await
        .with_context(|| format!("Failed to register tickets from {}", path.display()))?;

    let gateway = CommandGateway::new(Arc::clone(&engine));
    let selected: Vec<String> = match only {
        Some(id) => {
            gateway.get_ticket(&id).await?;
            vec![id]
        }
        None => gateway
            .list_tickets()
            .await
            .into_iter()
            .map(|record| record.ticket_id().to_string())
            .collect(),
    };

    let subscription = gateway
        .subscribe_with_buffer(PRINTER_BUFFER.max(config.engine.observer_buffer))
        .await;
    let observer = subscription.id();
    let finished = Arc::new(AtomicBool::new(false));
    let printer = tokio::spawn(print_events(subscription, Arc::clone(&finished)));

    for ticket_id in &selected {
        let mut ack = gateway.process(ticket_id).await?;
        while let Some(AdvanceOutcome::Paused { checkpoint, .. }) = settle(ack).await {
            if !auto_approve {
                break;
            }
            ack = match checkpoint {
                Checkpoint::Priority => gateway.confirm_priority(ticket_id, priority).await?,
                Checkpoint::Review => gateway.approve_review(ticket_id).await?,
                Checkpoint::Closure => gateway.confirm_closure(ticket_id).await?,
            };
            if ack.status == AckStatus::AlreadySatisfied {
                break;
            }
        }
    }

    gateway
        .shutdown(Duration::from_secs(config.engine.shutdown_timeout_seconds))
        .await?;
    finished.store(true, Ordering::SeqCst);
    engine.hub().unsubscribe(observer);
    printer.await.context("Event printer failed")??;

    print_summary(&path, &gateway.list_tickets().await, &selected);
    Ok(())
}

/// Wait for the advance a command queued; errors were already broadcast
async fn settle(ack: CommandAck) -> Option<AdvanceOutcome> {
    match ack.completion().await? {
        Ok(outcome) => Some(outcome),
        Err(_) => None,
    }
}

async fn print_events(
    mut subscription: ticket_pipeline::Subscription,
    finished: Arc<AtomicBool>,
) -> Result<()> {
    while let Some(event) = subscription.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    if !finished.load(Ordering::SeqCst) {
        warn!(
            observer = subscription.id().0,
            "Event stream dropped by the hub before the run finished; later events are not printed"
        );
    }
    Ok(())
}

fn print_summary(path: &Path, records: &[TicketRecord], selected: &[String]) {
    eprintln!();
    eprintln!("📊 Pipeline summary for {}", path.display());
    for record in records.iter().filter(|r| selected.iter().any(|id| id == r.ticket_id())) {
        let stage = record.stage();
        let line = if record.is_rejected() {
            format!("⛔ rejected at {stage}: {}", record.stage_entry(stage).message)
        } else if record.is_completed() {
            "✅ completed".to_string()
        } else if let Some(checkpoint) = record.awaiting() {
            format!("⏸️  awaiting {checkpoint} confirmation at {stage}")
        } else {
            format!("❌ stopped at {stage}: {}", record.stage_entry(stage).message)
        };
        let risk = record
            .fields
            .risk_level
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        eprintln!("  {:<12} risk {:<8} {}", record.ticket_id(), risk, line);
    }
}
