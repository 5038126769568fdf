use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use freight_offer_scanner::config::AppConfig;
use freight_offer_scanner::domain::{
    offers_from_json, rank_offers, AgentConfig, Provenance, RankedAggregation, RankedOffer,
    SearchQuery,
};
use freight_offer_scanner::error::AppError;
use freight_offer_scanner::infra::{
    FileSource, HistoryEntry, OfferAggregator, OfferCache, SearchHistory,
};
use freight_offer_scanner::telemetry;
use freight_offer_scanner::util::persistence::{
    agent_file, load_agent_config, load_agent_file, save_agent_config,
};
use freight_offer_scanner::util::version::version_label;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "freight-offer-scanner",
    about = "Score and rank freight exchange offers for a brokerage agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score offers from a JSON file and print them best first
    Score(ScoreArgs),
    /// Query every configured exchange and rank the merged offers
    Search(SearchArgs),
    /// Manage the saved agent profile
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Show recent searches
    History(HistoryArgs),
    /// Inspect or clear the offer cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Only show the best N offers
    #[arg(long)]
    top: Option<usize>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// JSON file holding an array of offers
    #[arg(long)]
    offers: PathBuf,
    /// Agent profile JSON (defaults to the saved profile)
    #[arg(long)]
    agent: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    origin: Option<String>,
    #[arg(long)]
    destination: Option<String>,
    /// Loading date (YYYY-MM-DD), passed through to the exchanges
    #[arg(long)]
    date: Option<String>,
    /// Maximum offers requested from each exchange
    #[arg(long)]
    limit: Option<u32>,
    /// Replay a saved offer dump as an extra source (name=path)
    #[arg(long = "replay", value_parser = parse_replay)]
    replays: Vec<(String, PathBuf)>,
    /// Agent profile JSON (defaults to the saved profile)
    #[arg(long)]
    agent: Option<PathBuf>,
    /// Do not record this search in the history file
    #[arg(long)]
    no_history: bool,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    /// Validate and store an agent profile
    Save {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the saved agent profile
    Show,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Number of most recent searches to show
    #[arg(long, default_value_t = 10)]
    last: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print cache size and age
    Show,
    /// Drop every cached offer
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run_cli().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_cli() -> Result<ExitCode, AppError> {
    let matches = Cli::command().version(version_label()).get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Score(args) => run_score(args),
        Command::Search(args) => run_search(&config, args).await,
        Command::Agent { command } => run_agent(command),
        Command::History(args) => run_history(&config, args),
        Command::Cache { command } => run_cache(&config, command).await,
    }
}

fn parse_replay(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected name=path, got '{raw}'")),
    }
}

fn resolve_agent(path: Option<&Path>) -> Result<AgentConfig, AppError> {
    match path {
        Some(path) => Ok(load_agent_file(path)?),
        None => Ok(load_agent_config().unwrap_or_default()),
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value, AppError> {
    let content = fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| AppError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn run_score(args: ScoreArgs) -> Result<ExitCode, AppError> {
    let agent = resolve_agent(args.agent.as_deref())?;
    let parsed = offers_from_json(read_json(&args.offers)?);
    if parsed.malformed > 0 {
        warn!(skipped = parsed.malformed, "skipped malformed offer entries");
    }

    let mut ranked = rank_offers(&parsed.offers, &agent);
    if let Some(top) = args.output.top {
        ranked.truncate(top);
    }

    let mut out = io::stdout().lock();
    if args.output.json {
        write_json(&mut out, &ranked)?;
    } else {
        render_table(&mut out, &ranked)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_search(config: &AppConfig, args: SearchArgs) -> Result<ExitCode, AppError> {
    let agent = resolve_agent(args.agent.as_deref())?;
    let query = SearchQuery {
        origin: args.origin,
        destination: args.destination,
        loading_date: args.date,
        limit: args.limit,
    };

    let mut aggregator = OfferAggregator::from_config(config)?;
    for (name, path) in args.replays {
        aggregator = aggregator.with_source(Arc::new(FileSource::new(name.as_str(), path)));
    }
    info!(sources = aggregator.source_count(), "searching offers");

    let mut ranked = aggregator.search_ranked(&query, &agent).await;

    if !args.no_history {
        let history = SearchHistory::new(&config.history_path);
        let recorded = HistoryEntry::new(agent.id.clone(), query, &ranked)
            .and_then(|entry| history.append(&entry));
        if let Err(err) = recorded {
            warn!("failed to record search history: {err}");
        }
    }

    if let Some(top) = args.output.top {
        ranked.offers.truncate(top);
    }

    let mut out = io::stdout().lock();
    if args.output.json {
        write_json(&mut out, &ranked)?;
    } else {
        render_search(&mut out, &ranked)?;
    }

    if ranked.provenance == Provenance::Error && ranked.offers.is_empty() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_agent(command: AgentCommand) -> Result<ExitCode, AppError> {
    match command {
        AgentCommand::Save { file } => {
            let agent = load_agent_file(&file)?;
            let path = save_agent_config(&agent)?;
            println!("saved agent profile to {}", path.display());
        }
        AgentCommand::Show => match load_agent_config() {
            Some(agent) => write_json(&mut io::stdout().lock(), &agent)?,
            None => {
                let location = agent_file()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "<unavailable>".to_string());
                println!("no saved agent profile ({location}); scoring uses defaults");
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn run_history(config: &AppConfig, args: HistoryArgs) -> Result<ExitCode, AppError> {
    let entries = SearchHistory::new(&config.history_path).read_all()?;
    let recent = &entries[entries.len().saturating_sub(args.last)..];

    let mut out = io::stdout().lock();
    if args.json {
        write_json(&mut out, &recent)?;
        return Ok(ExitCode::SUCCESS);
    }

    if recent.is_empty() {
        writeln!(out, "no searches recorded yet")?;
    }
    for entry in recent {
        let route = format!(
            "{} -> {}",
            entry.query.origin.as_deref().unwrap_or("*"),
            entry.query.destination.as_deref().unwrap_or("*")
        );
        let best = entry
            .offers
            .first()
            .map(|offer| offer.score().to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{}  {:<32} {:<8} offers={:<4} best={}",
            entry.recorded_at,
            route,
            entry.provenance,
            entry.offers.len(),
            best
        )?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_cache(config: &AppConfig, command: CacheCommand) -> Result<ExitCode, AppError> {
    let cache = OfferCache::open(&config.cache.path)
        .with_ttl(config.cache.ttl)
        .with_max_offers(config.cache.max_offers);

    match command {
        CacheCommand::Show => {
            let snapshot = cache.snapshot().await;
            if snapshot.offers.is_empty() {
                println!("offer cache is empty ({})", config.cache.path.display());
            } else {
                let live = snapshot.live_offers(config.cache.ttl).len();
                println!(
                    "{} cached offers ({live} within TTL), last write {} ago, in {}",
                    snapshot.offers.len(),
                    snapshot.age_string(),
                    config.cache.path.display()
                );
            }
        }
        CacheCommand::Clear => {
            cache.clear().await?;
            println!("offer cache cleared");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(|source| AppError::Json {
        path: "stdout".to_string(),
        source,
    })?;
    writeln!(out)?;
    Ok(())
}

fn render_search<W: Write>(out: &mut W, ranked: &RankedAggregation) -> io::Result<()> {
    let note = match ranked.provenance {
        Provenance::Live => "all exchanges answered",
        Provenance::Partial => "some exchanges failed",
        Provenance::Cache => "all exchanges failed, showing cached offers",
        Provenance::Error => "all exchanges failed and no cached offers are available",
    };
    writeln!(out, "source: {} ({note})", ranked.provenance)?;
    if let Some(summary) = ranked.error_summary() {
        writeln!(out, "errors: {summary}")?;
    }
    if ranked.skipped_duplicates > 0 || ranked.skipped_malformed > 0 {
        writeln!(
            out,
            "skipped: {} duplicate, {} without id",
            ranked.skipped_duplicates, ranked.skipped_malformed
        )?;
    }
    writeln!(out)?;
    render_table(out, &ranked.offers)
}

fn render_table<W: Write>(out: &mut W, offers: &[RankedOffer]) -> io::Result<()> {
    if offers.is_empty() {
        return writeln!(out, "no offers found");
    }

    writeln!(
        out,
        "{:>3}  {:<20} {:>5} {:>10} {:>8} {:>8} {:>10}",
        "#", "ID", "SCORE", "PROFIT", "MARGIN", "KM", "PRICE"
    )?;
    for (index, ranked) in offers.iter().enumerate() {
        let profitability = &ranked.profitability;
        let price = ranked
            .offer
            .price_amount()
            .map(|amount| format!("{amount:.2}"))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:>3}  {:<20} {:>5} {:>10.2} {:>7.2}% {:>8.1} {:>10}",
            index + 1,
            truncate(ranked.offer.id.as_deref().unwrap_or("-"), 20),
            profitability.score,
            profitability.profit,
            profitability.profit_margin,
            profitability.metrics.distance,
            price
        )?;
    }
    Ok(())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut short: String = value.chars().take(width - 1).collect();
        short.push('~');
        short
    }
}
