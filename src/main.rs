use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use rank_ledger::{
    import_legacy_members, load_legacy_csv, BeltCatalog, LedgerConfig, PersistenceStore,
    PromotionRequest, RankHistoryEntry, RankService, RankState, SqliteStore, StripeCodec,
    StripeMode,
};

#[derive(Parser)]
#[command(
    name = "rank-ledger",
    about = "Belt & stripe progression with an auditable promotion history",
    version
)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "RANK_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Manual,
    Curriculum,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Import a legacy roster CSV (member_id,display_name,belt,stripes)
    Import { csv: PathBuf },

    /// Register a member with no stripes
    Enroll {
        member_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "white")]
        belt: String,
    },

    /// Promote a member
    Promote {
        member_id: String,
        #[arg(long)]
        belt: String,
        #[arg(long, value_enum, default_value = "manual")]
        mode: ModeArg,
        /// Manual pattern, e.g. "white,white,red"
        #[arg(long)]
        pattern: Option<String>,
        /// Curriculum degree (0-11)
        #[arg(long, allow_hyphen_values = true)]
        degree: Option<i64>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        /// Coerce curriculum mode to manual on non-youth belts
        #[arg(long)]
        fallback: bool,
    },

    /// Show a member's current rank
    Show { member_id: String },

    /// Show recent promotions, newest first
    History {
        member_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Verify a member's history chain
    Verify { member_id: String },

    /// List the belt catalog
    Belts,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LedgerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db.clone() {
        config.database_path = db;
    }

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let open = || -> Result<RankService<SqliteStore>> {
        let store = SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
        Ok(RankService::new(store)
            .with_history_limit(config.history_limit)
            .with_default_actor(config.default_actor.clone()))
    };

    match cli.command {
        Commands::Belts => print_belts(cli.json)?,
        Commands::Init => {
            open()?;
            println!("✓ Database ready at {}", config.database_path.display());
        }
        Commands::Import { csv } => {
            let service = open()?;
            let rows = load_legacy_csv(&csv).with_context(|| format!("Failed to read {}", csv.display()))?;
            println!("📂 Loaded {} legacy rows", rows.len());

            let summary = import_legacy_members(service.store(), rows)?;
            println!("✓ Inserted: {} members", summary.inserted);
            println!("✓ Skipped duplicates: {}", summary.duplicates);
            for belt in &summary.unknown_belts {
                println!("⚠️  Unknown belt imported as-is: {}", belt);
            }
        }
        Commands::Enroll { member_id, name, belt } => {
            let service = open()?;
            let record = service.enroll_member(&member_id, &name, belt.as_str())?;
            println!("✓ Enrolled {} ({}) at {}", record.display_name, record.member_id, record.rank.belt);
        }
        Commands::Promote {
            member_id,
            belt,
            mode,
            pattern,
            degree,
            note,
            actor,
            fallback,
        } => {
            let service = open()?;
            let mut request = match mode {
                ModeArg::Manual => PromotionRequest::manual(
                    belt.as_str(),
                    StripeCodec::pattern_tokens(pattern.as_deref().unwrap_or("")),
                ),
                ModeArg::Curriculum => {
                    let Some(degree) = degree else {
                        bail!("--degree is required in curriculum mode");
                    };
                    PromotionRequest::curriculum(belt.as_str(), degree)
                }
            };
            request.actor = actor;
            request.note = note;
            request.fallback_to_manual = fallback;

            let outcome = service.promote_member(&member_id, &request)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                if outcome.coerced {
                    println!("⚠️  Curriculum mode does not apply to {}, recorded as manual", belt);
                }
                println!("🎉 Promotion #{} applied ({})", outcome.sequence, outcome.history_entry_id);
                print_state(&outcome.next_state);
            }
        }
        Commands::Show { member_id } => {
            let service = open()?;
            let member = service.store().read_member(&member_id)?;
            let state = member.rank_state();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{} ({})", member.display_name, member.member_id);
                print_state(&state);
            }
        }
        Commands::History { member_id, limit } => {
            let service = open()?;
            let entries: Vec<RankHistoryEntry> = service.get_rank_history(&member_id, limit)?.collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No promotions recorded for {}", member_id);
            } else {
                for entry in &entries {
                    print_entry(entry);
                }
            }
        }
        Commands::Verify { member_id } => {
            let service = open()?;
            let report = service.verify_history(&member_id)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_intact() {
                println!("✅ {} entries verified for {}", report.entries_checked, member_id);
            } else {
                println!("❌ {} issue(s) in history of {}", report.issues.len(), member_id);
                for issue in &report.issues {
                    println!("   {:?}", issue);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_state(state: &RankState) {
    println!("   Belt:    {} ({})", BeltCatalog::label(&state.belt), state.belt);
    println!("   Stripes: {} {}", state.stripe_count, state.pattern);
    match state.mode {
        StripeMode::Curriculum => {
            println!("   Degree:  {}", state.degree.map_or("-".to_string(), |d| d.to_string()))
        }
        StripeMode::Manual => println!("   Mode:    manual"),
    }
}

fn print_entry(entry: &RankHistoryEntry) {
    println!(
        "#{} {}  {} → {}  by {}",
        entry.sequence,
        entry.created_at.format("%Y-%m-%d %H:%M"),
        describe(&entry.previous),
        describe(&entry.next),
        entry.actor
    );
    if let Some(note) = &entry.note {
        println!("   \"{}\"", note);
    }
}

fn describe(state: &RankState) -> String {
    match state.degree {
        Some(d) => format!("{} degree {}", state.belt, d),
        None => format!("{} {}", state.belt, state.pattern),
    }
}

fn print_belts(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(BeltCatalog::all())?);
        return Ok(());
    }

    for belt in BeltCatalog::all() {
        println!(
            "{:<14} {:<16} {:<6} {}",
            belt.id,
            belt.label,
            belt.family.as_str(),
            belt.display_color
        );
    }
    Ok(())
}
