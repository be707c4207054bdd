//! Lamad Competency operator tool
//!
//! Creates and seeds the competency database and inspects derived state.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and a default config
//! lamad-competency init
//!
//! # Load profiles, admins, competencies and questions from JSON
//! lamad-competency seed catalog.json
//!
//! # Add an identity to the admin override allow-list
//! lamad-competency grant-admin ada
//!
//! # Print a learner's derived progress
//! lamad-competency progress ada
//!
//! # Print a proposal's tally, recounted from votes
//! lamad-competency tally 6f1c...
//!
//! # Use a custom storage directory
//! lamad-competency --storage-dir /data/competency init
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lamad_competency::db::seed::{apply_seed, SeedFile};
use lamad_competency::db::profiles;
use lamad_competency::services::progress::average_percent;
use lamad_competency::services::LearnerProgress;
use lamad_competency::views::{LearnerProgressView, TallyView};
use lamad_competency::{Config, Services, SqliteStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lamad-competency")]
#[command(about = "Competency tracking database tool")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "LAMAD_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "LAMAD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and write a default config
    Init,
    /// Apply a JSON seed file
    Seed {
        file: PathBuf,
    },
    /// Grant the admin override to an identity
    GrantAdmin {
        user_id: String,
    },
    /// Print a learner's progress as JSON
    Progress {
        learner_id: String,
    },
    /// Print a proposal's tally as JSON
    Tally {
        proposal_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lamad_competency=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else {
        Config::default()
    };

    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    let store = SqliteStore::open(&config.database_path(), config.pool_size)
        .with_context(|| format!("opening {}", config.database_path().display()))?;

    match args.command {
        Command::Init => {
            let config_path = config.config_path();
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            let stats = store.database().stats()?;
            info!(
                database = %config.database_path().display(),
                competencies = stats.competency_count,
                "Database ready"
            );
        }

        Command::Seed { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let seed = SeedFile::from_json(&json)?;
            let summary = store.database().with_conn(|conn| apply_seed(conn, &seed))?;
            info!(
                profiles = summary.profiles,
                admins = summary.admins,
                competencies = summary.competencies,
                questions = summary.questions_added,
                "Seed applied"
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::GrantAdmin { user_id } => {
            let granted = store
                .database()
                .with_conn(|conn| profiles::grant_admin(conn, &user_id))?;
            if granted {
                info!(user = %user_id, "Admin override granted");
            } else {
                warn!(user = %user_id, "Already on the admin allow-list");
            }
        }

        Command::Progress { learner_id } => {
            let services = Services::new(Arc::new(store), &config);
            let records = services.progress.compute_for_learner(&learner_id).await?;
            let view = LearnerProgressView::from(LearnerProgress {
                average: average_percent(&records),
                learner_id,
                records,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }

        Command::Tally { proposal_id } => {
            let services = Services::new(Arc::new(store), &config);
            let tally = services.voting.tally(&proposal_id).await?;
            println!("{}", serde_json::to_string_pretty(&TallyView::from(tally))?);
        }
    }

    Ok(())
}
