use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use recall_backend::config::Config;
use recall_backend::db::operations::memory_states;
use recall_backend::db::operations::StoreError;
use recall_backend::db::DbInitError;
use recall_backend::logging;
use recall_backend::services::ReviewError;

#[derive(Debug, Parser)]
#[command(name = "recall-backend", version, about = "Spaced-repetition review store")]
struct Cli {
    /// SQLite database file (overrides RECALL_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and apply migrations
    Migrate,
    /// Add items to the catalog
    AddItem {
        #[arg(required = true)]
        item_ids: Vec<String>,
    },
    /// Record a review with a 1-4 rating (out-of-range values are clamped)
    Review {
        user_id: String,
        item_id: String,
        #[arg(allow_hyphen_values = true)]
        rating: i64,
    },
    /// Record a review from a normalized grade in [0, 1]
    Grade {
        user_id: String,
        item_id: String,
        score: f64,
    },
    /// Record a right/wrong answer; fast correct answers rate higher
    Answer {
        user_id: String,
        item_id: String,
        #[arg(long)]
        wrong: bool,
        /// Response time in milliseconds
        #[arg(long, default_value_t = 3000)]
        response_ms: i64,
    },
    /// Show the next batch of items to present
    Due {
        user_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Due and new item counts
    Stats { user_id: String },
    /// Items answered wrong at least once, most failures first
    Wrong {
        user_id: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Toggle the favorite flag
    Favorite { user_id: String, item_id: String },
    /// Exclude an item from review (or include it again with --unset)
    Master {
        user_id: String,
        item_id: String,
        #[arg(long)]
        unset: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Db(#[from] DbInitError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = cli.db.clone() {
        config.db_path = path;
    }

    let _log_guard = logging::init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<(), CliError> {
    let service = recall_backend::create_review_service(config).await?;
    let now = Utc::now();

    match command {
        Command::Migrate => {
            tracing::info!(path = %config.db_path.display(), "migrations applied");
        }
        Command::AddItem { item_ids } => {
            let mut added = 0usize;
            for item_id in &item_ids {
                if memory_states::register_item(service.pool(), item_id, now).await? {
                    added += 1;
                }
            }
            print_json(&serde_json::json!({ "added": added, "total": item_ids.len() }))?;
        }
        Command::Review {
            user_id,
            item_id,
            rating,
        } => {
            let outcome = service.record_review(&user_id, &item_id, rating, now).await?;
            print_json(&outcome)?;
        }
        Command::Grade {
            user_id,
            item_id,
            score,
        } => {
            let outcome = service
                .record_graded_review(&user_id, &item_id, score, now)
                .await?;
            print_json(&outcome)?;
        }
        Command::Answer {
            user_id,
            item_id,
            wrong,
            response_ms,
        } => {
            let outcome = service
                .record_timed_review(&user_id, &item_id, !wrong, response_ms, now)
                .await?;
            print_json(&outcome)?;
        }
        Command::Due { user_id, limit } => {
            let selection = service.next_batch(&user_id, limit, now).await?;
            print_json(&selection)?;
        }
        Command::Stats { user_id } => {
            let stats = service.stats(&user_id, now).await?;
            print_json(&stats)?;
        }
        Command::Wrong { user_id, limit } => {
            let records = memory_states::wrong_records(service.pool(), &user_id, limit).await?;
            print_json(&records)?;
        }
        Command::Favorite { user_id, item_id } => {
            let favorite =
                memory_states::toggle_favorite(service.pool(), &user_id, &item_id, now).await?;
            print_json(&serde_json::json!({ "isFavorite": favorite }))?;
        }
        Command::Master {
            user_id,
            item_id,
            unset,
        } => {
            memory_states::set_mastered(service.pool(), &user_id, &item_id, !unset, now).await?;
            print_json(&serde_json::json!({ "isMastered": !unset }))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
