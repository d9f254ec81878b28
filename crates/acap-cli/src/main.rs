//! Operator CLI for the build/recording scheduler.
//!
//! Thin by design: every subcommand opens a pool, calls a library function,
//! and prints a handful of `key=value` lines for easy shell scripting.
//! The long-running process lives in `acap-daemon`; this binary is for
//! one-shot operator actions (migrate, inspect, seed a build).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "acap")]
#[command(about = "Website action-capability build/recording scheduler CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (later layers win)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print a snapshot of in-flight scheduler activity
    Status,

    /// Enqueue a new build-job for a site
    BuildStart {
        /// Site UUID (must already exist in the `site` table)
        #[arg(long)]
        site_id: Uuid,
    },

    /// Print a single build-job's stage/status and task-status counts
    BuildStatus {
        #[arg(long)]
        build_id: Uuid,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = acap_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = acap_db::status(&pool).await?;
                    println!("db_ok={} has_tables={}", s.ok, s.has_build_task_table);
                }
                DbCmd::Migrate => {
                    acap_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = acap_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Status => {
            let pool = acap_db::connect_from_env().await?;
            let running_builds = acap_db::count_running_builds(&pool).await?;
            let running_tasks = acap_db::count_running_recording_tasks(&pool).await?;
            println!("running_builds={running_builds}");
            println!("running_recording_tasks={running_tasks}");
        }

        Commands::BuildStart { site_id } => {
            let pool = acap_db::connect_from_env().await?;
            let build_id = Uuid::new_v4();
            acap_db::enqueue_build_job(&pool, build_id, site_id, &json!({})).await.context("enqueue build-job")?;
            println!("build_id={build_id}");
            println!("site_id={site_id}");
        }

        Commands::BuildStatus { build_id } => {
            let pool = acap_db::connect_from_env().await?;
            let job = acap_db::fetch_build_job(&pool, build_id).await?;
            println!("stage={}", job.stage);
            println!("stage_status={}", job.stage_status);
            let counts = acap_db::task_status_counts(&pool, build_id).await?;
            println!(
                "tasks pending={} running={} completed={} failed={}",
                counts.pending, counts.running, counts.completed, counts.failed
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
