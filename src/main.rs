use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod db;
mod insights;
mod models;
mod report;
mod snapshot;

use insights::DefaulterOrder;
use models::{Batch, Snapshot, Student};

#[derive(Parser)]
#[command(name = "attendance-insights")]
#[command(about = "Attendance reports over locally stored batch records", long_about = None)]
struct Cli {
    /// Postgres instance holding the stored batches, students and attendance.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    /// Read a JSON export instead of the database. Takes precedence over --database-url.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    /// One of off, error, warn, info, debug, trace. RUST_LOG takes precedence.
    #[arg(long, global = true, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Store demo batches, students and attendance for the current month
    Seed,
    /// Attendance history and totals for one student
    Student {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = report::RECENT_SESSIONS)]
        limit: usize,
    },
    /// Present/absent/late counts for one batch on one day
    Batch {
        #[arg(long)]
        id: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Students below an attendance threshold for a month
    Defaulters {
        #[command(flatten)]
        period: Period,
        #[arg(long, value_enum, default_value_t = DefaulterOrder::Roster)]
        sort: DefaulterOrder,
        /// Also write the list as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        /// Defaults to the first student on the roster
        #[arg(long)]
        student: Option<String>,
        /// Defaults to the first batch
        #[arg(long)]
        batch: Option<String>,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        period: Period,
        #[arg(long, value_enum, default_value_t = DefaulterOrder::Roster)]
        sort: DefaulterOrder,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(clap::Args)]
struct Period {
    /// 1-12, defaults to the current month
    #[arg(long)]
    month: Option<u32>,
    /// Four digit year, defaults to the current year
    #[arg(long)]
    year: Option<String>,
    /// Attendance percentage a student must reach
    #[arg(long, default_value_t = 75.0, allow_negative_numbers = true)]
    threshold: f64,
}

/// Where a command reads its snapshot from.
#[derive(Debug, PartialEq)]
enum Source<'a> {
    File(&'a Path),
    Database,
}

impl Cli {
    /// `--snapshot` wins over `--database-url`, which is usually inherited
    /// from the environment.
    fn source(&self) -> Source<'_> {
        match &self.snapshot {
            Some(path) => Source::File(path),
            None => Source::Database,
        }
    }
}

impl Period {
    fn month(&self) -> u32 {
        self.month.unwrap_or_else(|| Utc::now().month())
    }

    fn year(&self) -> String {
        self.year
            .clone()
            .unwrap_or_else(|| Utc::now().year().to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(&cli).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&cli).await?;
            db::seed(&pool, Utc::now().date_naive()).await?;
            println!("Demo data stored.");
        }
        Commands::Student { id, limit } => {
            let snapshot = load_snapshot(&cli).await?;
            let student = find_student(&snapshot, id).cloned().unwrap_or_else(|| Student {
                id: id.clone(),
                name: id.clone(),
                roll_number: String::new(),
            });
            let student_report = insights::student_report(&snapshot.attendance, id);

            let mut output = String::new();
            report::write_student_section(&mut output, &student, &student_report, *limit);
            print!("{output}");
        }
        Commands::Batch { id, date } => {
            let snapshot = load_snapshot(&cli).await?;
            let date = date.clone().unwrap_or_else(today);
            let name = find_batch(&snapshot, id).map_or(id.as_str(), |b| b.name.as_str());
            let summary = insights::batch_summary(&snapshot.attendance, id, &date);

            let mut output = String::new();
            report::write_batch_section(&mut output, name, &date, summary.as_ref());
            print!("{output}");
        }
        Commands::Defaulters { period, sort, csv } => {
            let snapshot = load_snapshot(&cli).await?;
            let (month, year) = (period.month(), period.year());
            let mut flagged = insights::defaulters(
                &snapshot.attendance,
                &snapshot.students,
                month,
                &year,
                period.threshold,
            );
            insights::sort_defaulters(&mut flagged, *sort);
            debug!(count = flagged.len(), month, year = %year, "defaulters computed");

            let mut output = String::new();
            report::write_defaulter_section(&mut output, month, &year, period.threshold, &flagged);
            print!("{output}");

            if let Some(path) = csv {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_defaulters_csv(file, &flagged)?;
                println!("CSV written to {}.", path.display());
            }
        }
        Commands::Report {
            student,
            batch,
            date,
            period,
            sort,
            out,
        } => {
            let snapshot = load_snapshot(&cli).await?;
            let student = match student {
                Some(id) => Some(
                    find_student(&snapshot, id)
                        .with_context(|| format!("no student with id {id}"))?,
                ),
                None => snapshot.students.first(),
            };
            let batch = match batch {
                Some(id) => Some(
                    find_batch(&snapshot, id).with_context(|| format!("no batch with id {id}"))?,
                ),
                None => snapshot.batches.first(),
            };
            let date = date.clone().unwrap_or_else(today);
            let year = period.year();
            let scope = report::ReportScope {
                student,
                batch,
                date: &date,
                month: period.month(),
                year: &year,
                threshold: period.threshold,
                order: *sort,
            };

            let markdown = report::build_report(&snapshot, &scope);
            std::fs::write(out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_snapshot(cli: &Cli) -> anyhow::Result<Snapshot> {
    let snapshot = match cli.source() {
        Source::File(path) => {
            if cli.database_url.is_some() {
                debug!(path = %path.display(), "reading snapshot file, database url ignored");
            }
            snapshot::load_file(path)?
        }
        Source::Database => db::fetch_snapshot(&connect(cli).await?).await?,
    };
    info!(
        batches = snapshot.batches.len(),
        students = snapshot.students.len(),
        batches_with_attendance = snapshot.attendance.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn find_student<'a>(snapshot: &'a Snapshot, id: &str) -> Option<&'a Student> {
    snapshot.students.iter().find(|s| s.id == id)
}

fn find_batch<'a>(snapshot: &'a Snapshot, id: &str) -> Option<&'a Batch> {
    snapshot.batches.iter().find(|b| b.id == id)
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
