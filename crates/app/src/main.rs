use std::fmt;

use prep_core::model::{Course, ProgressScope, Standard, UserId};
use services::{AppServices, Clock, SyncConfig, SyncController};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidCourse { raw: String },
    InvalidStandard { raw: String },
    InvalidUser { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourse { raw } => {
                write!(f, "invalid --course value: {raw} (expected NEET or JEE)")
            }
            ArgsError::InvalidStandard { raw } => {
                write!(f, "invalid --standard value: {raw} (expected 11th or 12th)")
            }
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- progress --user <id> --course <NEET|JEE> --standard <11th|12th> --subject <name>");
    eprintln!("  cargo run -p app -- complete --user <id> --course <c> --standard <s> --subject <name> --leaf <name>");
    eprintln!("  cargo run -p app -- reset    --user <id> --course <c> --standard <s> --subject <name>");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>   (default sqlite:prep.sqlite3)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PREP_DB_URL, PREP_API_BASE_URL, PREP_SYNC_DEBOUNCE_MS, PREP_UNLOCK_ALL,");
    eprintln!("  PREP_SYNC_WRITE_RETRIES, PREP_SYNC_RETRY_BACKOFF_MS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Progress,
    Complete,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "progress" => Some(Self::Progress),
            "complete" => Some(Self::Complete),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user: UserId,
    scope: ProgressScope,
    leaf: Option<String>,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PREP_DB_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| normalize_sqlite_url("sqlite:prep.sqlite3".into()), normalize_sqlite_url);
        let mut user = None;
        let mut course = None;
        let mut standard = None;
        let mut subject = None;
        let mut leaf = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user = Some(
                        UserId::new(value.clone())
                            .map_err(|_| ArgsError::InvalidUser { raw: value })?,
                    );
                }
                "--course" => {
                    let value = require_value(args, "--course")?;
                    course = Some(
                        value
                            .parse::<Course>()
                            .map_err(|_| ArgsError::InvalidCourse { raw: value })?,
                    );
                }
                "--standard" => {
                    let value = require_value(args, "--standard")?;
                    standard = Some(
                        value
                            .parse::<Standard>()
                            .map_err(|_| ArgsError::InvalidStandard { raw: value })?,
                    );
                }
                "--subject" => subject = Some(require_value(args, "--subject")?),
                "--leaf" if cmd == Command::Complete => leaf = Some(require_value(args, "--leaf")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let user = user.ok_or(ArgsError::MissingFlag { flag: "--user" })?;
        let course = course.ok_or(ArgsError::MissingFlag { flag: "--course" })?;
        let standard = standard.ok_or(ArgsError::MissingFlag { flag: "--standard" })?;
        let subject = subject.ok_or(ArgsError::MissingFlag { flag: "--subject" })?;
        if cmd == Command::Complete && leaf.is_none() {
            return Err(ArgsError::MissingFlag { flag: "--leaf" });
        }

        Ok(Self {
            db_url,
            user,
            scope: ProgressScope::new(course, standard, subject),
            leaf,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

fn print_progress(controller: &SyncController) {
    let scope = controller.scope();
    println!(
        "{scope}: {}%{}",
        controller.subject_progress(),
        if controller.is_subject_certified() { " (certified)" } else { "" }
    );
    for (index, (topic, pct)) in controller
        .topics()
        .iter()
        .zip(controller.topic_percentages())
        .enumerate()
    {
        let lock = if controller.is_topic_unlocked(index) { " " } else { "x" };
        println!("  [{lock}] {pct:>3}%  {}", topic.unit_name);
    }
}

/// Topic index and recorded name of the navigable entry called `leaf`.
fn locate(controller: &SyncController, leaf: &str) -> Option<(usize, String)> {
    controller.with_evaluator(|eval| {
        eval.entries()
            .iter()
            .find(|entry| entry.answers_to(leaf))
            .map(|entry| (entry.topic_index, entry.progress_name()))
    })
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite here so core/services stay free of file-system setup.
    prepare_sqlite_file(&parsed.db_url)?;
    let config = SyncConfig::from_env()?;
    let services = AppServices::new_sqlite(&parsed.db_url, config, Clock::default()).await?;
    tracing::info!(?cmd, user = %parsed.user, scope = %parsed.scope, "running command");
    let controller = services.open_subject(parsed.user, parsed.scope).await?;

    match cmd {
        Command::Progress => print_progress(&controller),
        Command::Complete => {
            let leaf = parsed.leaf.unwrap_or_default();
            if !controller.is_leaf_unlocked(&leaf) {
                eprintln!("{leaf} is locked; finish the previous item first");
                return Ok(());
            }
            let (topic_index, name) = locate(&controller, &leaf).ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no lesson or test named {leaf:?} in {}", controller.scope()),
                )
            })?;
            if controller.mark_leaf_complete(topic_index, &name).await? {
                println!("marked {name} complete");
            } else {
                println!("{name} was already complete");
            }
            controller.leave().await?;
            print_progress(&controller);
        }
        Command::Reset => {
            controller.reset().await?;
            println!("reset {}", controller.scope());
            controller.leave().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
