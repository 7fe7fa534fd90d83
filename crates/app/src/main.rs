use std::fmt;
use std::time::Duration;

use course_core::model::{CourseId, QuizId, UserId};
use services::{Clock, EngineConfig, EngineServices};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as log_fmt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    InvalidId { flag: &'static str, raw: String },
    InvalidNumber { name: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value (expected UUID): {raw}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidNumber { name, raw } => write!(f, "invalid {name} value: {raw}"),
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
    eprintln!("  cargo run -p app -- progress --user <uuid> --course <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- attempt  --user <uuid> --quiz <id>   [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- migrate  [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, COURSE_POLL_MS, COURSE_SKIP_TOLERANCE, COURSE_QUESTION_SECS");
    eprintln!("  RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Progress,
    Attempt,
    Migrate,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "progress" => Some(Self::Progress),
            "attempt" => Some(Self::Attempt),
            "migrate" => Some(Self::Migrate),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user: Option<UserId>,
    course: Option<CourseId>,
    quiz: Option<QuizId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("COURSE_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:dev.sqlite3".into()), normalize_sqlite_url);
        let mut user = None;
        let mut course = None;
        let mut quiz = None;

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
                        value
                            .parse::<UserId>()
                            .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?,
                    );
                }
                "--course" => {
                    let value = require_value(args, "--course")?;
                    course = Some(value.parse::<CourseId>().map_err(|_| ArgsError::InvalidId {
                        flag: "--course",
                        raw: value.clone(),
                    })?);
                }
                "--quiz" => {
                    let value = require_value(args, "--quiz")?;
                    quiz = Some(value.parse::<QuizId>().map_err(|_| ArgsError::InvalidId {
                        flag: "--quiz",
                        raw: value.clone(),
                    })?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user,
            course,
            quiz,
        })
    }
}

/// Engine tunables from the environment, falling back to the defaults.
fn config_from_env() -> Result<EngineConfig, ArgsError> {
    let mut config = EngineConfig::default();
    if let Ok(raw) = std::env::var("COURSE_POLL_MS") {
        let millis: u64 = raw.parse().map_err(|_| ArgsError::InvalidNumber {
            name: "COURSE_POLL_MS",
            raw: raw.clone(),
        })?;
        config = config.with_poll_interval(Duration::from_millis(millis));
    }
    if let Ok(raw) = std::env::var("COURSE_SKIP_TOLERANCE") {
        let seconds: f64 = raw.parse().map_err(|_| ArgsError::InvalidNumber {
            name: "COURSE_SKIP_TOLERANCE",
            raw: raw.clone(),
        })?;
        config = config.with_skip_tolerance(seconds);
    }
    if let Ok(raw) = std::env::var("COURSE_QUESTION_SECS") {
        let seconds: u32 = raw.parse().map_err(|_| ArgsError::InvalidNumber {
            name: "COURSE_QUESTION_SECS",
            raw: raw.clone(),
        })?;
        config = config.with_question_seconds(seconds);
    }
    Ok(config)
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

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Reports go to stdout; logs stay on stderr.
    tracing_subscriber::registry()
        .with(log_fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
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

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let config = config_from_env()?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let engine = EngineServices::new_sqlite(&parsed.db_url, Clock::system(), config).await?;
    tracing::debug!(db = %parsed.db_url, "engine ready");

    match cmd {
        Command::Migrate => {
            println!("Database ready at {}", parsed.db_url);
        }
        Command::Progress => {
            let user = parsed.user.ok_or(ArgsError::MissingFlag { flag: "--user" })?;
            let course = parsed.course.ok_or(ArgsError::MissingFlag { flag: "--course" })?;
            let progress = engine.course_progress().course_progress(user, course).await?;
            println!(
                "{course}: {}/{} lessons completed ({}%) rank {}",
                progress.completed(),
                progress.total(),
                progress.percent(),
                progress.rank().label()
            );
        }
        Command::Attempt => {
            let user = parsed.user.ok_or(ArgsError::MissingFlag { flag: "--user" })?;
            let quiz = parsed.quiz.ok_or(ArgsError::MissingFlag { flag: "--quiz" })?;
            match engine.quizzes().gate().has_attempted(user, quiz).await? {
                Some(summary) => println!(
                    "{quiz}: {}% ({}) on {}",
                    summary.score.percent(),
                    if summary.score.passed() { "passed" } else { "not passed" },
                    summary.attempted_at.to_rfc3339()
                ),
                None => println!("{quiz}: not attempted"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
