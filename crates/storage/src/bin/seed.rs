use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use course_core::model::{
    AnswerOption, CourseId, LessonId, OptionId, Question, QuestionId, QuizDefinition, QuizId,
};
use serde::Deserialize;
use storage::repository::{LessonCatalogRepository, LessonRecord, QuizRepository, Storage};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    file: Option<PathBuf>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut file = std::env::var("COURSE_SEED_FILE").ok().map(PathBuf::from);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--file" => {
                    file = Some(PathBuf::from(require_value(&mut args, "--file")?));
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, file, now })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --file <path.json>        Lessons and quizzes to load (default: built-in sample)");
    eprintln!("  --now <rfc3339>           Fixed creation time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_SEED_FILE");
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    lessons: Vec<SeedLesson>,
    #[serde(default)]
    quizzes: Vec<SeedQuiz>,
}

#[derive(Debug, Deserialize)]
struct SeedLesson {
    id: u64,
    course_id: u64,
    title: String,
    duration_secs: f64,
}

#[derive(Debug, Deserialize)]
struct SeedQuiz {
    id: u64,
    course_id: u64,
    title: String,
    questions: Vec<Question>,
}

fn sample_seed() -> SeedFile {
    let lessons = (1..=4)
        .map(|id| SeedLesson {
            id,
            course_id: 1,
            title: format!("Lesson {id}"),
            duration_secs: 120.0 * id as f64,
        })
        .collect();

    let prompts = [
        ("Which keyword declares an immutable binding?", ["let", "mut", "var"]),
        ("What does `?` do on an Err value?", ["returns it early", "panics", "ignores it"]),
        ("Which trait enables `{:?}` formatting?", ["Debug", "Display", "Clone"]),
        ("What owns a heap-allocated String?", ["one binding at a time", "every reference", "the stack"]),
        ("Which type signals a value may be absent?", ["Option", "Result", "Box"]),
    ];
    let questions = prompts
        .iter()
        .enumerate()
        .map(|(q_idx, (text, answers))| Question {
            id: QuestionId::new(q_idx as u64 + 1),
            text: (*text).to_string(),
            options: answers
                .iter()
                .enumerate()
                .map(|(o_idx, answer)| AnswerOption {
                    id: OptionId::new(o_idx as u64 + 1),
                    text: (*answer).to_string(),
                    is_correct: o_idx == 0,
                })
                .collect(),
        })
        .collect();

    SeedFile {
        lessons,
        quizzes: vec![SeedQuiz {
            id: 1,
            course_id: 1,
            title: "Rust basics".into(),
            questions,
        }],
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let seed = match &args.file {
        Some(path) => serde_json::from_str::<SeedFile>(&std::fs::read_to_string(path)?)?,
        None => sample_seed(),
    };

    let lesson_count = seed.lessons.len();
    let quiz_count = seed.quizzes.len();

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for lesson in &seed.lessons {
        storage
            .lessons
            .upsert_lesson(&LessonRecord {
                id: LessonId::new(lesson.id),
                course_id: CourseId::new(lesson.course_id),
                title: lesson.title.clone(),
                duration_secs: lesson.duration_secs,
            })
            .await?;
    }

    for quiz in seed.quizzes {
        let definition = QuizDefinition::new(
            QuizId::new(quiz.id),
            CourseId::new(quiz.course_id),
            quiz.title,
            quiz.questions,
        )?;
        storage.quizzes.upsert_quiz(&definition, now).await?;
    }

    println!(
        "Seeded {} lessons and {} quizzes into {}",
        lesson_count, quiz_count, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
