use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use recall_core::model::{
    CapturedResponse, PayloadRef, ResponseSlot, SessionConfig, SessionFlow, SessionKey,
};
use recall_core::policy::Choice;
use services::{
    AppServices, Clock, Command, ControllerEvent, PendingDecision, RunnerOutput, SessionRunner,
    StaticContentProvider,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidFlow { raw: String },
    InvalidDate { raw: String },
    InvalidPart { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidFlow { raw } => {
                write!(f, "invalid --flow value: {raw} (expected drill or segments)")
            }
            ArgsError::InvalidDate { raw } => write!(f, "invalid --date value: {raw}"),
            ArgsError::InvalidPart { raw } => {
                write!(f, "invalid --part value: {raw} (expected CYCLE/DAY/PART)")
            }
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
    eprintln!("  cargo run -p app -- [--db <sqlite_url>] [--flow drill|segments]");
    eprintln!("                      [--date YYYY-MM-DD] [--part CYCLE/DAY/PART]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:recall.sqlite3");
    eprintln!("  --flow drill, keyed by today's date");
    eprintln!("  --flow segments, keyed by part 1/1/1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RECALL_DB_URL, RECALL_FLOW, RECALL_AI_API_KEY, RECALL_AI_BASE_URL,");
    eprintln!("  RECALL_AI_MODEL, RUST_LOG");
    eprintln!();
    eprintln!("Commands while a session runs:");
    eprintln!("  done | yes | no | skip | retake | pos <secs> | quit");
    eprintln!("  audio <slot> <secs> | images <slot> <count> | text <slot> <words...>");
    eprintln!("  (slot is before, after or single)");
}

struct Args {
    db_url: String,
    flow: SessionFlow,
    date: Option<NaiveDate>,
    part: Option<SessionKey>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("RECALL_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://recall.sqlite3".into(), normalize_sqlite_url);
        let mut flow = match std::env::var("RECALL_FLOW") {
            Ok(raw) => parse_flow(raw)?,
            Err(_) => SessionFlow::Drill,
        };
        let mut date = None;
        let mut part = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--flow" => flow = parse_flow(require_value(args, "--flow")?)?,
                "--date" => {
                    let value = require_value(args, "--date")?;
                    let parsed = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .map_err(|_| ArgsError::InvalidDate { raw: value.clone() })?;
                    date = Some(parsed);
                }
                "--part" => {
                    let value = require_value(args, "--part")?;
                    let parsed = format!("part-{}", value.replace('/', "-"))
                        .parse::<SessionKey>()
                        .map_err(|_| ArgsError::InvalidPart { raw: value.clone() })?;
                    part = Some(parsed);
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
            flow,
            date,
            part,
        })
    }

    fn session_key(&self) -> SessionKey {
        match self.flow {
            SessionFlow::Drill => SessionKey::daily(
                self.date
                    .unwrap_or_else(|| chrono::Local::now().date_naive()),
            ),
            SessionFlow::SegmentRecall => self.part.unwrap_or(SessionKey::part(1, 1, 1)),
        }
    }

    fn config(&self) -> SessionConfig {
        match self.flow {
            SessionFlow::Drill => SessionConfig::default_drill(),
            SessionFlow::SegmentRecall => SessionConfig::default_segment_recall(),
        }
    }
}

fn parse_flow(raw: String) -> Result<SessionFlow, ArgsError> {
    match raw.trim() {
        "drill" => Ok(SessionFlow::Drill),
        "segments" | "segment_recall" => Ok(SessionFlow::SegmentRecall),
        _ => Err(ArgsError::InvalidFlow { raw }),
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

// ─── Line commands ─────────────────────────────────────────────────────────────

/// What one line of input asks for.
enum Input {
    Command(Command),
    Quit,
    Nothing,
}

fn parse_slot(raw: Option<&str>) -> Result<ResponseSlot, String> {
    match raw {
        Some("before") => Ok(ResponseSlot::Before),
        Some("after") => Ok(ResponseSlot::After),
        Some("single") => Ok(ResponseSlot::Single),
        Some(other) => Err(format!("unknown slot: {other}")),
        None => Err("missing slot".into()),
    }
}

fn parse_number(raw: Option<&str>, what: &str) -> Result<u32, String> {
    raw.ok_or_else(|| format!("missing {what}"))?
        .parse()
        .map_err(|_| format!("invalid {what}"))
}

fn parse_input(line: &str, pending: Option<PendingDecision>) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Input::Nothing);
    };
    let now = chrono::Utc::now();

    let command = match verb {
        "quit" | "exit" => return Ok(Input::Quit),
        "done" | "continue" => Command::Done,
        "yes" | "no" => {
            let choice = if verb == "yes" {
                Choice::Accept
            } else {
                Choice::Decline
            };
            match pending {
                Some(PendingDecision::Break { .. }) => Command::Break(choice),
                _ => Command::Extension(choice),
            }
        }
        "skip" => Command::SkipBreak,
        "retake" => Command::Retake,
        "pos" => Command::PlaybackPosition(parse_number(words.next(), "position")?),
        "audio" => {
            let slot = parse_slot(words.next())?;
            let secs = parse_number(words.next(), "duration")?;
            Command::Submit {
                slot,
                response: CapturedResponse::audio(PayloadRef::generate(), secs, now),
            }
        }
        "images" => {
            let slot = parse_slot(words.next())?;
            let count = parse_number(words.next(), "image count")?;
            let payloads = (0..count).map(|_| PayloadRef::generate()).collect();
            Command::Submit {
                slot,
                response: CapturedResponse::images(payloads, now),
            }
        }
        "text" => {
            let slot = parse_slot(words.next())?;
            let text = words.collect::<Vec<_>>().join(" ");
            Command::Submit {
                slot,
                response: CapturedResponse::text(text, now),
            }
        }
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Input::Command(command))
}

fn render(event: &ControllerEvent) {
    match event {
        ControllerEvent::Tick { remaining_secs } => {
            if *remaining_secs % 60 == 0 || *remaining_secs <= 5 {
                println!("  {}:{:02} left", remaining_secs / 60, remaining_secs % 60);
            }
        }
        ControllerEvent::StepStarted {
            unit,
            step,
            duration_secs,
            resume_position_secs,
        } => {
            let timing = duration_secs.map_or_else(|| "untimed".to_string(), |d| format!("{d}s"));
            println!("unit {} / {step} ({timing})", unit + 1);
            if let Some(position) = resume_position_secs {
                println!("  resume playback at {position}s");
            }
        }
        ControllerEvent::ResponseCaptured { slot } => println!("  saved {slot} response"),
        ControllerEvent::Blocked(violation) => println!("  cannot continue: {violation}"),
        ControllerEvent::ExtensionOffered { extra_secs, .. } => {
            println!("time is up. extend by {} minutes? (yes/no)", extra_secs / 60);
        }
        ControllerEvent::Extended { remaining_secs } => {
            println!("  extended, {remaining_secs}s left");
        }
        ControllerEvent::BreakOffered { duration_secs } => {
            println!("take a {} minute break? (yes/no)", duration_secs / 60);
        }
        ControllerEvent::BreakStarted { duration_secs } => {
            println!("break started ({duration_secs}s); type skip to end it early");
        }
        ControllerEvent::ReportReady {
            score,
            provenance,
            dwell_secs,
            ..
        } => {
            println!("report: score {score} ({}) shown for {dwell_secs}s", provenance.as_str());
        }
        ControllerEvent::UnitCompleted { unit, score, attempt } => {
            println!("unit {} completed: score {score}, attempt {attempt}", unit + 1);
        }
        ControllerEvent::RetakeRequired { step, feedback, .. } => {
            println!("off-topic answer, starting again at {step}: {feedback}");
        }
        ControllerEvent::SessionCompleted { summary } => {
            println!(
                "session completed: {} units, average score {}, {} fallback analyses",
                summary.unit_count(),
                summary.average_score(),
                summary.fallback_count()
            );
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(
        &args.db_url,
        Clock::system(),
        Arc::new(StaticContentProvider::default()),
    )
    .await?;

    let key = args.session_key();
    let controller = services.session_loop().open(key, &args.config()).await?;
    if controller.is_completed() {
        println!("session {key} is already completed");
        return Ok(());
    }

    let (runner, commands, mut output) = SessionRunner::channel(controller, 64);
    let runner = tokio::spawn(runner.run());
    let mut commands: Option<mpsc::Sender<Command>> = Some(commands);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = None;

    loop {
        tokio::select! {
            out = output.recv() => match out {
                Some(RunnerOutput::Event(event)) => {
                    pending = match &event {
                        ControllerEvent::ExtensionOffered { extra_secs, .. } => {
                            Some(PendingDecision::Extension { extra_secs: *extra_secs })
                        }
                        ControllerEvent::BreakOffered { duration_secs } => {
                            Some(PendingDecision::Break { duration_secs: *duration_secs })
                        }
                        ControllerEvent::Tick { .. } => pending,
                        _ => None,
                    };
                    render(&event);
                }
                Some(RunnerOutput::Rejected(err)) => println!("  {err}"),
                None => break,
            },
            line = lines.next_line(), if commands.is_some() => {
                let input = match line? {
                    Some(line) => parse_input(&line, pending),
                    None => Ok(Input::Quit),
                };
                match input {
                    Ok(Input::Command(command)) => {
                        let sent = match &commands {
                            Some(tx) => tx.send(command).await.is_ok(),
                            None => false,
                        };
                        if !sent {
                            commands = None;
                        }
                    }
                    // Dropping the sender ends the runner; progress stays in the store.
                    Ok(Input::Quit) => commands = None,
                    Ok(Input::Nothing) => {}
                    Err(message) => println!("  {message}"),
                }
            }
        }
    }

    let controller = runner.await?;
    let progress = controller.progress();
    tracing::info!(
        session = %controller.session().id(),
        finished_units = progress.finished_units,
        total_units = progress.total_units,
        complete = progress.is_complete,
        "leaving session"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
