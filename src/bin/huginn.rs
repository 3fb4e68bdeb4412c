//! huginn — study material CLI
//!
//! Runs the gateway in-process: reads material from a file or stdin,
//! prints the generated artifact as JSON.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;

use huginn::{
    ChatTurn, Config, Difficulty, FileStore, GenerationConfig, HuginnError, ImagePart,
    LearnerProfile, QuestionType, Secrets, StudyGateway, StudyTechnique,
};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Turn study material into quizzes, lessons and study protocols")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Where the study material comes from.
#[derive(clap::Args)]
struct Material {
    /// Material file (or omit to read from stdin)
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Attach an image (png, jpeg, webp, gif); repeatable
    #[arg(short, long = "image")]
    images: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate quiz questions
    Exam {
        #[command(flatten)]
        material: Material,
        /// Number of questions
        #[arg(short = 'n', long, default_value_t = huginn::DEFAULT_QUESTION_COUNT)]
        count: u32,
        /// easy | medium | hard
        #[arg(short, long, default_value = "medium", value_parser = parse_enum::<Difficulty>)]
        difficulty: Difficulty,
        /// multiple_choice | fill_in_the_gap | select_all | mixed
        #[arg(short = 't', long = "type", default_value = "multiple_choice", value_parser = parse_enum::<QuestionType>)]
        question_type: QuestionType,
        /// Topics to focus on (enables weakness focus)
        #[arg(long = "weak-topic")]
        weak_topics: Vec<String>,
        /// Include explanations
        #[arg(long)]
        oracle: bool,
        /// Output language
        #[arg(long)]
        language: Option<String>,
    },

    /// Generate a structured lesson
    Lesson {
        #[command(flatten)]
        material: Material,
        /// Teaching persona
        #[arg(long)]
        persona: Option<String>,
        /// Domain to draw analogies from
        #[arg(long)]
        analogy: Option<String>,
        /// Output language
        #[arg(long)]
        language: Option<String>,
    },

    /// Summarize material
    Summarize {
        #[command(flatten)]
        material: Material,
    },

    /// Build a study protocol
    Protocol {
        #[command(flatten)]
        material: Material,
        /// feynman | active_recall | spaced_repetition | pomodoro | leitner
        #[arg(short, long, default_value = "active_recall", value_parser = parse_enum::<StudyTechnique>)]
        technique: StudyTechnique,
    },

    /// Ask the tutor about some material
    Chat {
        /// The new message
        message: String,
        /// Reference material file
        #[arg(long)]
        context: Option<PathBuf>,
        /// JSON file holding previous turns: [{"role":"user","text":"..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Show provider capabilities, rate budget and cache size
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let gateway = build_gateway(&config, &secrets).await?;

    match args.command {
        Command::Exam {
            material,
            count,
            difficulty,
            question_type,
            weak_topics,
            oracle,
            language,
        } => {
            let content = material.read()?;
            let mut options = GenerationConfig::new()
                .question_count(count)
                .difficulty(difficulty)
                .question_type(question_type)
                .oracle(oracle)
                .weakness_focus(!weak_topics.is_empty());
            if let Some(language) = language {
                options = options.language(language);
            }
            let profile =
                (!weak_topics.is_empty()).then(|| LearnerProfile::with_weak_topics(weak_topics));
            let quiz = gateway.generate_exam(&content, options, profile).await?;
            print_json(&quiz)?;
        }

        Command::Lesson {
            material,
            persona,
            analogy,
            language,
        } => {
            let content = material.read()?;
            let mut options = GenerationConfig::new();
            if let Some(persona) = persona {
                options = options.persona(persona);
            }
            if let Some(analogy) = analogy {
                options = options.analogy_domain(analogy);
            }
            if let Some(language) = language {
                options = options.language(language);
            }
            let lesson = gateway.generate_lesson(&content, options).await?;
            print_json(&lesson)?;
        }

        Command::Summarize { material } => {
            let content = material.read()?;
            let summary = gateway.summarize(&content).await?;
            if summary.degraded {
                eprintln!("warning: providers unavailable, showing placeholder");
            }
            println!("{}", summary.text);
        }

        Command::Protocol {
            material,
            technique,
        } => {
            let content = material.read()?;
            let protocol = gateway.generate_study_protocol(&content, technique).await?;
            if protocol.degraded {
                eprintln!("warning: providers unavailable, showing generic protocol");
            }
            print_json(&protocol)?;
        }

        Command::Chat {
            message,
            context,
            history,
        } => {
            let context = match context {
                Some(path) => read_file(&path)?,
                None => String::new(),
            };
            let history: Vec<ChatTurn> = match history {
                Some(path) => serde_json::from_str(&read_file(&path)?)?,
                None => Vec::new(),
            };
            let reply = gateway
                .generate_chat_reply(&history, &context, &message)
                .await?;
            if reply.degraded {
                eprintln!("warning: providers unavailable, showing placeholder");
            }
            println!("{}", reply.text);
        }

        Command::Status => {
            let caps = gateway.capabilities();
            println!("huginn {}", huginn::PKG_VERSION);
            println!("fast text:     {}", yes_no(caps.fast_text));
            println!("multimodal:    {}", yes_no(caps.multimodal));
            println!("large context: {}", yes_no(caps.large_context));
            println!("fallback:      {}", yes_no(caps.fallback));

            let rate = gateway.rate_status().await?;
            println!("rate budget:   {}/{}", rate.tokens, rate.capacity);
            if rate.tokens < rate.capacity {
                println!("next token in: {}s", rate.next_token_in.as_secs());
            }
            println!("cached:        {}", gateway.cache_len().await);
        }
    }

    Ok(())
}

/// Build a [`StudyGateway`] from configuration, persisting state on disk.
async fn build_gateway(config: &Config, secrets: &Secrets) -> Result<StudyGateway, HuginnError> {
    let store = match &config.storage.path {
        Some(path) => FileStore::open(path).await?,
        None => FileStore::open_default().await?,
    };
    info!(store = %store.path().display(), "using file store");

    config.builder(secrets).store(Arc::new(store)).build()
}

impl Material {
    /// Text (file or stdin) followed by one marker per attached image.
    fn read(&self) -> Result<String, Box<dyn std::error::Error>> {
        let mut content = match &self.file {
            Some(path) => read_file(path)?,
            None => read_stdin()?,
        };
        for path in &self.images {
            let mime = image_mime(path).ok_or_else(|| {
                HuginnError::InvalidInput(format!("unsupported image type: {}", path.display()))
            })?;
            let data = std::fs::read(path)?;
            content.push('\n');
            content.push_str(&ImagePart::new(mime, data).to_marker());
        }
        Ok(content)
    }
}

fn read_file(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()).into())
}

fn read_stdin() -> Result<String, Box<dyn std::error::Error>> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err("no input: pass --file or pipe material on stdin".into());
    }
    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    Ok(buf)
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Parse a snake_case enum value through its serde representation.
fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value: {s}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
