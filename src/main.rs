mod config;
mod services;
mod session;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use annosync::ErrorCode;
use annosync::config::ConfigError;
use annosync::controller::{Notice, SyncError};
use annosync::doc::{self, DocError, ImageSize};
use annosync::locate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::services::gateway::{AssistService, HttpAssist, ServiceError};
use crate::session::{Session, SessionError};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Doc(#[from] DocError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no annotation encloses offset {0}")]
    NothingAtOffset(usize),
}

impl ErrorCode for AppError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "E_READ",
            Self::Config(e) => e.error_code(),
            Self::Doc(e) => e.error_code(),
            Self::Sync(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Service(e) => e.error_code(),
            Self::NothingAtOffset(_) => "E_NOTHING_AT_OFFSET",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pictosync", about = "Keep an annotation draft and its scene in sync, headless")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a draft and print it in canonical form.
    Normalize { draft: PathBuf },
    /// Import and link a draft, optionally against an image size (WxH).
    Import {
        draft: PathBuf,
        #[arg(long, value_parser = parse_size)]
        image: Option<ImageSize>,
    },
    /// Import a draft, then type an edited version into the editor.
    Apply {
        draft: PathBuf,
        edited: PathBuf,
        #[arg(long, value_parser = parse_size)]
        image: Option<ImageSize>,
    },
    /// Print the id of the annotation enclosing a byte offset.
    Locate {
        draft: PathBuf,
        #[arg(long)]
        offset: usize,
    },
    /// Draft annotations for an image through the gateway.
    Extract {
        image: PathBuf,
        #[arg(long, value_parser = parse_size)]
        size: ImageSize,
        #[arg(long)]
        model: Option<String>,
    },
    /// Refine one annotation's placement against its image.
    Align {
        draft: PathBuf,
        #[arg(long)]
        image: PathBuf,
        #[arg(long, value_parser = parse_size)]
        size: ImageSize,
        #[arg(long)]
        id: String,
    },
}

fn parse_size(raw: &str) -> Result<ImageSize, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let width: f64 = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    let size = ImageSize::new(width, height);
    if !size.is_positive() {
        return Err(format!("image size must be positive, got '{raw}'"));
    }
    Ok(size)
}

fn read(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|source| AppError::Read { path: path.to_path_buf(), source })
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_file = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    if let Ok(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "command failed");
            eprintln!("error [{}]: {e}", e.error_code());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    match command {
        Command::Normalize { draft } => {
            let parsed = doc::parse(&read(&draft)?)?;
            println!("{}", doc::serialize(&parsed, config.sync.indent)?);
        }
        Command::Import { draft, image } => {
            let mut session = Session::new(config.sync, None, "");
            if let Some(size) = image {
                session.load_image(size);
            }
            let result = session.import_text(&read(&draft)?);
            report(&mut session);
            result?;
            print_session(&session)?;
        }
        Command::Apply { draft, edited, image } => {
            let mut session = Session::new(config.sync, None, "");
            if let Some(size) = image {
                session.load_image(size);
            }
            let result = session.import_text(&read(&draft)?);
            report(&mut session);
            result?;
            session.type_text(&read(&edited)?).await;
            report(&mut session);
            print_session(&session)?;
        }
        Command::Locate { draft, offset } => {
            let text = read(&draft)?;
            let id = locate::annotation_at(&text, offset).ok_or(AppError::NothingAtOffset(offset))?;
            match locate::annotation_span(&text, &id) {
                Some(span) => println!("{id} lines {}-{}", span.first_line + 1, span.last_line + 1),
                None => println!("{id}"),
            }
        }
        Command::Extract { image, size, model } => {
            let mut session = gateway_session(&config, model)?;
            session.load_image(size);
            session.extract(&image).await?;
            report(&mut session);
            print_session(&session)?;
        }
        Command::Align { draft, image, size, id } => {
            let mut session = gateway_session(&config, None)?;
            session.load_image(size);
            let result = session.import_text(&read(&draft)?);
            report(&mut session);
            result?;
            session.align(&image, &id).await?;
            report(&mut session);
            print_session(&session)?;
        }
    }
    Ok(())
}

fn gateway_session(config: &AppConfig, model: Option<String>) -> Result<Session, AppError> {
    let service_config = config.service.as_ref().ok_or(SessionError::ServiceDisabled)?;
    let client: Arc<dyn AssistService> = Arc::new(HttpAssist::new(service_config)?);
    let model = model.unwrap_or_else(|| service_config.model.clone());
    tracing::info!(base_url = %service_config.base_url, %model, "gateway client initialized");
    Ok(Session::new(config.sync, Some(client), model))
}

/// Status notices go to stderr; failures are logged and echoed there too.
fn report(session: &mut Session) {
    for notice in session.take_notices() {
        match notice {
            Notice::Status(text) => eprintln!("{text}"),
            Notice::Failure { title, message } => {
                tracing::warn!(%title, %message, "operation failed");
                eprintln!("{title}: {message}");
            }
        }
    }
}

fn print_session(session: &Session) -> Result<(), AppError> {
    let controller = session.controller();
    tracing::info!(
        link = ?controller.link_state(),
        records = controller.document().map_or(0, |d| d.len()),
        "session state"
    );
    println!("{}", session.document_text()?);
    for line in session.scene_summary() {
        eprintln!("  {line}");
    }
    Ok(())
}
