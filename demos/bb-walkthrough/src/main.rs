// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A minimal command-line driver for the blackboard engine.
//!
//! Seeds a single object from an input file, runs two toy workers (a hasher
//! NPC and a mimetype-guessing player) to quiescence, then prints a summary.
//! Stands in for the external CLI/config loader; proves the core is
//! drivable end to end, not a product-complete shell.
#![allow(clippy::print_stdout)]

mod workers;

use bb_config::GameDocument;
use bb_engine::{Game, GameError};
use bb_scheduler::{WorkerHandler, WorkerTemplate};
use bb_types::{EntryKind, FactTypeDescriptor, Interest, Version, WorkerDeclaration};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use workers::{HasherNpc, MimeTypePlayer};

/// Minimal driver for the blackboard engine.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// File whose bytes seed the run's first object. Ignored when `--load`
    /// resumes a prior run instead.
    input: PathBuf,

    /// Path to a `d20`-style YAML config document.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Write a save file here once the run reaches quiescence.
    #[clap(long)]
    save: Option<PathBuf>,

    /// Resume from a save file written by a prior `--save`, instead of
    /// seeding `input` into a fresh game.
    #[clap(long)]
    load: Option<PathBuf>,

    /// Which summary screen to print once the run goes quiescent.
    #[clap(long, value_enum, default_value_t = Screen::Summary)]
    screen: Screen,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Screen {
    /// Human-readable one-line summary.
    Summary,
    /// Machine-readable summary.
    Json,
}

/// Every failure mode the driver itself can surface, beyond [`GameError`].
#[derive(Debug, thiserror::Error)]
enum DriverError {
    /// Reading the input or save file, or writing the save file, failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The `--config` document failed to parse.
    #[error("config error: {0}")]
    Config(#[from] bb_config::ConfigError),
    /// A core engine operation failed.
    #[error(transparent)]
    Game(#[from] GameError),
}

impl DriverError {
    /// 2 for load/config failures the driver can't recover from, 1 for an
    /// in-run engine failure, matching `GameError::exit_code`'s split for
    /// the engine's own errors.
    fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Config(_) => 2,
            Self::Game(e) => e.exit_code(),
        }
    }
}

const MD5_FACT: &str = "md5";
const MIMETYPE_FACT: &str = "mimetype";
const ENGINE_VERSION: [u32; 1] = [1];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            error!(%err, "walkthrough failed");
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<(), DriverError> {
    let engine_version = Version(ENGINE_VERSION.to_vec());

    let document = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading config document");
            let text = std::fs::read_to_string(path)?;
            GameDocument::from_yaml(&text)?
        }
        None => GameDocument::default(),
    };
    let grace_time = document.d20.grace_time();
    let temp_base = document.d20.temporary.clone();

    let mut game = match &args.load {
        Some(path) => {
            info!(path = %path.display(), "resuming from save file");
            let mut file = std::fs::File::open(path)?;
            Game::load(
                &mut file,
                vec![watcher_template()],
                vec![FactTypeDescriptor::empty(MD5_FACT), FactTypeDescriptor::empty(MIMETYPE_FACT)],
                4,
                temp_base,
                engine_version,
            )
            .await?
        }
        None => {
            let game = Game::new(4, temp_base, engine_version);
            game.register_fact_type(FactTypeDescriptor::empty(MD5_FACT))?;
            game.register_fact_type(FactTypeDescriptor::empty(MIMETYPE_FACT))?;
            game.register_worker(hasher_template()).await?;
            game.register_worker(mimetype_template()).await?;

            info!(path = %args.input.display(), "seeding object from input file");
            let bytes = std::fs::read(&args.input)?;
            game.seed_object(bytes::Bytes::from(bytes), "bb-walkthrough").await?;
            game
        }
    };

    game.run_until_quiescent(grace_time).await?;

    for (clone_id, worker, detail) in game.failed_clones() {
        error!(clone_id, worker, detail, "clone ended with a worker error");
    }

    print_screen(&game, args.screen).await;

    if let Some(path) = &args.save {
        info!(path = %path.display(), "writing save file");
        let mut file = std::fs::File::create(path)?;
        game.save_to(&mut file).await?;
    }

    Ok(())
}

async fn print_screen(game: &Game, screen: Screen) {
    let (objects, facts, hyps) = game.counts().await;
    match screen {
        Screen::Summary => {
            println!("objects={objects} facts={facts} hyps={hyps} failed_clones={}", game.failed_clones().len());
        }
        Screen::Json => {
            let body = serde_json::json!({
                "objects": objects,
                "facts": facts,
                "hyps": hyps,
                "failedClones": game.failed_clones().len(),
            });
            println!("{body}");
        }
    }
}

fn declaration(name: &str, kind: EntryKind, interest: &str) -> WorkerDeclaration {
    WorkerDeclaration {
        name: name.to_string(),
        description: String::new(),
        creator: "bb-walkthrough".to_string(),
        version: Version(vec![1]),
        engine_version: Version(ENGINE_VERSION.to_vec()),
        help: String::new(),
        interests: vec![Interest::new(kind, interest)],
    }
}

fn hasher_template() -> WorkerTemplate {
    WorkerTemplate::new(
        declaration("hasher-npc", EntryKind::Object, "object"),
        WorkerHandler::Object(Arc::new(HasherNpc)),
    )
}

fn mimetype_template() -> WorkerTemplate {
    WorkerTemplate::new(
        declaration("mimetype-player", EntryKind::Fact, MD5_FACT),
        WorkerHandler::Fact(Arc::new(MimeTypePlayer)),
    )
}

/// Registered only against a loaded game, to prove a resumed run keeps
/// dispatching to type-scoped workers the same way a fresh one does.
fn watcher_template() -> WorkerTemplate {
    mimetype_template()
}
