/// NDL command-line tool: check, format, lint and render NDL documents.
///
/// Usage:
///   ndl check scene.ndl --world world.ron
///   ndl fmt scene.ndl
///   ndl lint grammars/
///   ndl render scene.ndl --world world.ron --grammar grammars/ --seed 7 --json
use clap::{Args, Parser, Subcommand};
use ndl_bridge::core::bridge::{BridgeError, NarrationBridge};
use ndl_bridge::core::config::{BridgeConfig, ConfigError};
use ndl_bridge::ndl::validate::has_errors;
use ndl_bridge::ndl::{parse, parse_lenient, validate, NdlError};
use ndl_bridge::schema::entity::{Entity, EntityId, VoiceId};
use ndl_bridge::schema::world::{load_entities_from_ron, WorldError, WorldState};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

#[derive(Parser)]
#[command(author, version, about = "Check, format and narrate NDL documents.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report syntax errors and validation diagnostics.
    Check(CheckArgs),
    /// Print a document in canonical form.
    Fmt(FmtArgs),
    /// Report grammar rules that reference missing rules.
    Lint(LintArgs),
    /// Narrate a document with the template narrator.
    Render(RenderArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// NDL file, or `-` for stdin.
    file: PathBuf,
    /// Entity list (RON) to resolve references against.
    #[arg(long, value_name = "RON")]
    world: Option<PathBuf>,
}

#[derive(Args)]
struct FmtArgs {
    file: PathBuf,
    /// Exit with status 1 if the file is not already canonical.
    #[arg(long)]
    check: bool,
}

#[derive(Args)]
struct LintArgs {
    /// Grammar files or directories of them.
    #[arg(required = true)]
    grammars: Vec<PathBuf>,
}

#[derive(Args)]
struct RenderArgs {
    file: PathBuf,
    #[arg(long, value_name = "RON")]
    world: PathBuf,
    /// Bridge config (RON); other flags add to it.
    #[arg(long, value_name = "RON")]
    config: Option<PathBuf>,
    /// Grammar file or directory; may be repeated.
    #[arg(long = "grammar", value_name = "PATH")]
    grammars: Vec<PathBuf>,
    /// Voice file or directory; may be repeated.
    #[arg(long = "voices", value_name = "PATH")]
    voices: Vec<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Narrate every statement with this voice id.
    #[arg(long)]
    voice: Option<u64>,
    /// Print the full narration record as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{}: {}", .0.display(), .1)]
    Read(PathBuf, std::io::Error),
    #[error("syntax error: {0}")]
    Syntax(#[from] NdlError),
    #[error("world: {0}")]
    World(#[from] WorldError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Bridge(#[from] BridgeError),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn read_source(path: &Path) -> Result<String, CliError> {
    let result = if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source).map(|_| source)
    } else {
        std::fs::read_to_string(path)
    };
    result.map_err(|e| CliError::Read(path.to_path_buf(), e))
}

fn load_world(path: Option<&Path>) -> Result<HashMap<EntityId, Entity>, CliError> {
    match path {
        Some(path) => Ok(load_entities_from_ron(path)?),
        None => Ok(HashMap::new()),
    }
}

/// Returns the process exit status.
fn check(args: &CheckArgs) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;
    let entities = load_world(args.world.as_deref())?;
    let (doc, syntax_errors) = parse_lenient(&source);

    for e in &syntax_errors {
        println!("error: {}", e);
    }
    let mut diagnostics = validate(&doc, &WorldState::new(&entities));
    if args.world.is_none() {
        // without a world every reference is unknown
        diagnostics.retain(|d| !d.message.starts_with("unknown entity"));
    }
    for d in &diagnostics {
        println!("{}", d);
    }

    let failed = !syntax_errors.is_empty() || has_errors(&diagnostics);
    println!(
        "\n{} statements, {} syntax errors, {} diagnostics",
        doc.statements.len(),
        syntax_errors.len(),
        diagnostics.len()
    );
    Ok(if failed { 1 } else { 0 })
}

fn fmt(args: &FmtArgs) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;
    let formatted = parse(&source)?.to_string();
    if args.check {
        if formatted != source {
            eprintln!("{} is not in canonical form", args.file.display());
            return Ok(1);
        }
        return Ok(0);
    }
    print!("{}", formatted);
    Ok(0)
}

fn lint(args: &LintArgs) -> Result<i32, CliError> {
    let config = BridgeConfig {
        grammar_paths: args.grammars.clone(),
        ..BridgeConfig::default()
    };
    let grammars = config.load_grammars()?;
    println!("Loaded {} grammar rules", grammars.rules.len());

    let dangling = grammars.dangling_refs();
    for (rule, missing) in &dangling {
        println!("ERROR: rule '{}' references missing rule '{}'", rule, missing);
    }
    println!("\nSummary: {} errors", dangling.len());
    Ok(if dangling.is_empty() { 0 } else { 1 })
}

fn render(args: &RenderArgs) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;
    let entities = load_world(Some(&args.world))?;
    let world = WorldState::new(&entities);

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    config.grammar_paths.extend(args.grammars.iter().cloned());
    config.voice_paths.extend(args.voices.iter().cloned());

    let mut builder = NarrationBridge::builder().config(config);
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let mut bridge = builder.build()?;

    let narration = bridge.narrate_ndl(&source, &world, args.voice.map(VoiceId))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&narration)?);
    } else {
        println!("{}", narration.text);
    }
    Ok(0)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Check(args) => check(args),
        Commands::Fmt(args) => fmt(args),
        Commands::Lint(args) => lint(args),
        Commands::Render(args) => render(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    }
}
