//! Liquid Skeleton CLI
//!
//! Usage:
//!   liquid-skeleton [OPTIONS] [TEMPLATE]
//!
//! Options:
//!   -d, --data <FILE>        Shared data (JSON object)
//!   -c, --config <FILE>      Engine configuration (TOML format)
//!   -r, --recipients <FILE>  Per-recipient arrays (JSON object of arrays)
//!   --separate <REGEX>       Names to defer during skeleton extraction
//!   --strict                 Fail on the first render error
//!   --dump-skeleton          Print the extracted skeleton as JSON
//!   -v, --verbose            Log pipeline events to stderr
//!   -h, --help               Print help

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::Level;

use liquid_skeleton::skeleton::{Fragment, Producer};
use liquid_skeleton::{
    EngineConfig, Map, Recipients, Skeleton, TagRegistry, Template, Value,
};

#[derive(Parser)]
#[command(name = "liquid-skeleton")]
#[command(about = "Render Liquid templates, directly or in personalized batches")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Shared data as a JSON object
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-recipient data: a JSON object mapping names to equal-length arrays
    #[arg(short, long)]
    recipients: Option<PathBuf>,

    /// Regex selecting variable names to defer; overrides the config file
    #[arg(long)]
    separate: Option<String>,

    /// Fail on the first render error instead of inlining it
    #[arg(long)]
    strict: bool,

    /// Print the extracted skeleton as JSON instead of rendering
    #[arg(long)]
    dump_skeleton: bool,

    /// Log pipeline events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).unwrap_or_else(|e| {
            fail(&format!("Error loading config '{}': {}", path.display(), e))
        }),
        None => EngineConfig::default(),
    };
    if cli.strict {
        config = config.with_strict(true);
    }
    if let Some(pattern) = &cli.separate {
        config = config
            .with_separation_pattern(pattern)
            .unwrap_or_else(|e| fail(&format!("Error in --separate: {}", e)));
    }

    let (source, filename) = read_source(cli.input.as_deref());

    let template = match Template::parse_with(&source, &TagRegistry::default(), config) {
        Ok(template) => template,
        Err(e) => {
            eprint!("{}", e.format(&source, &filename));
            process::exit(1);
        }
    };

    let shared = match &cli.data {
        Some(path) => read_map(path),
        None => Map::new(),
    };

    if cli.dump_skeleton {
        let skeleton = template
            .render_skeleton(&shared)
            .unwrap_or_else(|e| fail(&format!("Error: {}", e)));
        println!("{}", skeleton_json(&skeleton));
        return;
    }

    match &cli.recipients {
        Some(path) => {
            let recipients = read_recipients(path);
            match template.render_batch(&shared, &recipients) {
                Ok(outputs) => println!("{}", serde_json::Value::from(outputs)),
                Err(e) => fail(&format!("Error: {}", e)),
            }
        }
        None => match template.render(&shared) {
            Ok(output) => print!("{}", output),
            Err(e) => fail(&format!("Error: {}", e)),
        },
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read_source(input: Option<&Path>) -> (String, String) {
    match input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (content, path.display().to_string()),
            Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => (buffer, "<stdin>".to_string()),
                Err(e) => fail(&format!("Error reading from stdin: {}", e)),
            }
        }
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Error reading file '{}': {}", path.display(), e)));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| fail(&format!("Error parsing JSON '{}': {}", path.display(), e)))
}

fn read_map(path: &Path) -> Map {
    match Value::from(read_json(path)) {
        Value::Map(map) => map,
        _ => fail(&format!("'{}' must contain a JSON object", path.display())),
    }
}

fn read_recipients(path: &Path) -> Recipients {
    read_map(path)
        .into_iter()
        .map(|(name, value)| match value {
            Value::Array(values) => (name, values),
            _ => fail(&format!(
                "'{}': recipient entry '{}' must be an array",
                path.display(),
                name
            )),
        })
        .collect()
}

fn skeleton_json(skeleton: &Skeleton) -> serde_json::Value {
    let fragments: Vec<serde_json::Value> = skeleton
        .fragments()
        .iter()
        .map(|fragment| match fragment {
            Fragment::Literal(text) => serde_json::json!({ "literal": text }),
            Fragment::Variable(key) => serde_json::json!({ "variable": key.as_str() }),
            Fragment::Section(key) => serde_json::json!({ "section": key.as_str() }),
            Fragment::Halt(key) => serde_json::json!({ "halt": key.as_str() }),
        })
        .collect();

    let variables: serde_json::Map<String, serde_json::Value> = skeleton
        .variables()
        .iter()
        .map(|(key, producer)| {
            let entry = match producer {
                Producer::Direct(variable) => serde_json::json!({ "markup": variable.markup }),
                Producer::Conditional(conditional) => serde_json::json!({
                    "section": conditional.value.as_str(),
                    "positive": conditional.guard.positive().len(),
                    "negative": conditional.guard.negative().len(),
                }),
            };
            (key.to_string(), entry)
        })
        .collect();

    serde_json::json!({
        "text": skeleton.text(),
        "fragments": fragments,
        "variables": variables,
        "sections": skeleton.section_texts(),
    })
}
