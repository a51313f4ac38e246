//! CLI entry point for `nlsql`.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use nlsql_engine::sql::explain_optimization;
use nlsql_engine::{
    load_schema_file, ClassifierIrBuilder, Dialect, EngineConfig, NlSqlEngine, SchemaFormat, Translation,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    /// Direct keyword-driven builder
    Heuristic,
    /// Tokenizer, recognizer and intent classifier pipeline
    Classifier,
}

#[derive(Parser)]
#[command(name = "nlsql", about = "Translate plain-English questions into SQL against a schema")]
struct Cli {
    /// Question to translate; omit to read questions from stdin
    question: Vec<String>,

    /// Schema file (.sql DDL, .json, or .csv header)
    #[arg(short, long)]
    schema: PathBuf,

    /// Schema format: auto, ddl, json, csv
    #[arg(long, default_value = "auto")]
    format: String,

    /// Table name for CSV and JSON row schemas
    #[arg(long)]
    table_name: Option<String>,

    /// Output dialect: sqlite, postgres, mysql, ansi (defaults to the config's)
    #[arg(short, long)]
    dialect: Option<String>,

    /// JSON engine config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IR construction strategy
    #[arg(long, value_enum, default_value = "heuristic")]
    strategy: Strategy,

    /// Print tokens, entities and intent instead of SQL
    #[arg(long)]
    analyze: bool,

    /// Print the full translation as JSON
    #[arg(long)]
    json: bool,

    /// Print the estimated plan, alternatives and recommendations
    #[arg(long)]
    plan: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let format: SchemaFormat = cli.format.parse()?;
    let schema = load_schema_file(&cli.schema, format, cli.table_name.as_deref())
        .with_context(|| format!("loading schema {}", cli.schema.display()))?;

    let dialect = match &cli.dialect {
        Some(name) => name.parse::<Dialect>()?,
        None => config.default_dialect,
    };

    let mut engine = NlSqlEngine::new(schema, config)?;
    if let Strategy::Classifier = cli.strategy {
        let recognizer = engine.config().recognizer.clone();
        engine = engine.with_strategy(ClassifierIrBuilder::new(recognizer));
    }

    if !cli.question.is_empty() {
        let question = cli.question.join(" ");
        return run_one(&engine, &cli, &question, dialect);
    }

    // Interactive mode: one question per line
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("nlsql> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if !question.is_empty() {
            if let Err(e) = run_one(&engine, &cli, question, dialect) {
                eprintln!("error: {:#}", e);
            }
        }
        print!("nlsql> ");
        stdout.flush()?;
    }
    println!();
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "nlsql_engine=debug",
        _ => "nlsql_engine=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_one(engine: &NlSqlEngine, cli: &Cli, question: &str, dialect: Dialect) -> Result<()> {
    if cli.analyze {
        let analysis = engine.analyze(question)?;
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let translation = engine
        .translate(question, dialect)
        .map_err(|e| anyhow!(e).context(format!("translating '{}'", question)))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&translation)?);
        return Ok(());
    }
    print_translation(&translation, cli.plan);
    Ok(())
}

fn print_translation(translation: &Translation, with_plan: bool) {
    println!("{}", translation.sql);
    if !translation.params.is_empty() {
        let params: Vec<String> = translation.params.iter().map(|p| p.to_string()).collect();
        println!("-- params: {}", params.join(", "));
    }
    println!();
    println!("{}", translation.explanation);
    if with_plan {
        println!();
        println!("{}", explain_optimization(&translation.optimization));
    }
}
