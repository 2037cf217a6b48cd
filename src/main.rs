use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand, ValueEnum};
use schemars::schema_for;

use workbench::app::Workbench;
use workbench::config::Config;
use workbench::model::document::minimal_edit;
use workbench::model::events::{self, catalog_schema};
use workbench::model::options::{SHOW_FAILURES, SHOW_SPACES};
use workbench::services::storage::{FileStore, KeyValueStore, MemoryStore, GRAMMAR_KEY, INPUT_KEY};
use workbench::services::time_source::RealTimeSource;
use workbench::services::tracing_setup;

/// Live grammar workbench: keeps a grammar, a sample input and their trace in sync
#[derive(Parser, Debug)]
#[command(name = "workbench")]
#[command(about = "Incremental grammar workbench", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a grammar and optionally match an input against it
    Check {
        #[arg(long, value_name = "FILE")]
        grammar: PathBuf,

        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Rule to start from (default: the grammar's first rule)
        #[arg(long, value_name = "RULE")]
        start_rule: Option<String>,
    },

    /// Print the trace of matching an input
    Trace {
        #[arg(long, value_name = "FILE")]
        grammar: PathBuf,

        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "RULE")]
        start_rule: Option<String>,

        /// Include failed attempts
        #[arg(long)]
        show_failures: bool,

        /// Include implicit space skipping
        #[arg(long)]
        show_spaces: bool,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow edits to a grammar and input file, refreshing after each burst
    Watch {
        /// Grammar file (default: the stored grammar)
        #[arg(long, value_name = "FILE")]
        grammar: Option<PathBuf>,

        /// Input file (default: the stored input)
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        #[arg(long, value_name = "RULE")]
        start_rule: Option<String>,

        /// Do not read or write the persistent store
        #[arg(long)]
        no_store: bool,

        /// Exit after this many refresh cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
    },

    /// Print the event catalog of a bus as JSON
    Events {
        #[arg(value_enum, default_value_t = Category::Editor)]
        category: Category,
    },

    /// Print the JSON Schema of the configuration file
    ConfigSchema,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Category {
    Editor,
    Semantics,
    Examples,
}

fn read(path: &Path) -> AnyhowResult<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_config(args: &Args) -> AnyhowResult<Config> {
    let working_dir = std::env::current_dir().context("Failed to get working directory")?;
    Config::resolve(args.config.as_deref(), &working_dir).context("Failed to load config")
}

/// A workbench holding `grammar` and `input`, not backed by any store.
fn scratch_workbench(config: Config, grammar: &str, input: &str) -> AnyhowResult<Workbench> {
    let store = MemoryStore::with_values([(GRAMMAR_KEY, grammar), (INPUT_KEY, input)]);
    Workbench::open(config, RealTimeSource::shared(), Box::new(store))
}

fn check(
    config: Config,
    grammar_path: &Path,
    input_path: Option<&Path>,
    start_rule: Option<&str>,
) -> AnyhowResult<ExitCode> {
    let grammar = read(grammar_path)?;
    let input = input_path.map(read).transpose()?.unwrap_or_default();
    let mut workbench = scratch_workbench(config, &grammar, &input)?;
    workbench.set_start_rule(start_rule);
    let report = workbench.refresh_now()?;

    if let Some(error) = workbench.grammar_error() {
        eprintln!("{}: {}", grammar_path.display(), error.message);
        return Ok(ExitCode::FAILURE);
    }
    let Some(grammar) = workbench.grammar() else {
        eprintln!("{}: no grammar declared", grammar_path.display());
        return Ok(ExitCode::FAILURE);
    };
    println!(
        "{}: grammar {} ({} rules)",
        grammar_path.display(),
        grammar.name(),
        grammar.own_rules().count()
    );

    let Some(input_path) = input_path else {
        return Ok(ExitCode::SUCCESS);
    };
    if let Some(error) = &report.match_error {
        eprintln!("{}: {}", input_path.display(), error);
        return Ok(ExitCode::FAILURE);
    }
    let Some(trace) = workbench.current_trace() else {
        eprintln!("{}: grammar has no start rule", grammar_path.display());
        return Ok(ExitCode::FAILURE);
    };
    let result = trace.result();
    if result.succeeded() {
        println!("{}: matched {}", input_path.display(), result.start_rule());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}: {}", input_path.display(), result.message());
        Ok(ExitCode::FAILURE)
    }
}

fn trace(
    config: Config,
    grammar_path: &Path,
    input_path: &Path,
    start_rule: Option<&str>,
    show_failures: bool,
    show_spaces: bool,
    json: bool,
) -> AnyhowResult<ExitCode> {
    let grammar = read(grammar_path)?;
    let input = read(input_path)?;
    let mut workbench = scratch_workbench(config, &grammar, &input)?;
    workbench.set_start_rule(start_rule);
    let report = workbench.refresh_now()?;
    if let (None, Some(error)) = (workbench.grammar_error(), &report.match_error) {
        eprintln!("{}: {}", input_path.display(), error);
        return Ok(ExitCode::FAILURE);
    }
    if show_failures {
        workbench.set_option(SHOW_FAILURES, true)?;
    }
    workbench.set_option(SHOW_SPACES, show_spaces)?;
    workbench.flush()?;

    if let Some(error) = workbench.grammar_error() {
        eprintln!("{}: {}", grammar_path.display(), error.message);
        return Ok(ExitCode::FAILURE);
    }
    let Some(trace) = workbench.current_trace() else {
        eprintln!("{}: nothing to trace", grammar_path.display());
        return Ok(ExitCode::FAILURE);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&trace.to_json())?);
    } else {
        let options = workbench.options();
        print!(
            "{}",
            trace.render(options.get(SHOW_FAILURES), options.get(SHOW_SPACES))
        );
        if trace.result().failed() {
            println!("{}", trace.result().message());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Follow a file on disk, forwarding changes as minimal edits.
struct WatchedFile {
    path: PathBuf,
    contents: String,
}

impl WatchedFile {
    /// The edit turning the last seen contents into the current ones.
    fn poll(&mut self) -> Option<(usize, usize, String)> {
        let current = match fs::read_to_string(&self.path) {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };
        let edit = minimal_edit(&self.contents, &current)?;
        self.contents = current;
        Some((edit.from, edit.to, edit.text))
    }
}

fn watch(
    config: Config,
    grammar_path: Option<PathBuf>,
    input_path: Option<PathBuf>,
    start_rule: Option<&str>,
    no_store: bool,
    max_cycles: Option<u64>,
) -> AnyhowResult<ExitCode> {
    let store: Box<dyn KeyValueStore> = match config.storage_path() {
        Some(path) if !no_store => Box::new(
            FileStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        _ => Box::new(MemoryStore::new()),
    };
    let mut workbench = Workbench::open(config, RealTimeSource::shared(), store)?;
    workbench.set_start_rule(start_rule);

    let mut grammar_file = None;
    if let Some(path) = grammar_path {
        let contents = read(&path)?;
        workbench.set_grammar_source(&contents)?;
        grammar_file = Some(WatchedFile { path, contents });
    }
    let mut input_file = None;
    if let Some(path) = input_path {
        let contents = read(&path)?;
        workbench.set_input_source(&contents)?;
        input_file = Some(WatchedFile { path, contents });
    }

    let idle = Duration::from_millis(100);
    loop {
        if let Some((from, to, text)) = grammar_file.as_mut().and_then(WatchedFile::poll) {
            workbench.edit_grammar_range(from, to, &text)?;
        }
        if let Some((from, to, text)) = input_file.as_mut().and_then(WatchedFile::poll) {
            workbench.edit_input_range(from, to, &text)?;
        }

        if let Some(report) = workbench.poll()? {
            let grammar_error = workbench.grammar_error();
            match (grammar_error, &report.match_error, workbench.current_trace()) {
                (Some(error), _, _) => println!("grammar: {}", error.short_message),
                (None, Some(error), _) => println!("input: {error}"),
                (None, None, Some(trace)) if trace.result().succeeded() => {
                    println!("input: matched {}", trace.result().start_rule())
                }
                (None, None, Some(trace)) => println!("input: {}", trace.result().short_message()),
                (None, None, None) => println!("grammar: no start rule"),
            }
            tracing::debug!("Cycle report: {:?}", report);
            if max_cycles.is_some_and(|max| workbench.stats().cycles >= max) {
                return Ok(ExitCode::SUCCESS);
            }
        }

        let wait = workbench.time_until_refresh().map_or(idle, |left| left.min(idle));
        std::thread::sleep(wait);
    }
}

fn run(args: Args) -> AnyhowResult<ExitCode> {
    let config = load_config(&args)?;
    match args.command {
        Command::Check {
            grammar,
            input,
            start_rule,
        } => check(config, &grammar, input.as_deref(), start_rule.as_deref()),
        Command::Trace {
            grammar,
            input,
            start_rule,
            show_failures,
            show_spaces,
            json,
        } => trace(
            config,
            &grammar,
            &input,
            start_rule.as_deref(),
            show_failures,
            show_spaces,
            json,
        ),
        Command::Watch {
            grammar,
            input,
            start_rule,
            no_store,
            cycles,
        } => watch(config, grammar, input, start_rule.as_deref(), no_store, cycles),
        Command::Events { category } => {
            let catalog = match category {
                Category::Editor => events::editor::ALL,
                Category::Semantics => events::semantics::ALL,
                Category::Examples => events::examples::ALL,
            };
            println!("{}", serde_json::to_string_pretty(&catalog_schema(catalog))?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ConfigSchema => {
            let schema = schema_for!(Config);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let logging = match &args.log_file {
        Some(path) => tracing_setup::init_global(path),
        None => tracing_setup::init_stderr(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e:#}");
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
