use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ward_config::{ConfigDiagnostics, WardConfig};
use ward_kb::{CaseDraft, DiagnosisEngine, JsonFileStore, PressureSignature};
use ward_memory::{PressureMonitor, SystemMemorySource};

mod render;

/// Rapid climb used by `diagnose --test`.
const TEST_TRAJECTORY: [f64; 7] = [30.0, 35.0, 42.0, 55.0, 70.0, 82.0, 95.0];
const DEFAULT_EXPORT_FILE: &str = "ward_cases_export.json";

#[derive(Parser)]
#[command(name = "ward", version, about = "Ward memory pressure diagnosis CLI")]
struct Cli {
    /// Config file (defaults to $WARD_CONFIG, then ./ward.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Knowledge base file (overrides knowledge.store_path)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show knowledge base statistics
    Stats(JsonArgs),
    /// Diagnose a usage trajectory
    Diagnose(DiagnoseArgs),
    /// Show one case
    Case(CaseArgs),
    /// List cases, optionally of one type
    List(ListArgs),
    /// Learn a new case from a JSON file
    Learn(LearnArgs),
    /// Export the catalog and recent diagnoses
    Export(ExportArgs),
    /// Show recent diagnoses
    History(HistoryArgs),
    /// Sample system memory once and show the pressure level and mitigation plan
    Pressure(JsonArgs),
}

#[derive(Args)]
struct JsonArgs {
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false, id = "input")]
struct DiagnoseInput {
    /// Signature JSON file (number list, `{"value": n}` list or dashboard export)
    #[arg(long)]
    file: Option<PathBuf>,
    /// Diagnose a builtin rapid-increase trajectory
    #[arg(long)]
    test: bool,
}

#[derive(Args)]
struct DiagnoseArgs {
    #[command(flatten)]
    input: DiagnoseInput,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CaseArgs {
    /// Case id, for example `OOM_001`
    id: String,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Only cases whose id starts with this type (`OOM`, `LEAK`, ...)
    #[arg(long = "type")]
    case_type: Option<String>,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LearnArgs {
    /// Case JSON file
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
struct ExportArgs {
    /// Output path
    #[arg(long, default_value = DEFAULT_EXPORT_FILE)]
    output: PathBuf,
}

#[derive(Args)]
struct HistoryArgs {
    /// Number of diagnoses to show
    #[arg(long, default_value_t = 10)]
    count: usize,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    ward_config::init_tracing(&config.logging);

    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path());
    tracing::debug!(target = "ward.cli", store = %store_path.display(), "knowledge base location");

    match cli.command {
        Command::Stats(args) => {
            let engine = open_engine(&config, &store_path)?;
            let stats = engine.stats();
            if args.json {
                print_json(&stats)?;
            } else {
                render::stats(&stats);
            }
            Ok(0)
        }
        Command::Diagnose(args) => {
            let signature = match args.input.file.as_deref() {
                Some(path) => read_signature(path)?,
                None if args.input.test => PressureSignature::new(TEST_TRAJECTORY.to_vec()),
                None => bail!("diagnose needs either --file or --test"),
            };
            let engine = open_engine(&config, &store_path)?;
            let outcome = engine.diagnose(&signature);
            save(&engine);

            match outcome {
                Ok(diagnosis) => {
                    if args.json {
                        print_json(&diagnosis)?;
                    } else {
                        render::diagnosis(&diagnosis);
                    }
                }
                Err(miss) => {
                    if args.json {
                        print_json(&MissEnvelope {
                            matched: false,
                            miss: &miss,
                        })?;
                    } else {
                        render::miss(&miss);
                    }
                }
            }
            Ok(0)
        }
        Command::Case(args) => {
            let engine = open_engine(&config, &store_path)?;
            match engine.case(&args.id) {
                Some(case) if args.json => print_json(&case)?,
                Some(case) => render::case(&case),
                None => println!("case not found: {}", args.id),
            }
            Ok(0)
        }
        Command::List(args) => {
            let engine = open_engine(&config, &store_path)?;
            let cases = engine.cases(args.case_type.as_deref());
            if args.json {
                print_json(&cases)?;
            } else {
                render::case_list(&cases, args.case_type.as_deref());
            }
            Ok(0)
        }
        Command::Learn(args) => {
            let text = std::fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let draft: CaseDraft = serde_json::from_str(&text)
                .with_context(|| format!("invalid case json in {}", args.file.display()))?;

            let engine = open_engine(&config, &store_path)?;
            match engine.learn(draft) {
                Ok(receipt) => {
                    println!("learned case: {}", receipt.case_id);
                    if let Some(err) = &receipt.persist_error {
                        println!("warning: the case was not saved: {err}");
                    }
                }
                Err(err) => println!("case rejected: {err}"),
            }
            Ok(0)
        }
        Command::Export(args) => {
            let engine = open_engine(&config, &store_path)?;
            let path = engine.export(&args.output)?;
            println!("exported knowledge base to {}", path.display());
            Ok(0)
        }
        Command::History(args) => {
            let engine = open_engine(&config, &store_path)?;
            let recent = engine.recent(args.count);
            if args.json {
                print_json(&recent)?;
            } else {
                render::history(&recent);
            }
            Ok(0)
        }
        Command::Pressure(args) => {
            let report = pressure_report(&config)?;
            if args.json {
                print_json(&report)?;
            } else {
                render::pressure(&report);
            }
            Ok(0)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<WardConfig> {
    let (config, diagnostics, path) = match explicit {
        Some(path) => {
            let (config, diagnostics) = WardConfig::load_from_path_with_diagnostics(path)?;
            (config, diagnostics, Some(path.to_path_buf()))
        }
        None => {
            let cwd = std::env::current_dir().context("failed to resolve current directory")?;
            match ward_config::discover_config_path(&cwd) {
                Some(path) => {
                    let (config, diagnostics) = WardConfig::load_from_path_with_diagnostics(&path)?;
                    (config, diagnostics, Some(path))
                }
                None => (WardConfig::default(), ConfigDiagnostics::default(), None),
            }
        }
    };

    for key in &diagnostics.unknown_keys {
        eprintln!("warning: unknown config key `{key}`");
    }
    for warning in &diagnostics.warnings {
        eprintln!("warning: {warning:?}");
    }
    if !diagnostics.is_ok() {
        let location = path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config".to_string());
        let errors: Vec<String> = diagnostics
            .errors
            .iter()
            .map(|error| format!("{error:?}"))
            .collect();
        bail!("invalid config {location}: {}", errors.join("; "));
    }
    Ok(config)
}

fn open_engine(config: &WardConfig, store_path: &Path) -> Result<DiagnosisEngine> {
    let store = Arc::new(JsonFileStore::new(store_path));
    DiagnosisEngine::open(config.engine_config(), store)
        .with_context(|| format!("failed to open knowledge base {}", store_path.display()))
}

/// Persist diagnosis history. A failed save is reported but does not fail the command.
fn save(engine: &DiagnosisEngine) {
    if let Err(err) = engine.persist() {
        eprintln!("warning: failed to save knowledge base: {err}");
    }
}

fn read_signature(path: &Path) -> Result<PressureSignature> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    PressureSignature::from_json(&text)
        .with_context(|| format!("invalid signature in {}", path.display()))
}

#[derive(Serialize)]
struct MissEnvelope<'a> {
    matched: bool,
    #[serde(flatten)]
    miss: &'a ward_kb::DiagnosisMiss,
}

#[derive(Serialize)]
pub(crate) struct PressureReport {
    pub(crate) percent_used: f64,
    pub(crate) process_mb: f64,
    pub(crate) level: ward_memory::PressureLevel,
    pub(crate) stats: ward_memory::PressureStats,
    pub(crate) plan: Vec<PlanStep>,
}

#[derive(Serialize)]
pub(crate) struct PlanStep {
    pub(crate) action: String,
    pub(crate) weight: f64,
    pub(crate) band: &'static str,
}

fn pressure_report(config: &WardConfig) -> Result<PressureReport> {
    let monitor = PressureMonitor::new(
        config.monitor_config(),
        Arc::new(SystemMemorySource::new()),
    );
    let sample = monitor.sample_fresh().context("failed to sample memory")?;
    let level = monitor.level();

    let scheduler = config.action_scheduler()?;
    let watch = config.watch_config();
    let candidates = watch.actions.get(&level).cloned().unwrap_or_default();
    let plan = scheduler
        .schedule(&candidates, sample.percent_used)
        .into_iter()
        .filter_map(|action| {
            let weight = scheduler.catalog().weight(&action)?;
            let band = scheduler.catalog().band(&action)?.as_str();
            Some(PlanStep {
                action,
                weight,
                band,
            })
        })
        .collect();

    Ok(PressureReport {
        percent_used: sample.percent_used,
        process_mb: sample.absolute_mb,
        level,
        stats: monitor.stats(),
        plan,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
