//! dltlyse - DLT trace analyser
//!
//! Command-line front end of the dltlyse-engine library. It adds:
//! - TOML configuration merged with command line arguments
//! - Plugin catalog: built-in plugins plus dynamic plugin libraries
//! - Trace path expansion (directories, recursive search)
//! - Ctrl-C handling (stop reading, still report)
//! - JSON report output and exit code

use anyhow::{Context, Result};
use clap::Parser;
use dltlyse_engine::{
    Analyser, EngineConfig, EngineError, JsonReportWriter, PluginCatalog, PluginEnv,
    PluginRegistry, Report, ReportWriter, ResultState, Selection, TraceSource,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod config;
mod dynamic;
mod inputs;
mod plugins;

use config::AppConfig;

/// dltlyse - run analysis plugins over decoded DLT traces
#[derive(Parser, Debug)]
#[command(name = "dltlyse")]
#[command(about = "Analyse decoded DLT traces (JSON Lines) with plugins", long_about = None)]
#[command(version)]
struct Args {
    /// Trace files or directories containing *.jsonl traces
    #[arg(value_name = "TRACE")]
    traces: Vec<PathBuf>,

    /// Add directory to search for plugin libraries (can be repeated)
    #[arg(short = 'd', long = "plugins-dir", value_name = "DIR")]
    plugin_dirs: Vec<PathBuf>,

    /// Run only the listed plugins (can be repeated)
    #[arg(short, long, value_name = "NAME")]
    plugins: Vec<String>,

    /// Exclude listed plugins (can be repeated)
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Show available plugins and exit
    #[arg(short, long)]
    show_plugins: bool,

    /// Path to configuration file (dltlyse.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the JSON report to this file [default: dltlyse_results.json]
    #[arg(short = 'o', long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Testsuite name used inside the report
    #[arg(long, value_name = "NAME")]
    testsuite_name: Option<String>,

    /// Stop the whole analysis at the first decode error
    #[arg(long)]
    abort_on_decode_error: bool,

    /// Search directories for traces recursively
    #[arg(short, long)]
    recursive: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Settings of one run: config file values overridden by arguments
#[derive(Debug)]
struct RunSettings {
    traces: Vec<PathBuf>,
    recursive: bool,
    plugin_dirs: Vec<PathBuf>,
    selection: Selection,
    report: PathBuf,
    extract_dir: PathBuf,
    engine: EngineConfig,
    lifecycle: dltlyse_engine::DaemonStartMarker,
}

impl RunSettings {
    fn merge(args: &Args, config: AppConfig) -> Self {
        let traces = if args.traces.is_empty() {
            config.input.files
        } else {
            args.traces.clone()
        };
        let plugin_dirs = if args.plugin_dirs.is_empty() {
            config.plugins.dirs
        } else {
            args.plugin_dirs.clone()
        };

        let include = if !args.plugins.is_empty() {
            Some(args.plugins.clone())
        } else if !config.plugins.include.is_empty() {
            Some(config.plugins.include)
        } else {
            None
        };
        let selection = Selection {
            include,
            exclude: config.plugins.exclude,
            include_manual: config.plugins.include_manual,
        }
        .excluding(args.exclude.iter().cloned());

        let decode_error_policy = if args.abort_on_decode_error {
            dltlyse_engine::DecodeErrorPolicy::Abort
        } else {
            config.input.decode_errors
        };
        let engine = EngineConfig::new()
            .with_decode_error_policy(decode_error_policy)
            .with_testsuite_name(
                args.testsuite_name
                    .clone()
                    .unwrap_or(config.output.testsuite_name),
            );

        Self {
            traces,
            recursive: args.recursive || config.input.recursive,
            plugin_dirs,
            selection,
            report: args.report.clone().unwrap_or(config.output.report),
            extract_dir: config.output.extracted_dir,
            engine,
            lifecycle: config.lifecycle,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("dltlyse v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using engine library v{}", dltlyse_engine::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let settings = RunSettings::merge(&args, config);
    log::debug!("Run settings: {:?}", settings);

    // Libraries are declared first so they are unloaded last
    let mut libraries = dynamic::PluginLibraries::default();
    let mut catalog = PluginCatalog::new();
    plugins::register_builtin(&mut catalog);
    let library_failures = libraries.load_dirs(&settings.plugin_dirs, &mut catalog);
    log::debug!(
        "{} plugin(s) available, {} from libraries",
        catalog.len(),
        catalog.entries().iter().filter(|e| e.origin != "built-in").count()
    );
    for path in libraries.paths() {
        log::trace!("Plugin library in use: {:?}", path);
    }

    if args.show_plugins {
        eprint!("{}", catalog.show());
        return Ok(());
    }

    let env = PluginEnv::new(&settings.extract_dir);
    let candidates = catalog.instantiate(&settings.selection, &env)?;
    let registry = PluginRegistry::build_from_candidates(
        candidates
            .into_iter()
            .chain(library_failures.into_iter().map(Err)),
    );

    let traces = inputs::expand_traces(&settings.traces, settings.recursive);
    if traces.is_empty() {
        log::warn!("No trace files given");
    }
    let trace_count = traces.len();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received, finishing analysis");
            stop.store(true, Ordering::Relaxed);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let report = Analyser::new(registry)
        .with_config(settings.engine.clone())
        .with_boundary_detector(settings.lifecycle.clone())
        .with_stop_flag(stop)
        .run(TraceSource::from_paths(traces));

    JsonReportWriter::new(&settings.report, &settings.extract_dir)
        .write(&report)
        .with_context(|| format!("Failed to write report {:?}", settings.report))?;

    if !args.quiet {
        print_summary(&report, &settings.report);
    }

    if report.metadata.readable_inputs() == 0 {
        return Err(EngineError::NoReadableInput(trace_count).into());
    }

    let code = report.exit_code();
    if code != 0 {
        log::debug!("Exiting with status {}", code);
        std::process::exit(code);
    }
    Ok(())
}

/// Print the run summary to stdout
fn print_summary(report: &Report, report_path: &std::path::Path) {
    let counts = report.counts();
    let count = |state: ResultState| counts.get(&state).copied().unwrap_or(0);
    let duration: chrono::Duration = report.metadata.finished_at - report.metadata.started_at;

    println!("═══════════════════════════════════════════════");
    println!("  dltlyse - {}", report.metadata.testsuite_name);
    println!("═══════════════════════════════════════════════");
    println!(
        "  Traces:     {} ({} readable)",
        report.metadata.inputs.len(),
        report.metadata.readable_inputs()
    );
    println!(
        "  Started:    {}",
        report.metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Records:    {}", report.metadata.records_processed);
    println!("  Lifecycles: {}", report.metadata.lifecycles.len());
    println!(
        "  Results:    {} success, {} failure, {} error, {} skipped",
        count(ResultState::Success),
        count(ResultState::Failure),
        count(ResultState::Error),
        count(ResultState::Skipped)
    );
    if !report.metadata.crashed_plugins.is_empty() {
        println!("  Crashed:    {}", report.metadata.crashed_plugins.join(", "));
    }
    if !report.metadata.failed_plugins.is_empty() {
        println!("  Not loaded: {}", report.metadata.failed_plugins.join(", "));
    }
    if report.metadata.interrupted {
        println!("  Interrupted, results are partial");
    }
    println!("  Duration:   {:.2}s", duration.num_milliseconds() as f64 / 1000.0);
    println!("  Status:     {}", report.overall_status());
    println!("  Report:     {}", report_path.display());
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dltlyse_engine::DecodeErrorPolicy;

    #[test]
    fn test_args_override_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [input]
            files = ["from_config.jsonl"]
            decode_errors = "abort"

            [plugins]
            include = ["ContextPlugin"]
            exclude = ["SysmemPlugin"]

            [output]
            report = "config_report.json"
            "#,
        )
        .unwrap();
        let args = Args::parse_from([
            "dltlyse",
            "-p",
            "SysErrorPlugin",
            "--exclude",
            "ExtractFilesPlugin",
            "-o",
            "out.json",
            "trace.jsonl",
        ]);

        let settings = RunSettings::merge(&args, config);
        assert_eq!(settings.traces, vec![PathBuf::from("trace.jsonl")]);
        assert_eq!(settings.selection.include, Some(vec!["SysErrorPlugin".to_string()]));
        assert_eq!(
            settings.selection.exclude,
            vec!["SysmemPlugin".to_string(), "ExtractFilesPlugin".to_string()]
        );
        assert_eq!(settings.report, PathBuf::from("out.json"));
        assert_eq!(settings.engine.decode_error_policy, DecodeErrorPolicy::Abort);
    }

    #[test]
    fn test_defaults_without_config() {
        let args = Args::parse_from(["dltlyse", "--abort-on-decode-error"]);
        let settings = RunSettings::merge(&args, AppConfig::default());
        assert!(settings.traces.is_empty());
        assert_eq!(settings.selection.include, None);
        assert_eq!(settings.report, PathBuf::from("dltlyse_results.json"));
        assert_eq!(settings.engine.testsuite_name, "dltlyse");
        assert_eq!(settings.engine.decode_error_policy, DecodeErrorPolicy::Abort);
    }

    #[test]
    fn test_builtin_plugins_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let trace = dir.path().join("trace.jsonl");
        std::fs::write(
            &trace,
            concat!(
                r#"{"ecu_id":"E1","apid":"DLTD","ctid":"INTM","payload":["Daemon launched. Starting to output traces..."]}"#,
                "\n",
                r#"{"ecu_id":"E1","apid":"SYS","ctid":"JOUR","payload":["[42]: /usr/bin/app: error while loading shared libraries: libx.so: cannot open shared object file"]}"#,
                "\n",
                r#"{"ecu_id":"E1","apid":"MON","ctid":"MEMS","tmsp":3.5,"payload":["MemAvailable: 2048MB"]}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut catalog = PluginCatalog::new();
        plugins::register_builtin(&mut catalog);
        let env = PluginEnv::new(dir.path().join("extracted_files"));
        let registry = PluginRegistry::build_from_candidates(
            catalog.instantiate(&Selection::all(), &env).unwrap(),
        );
        let report = Analyser::new(registry).run(TraceSource::from_paths([&trace]));

        let state_of = |name: &str| report.results_for(name).next().map(|r| r.state);
        assert_eq!(state_of("ContextPlugin"), Some(ResultState::Success));
        assert_eq!(state_of("SysErrorPlugin"), Some(ResultState::Failure));
        assert_eq!(state_of("ExtractFilesPlugin"), Some(ResultState::Success));
        assert_eq!(state_of("SysmemPlugin"), Some(ResultState::Success));
        assert_eq!(report.exit_code(), 1);
        assert!(dir.path().join("extracted_files/sysmem_report.csv").exists());
    }
}
