//! propnet command-line tools.
//!
//! Provides the `propnet` binary with two subcommands:
//! - `run` loads a port-graph JSON document, writes port values in order and
//!   prints every port's settled value as JSON.
//! - `laws` runs the join-law checker against a built-in join.
//!
//! Logging goes to stderr and is filtered by `PROPNET_LOG` (default `warn`).

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use propnet_interp::{
    check_builtin, GraphId, InterpreterConfig, LawCheckConfig, LawCheckResult, PortGraph,
    PortGraphStore, PortId, RuntimeError, Verdict,
};

/// Propagation network tools.
#[derive(Parser)]
#[command(name = "propnet", about = "Propagation network tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a port-graph document and print the settled port values.
    Run {
        /// Path to the port-graph JSON file.
        graph: PathBuf,

        /// Port writes as `port=json`, applied in order.
        #[arg(short, long = "set", value_name = "PORT=VALUE")]
        set: Vec<String>,

        /// Work-step bound per write (default: unbounded).
        #[arg(long, env = "PROPNET_MAX_STEPS")]
        max_steps: Option<usize>,

        /// Print the write trace of each propagation to stderr.
        #[arg(long)]
        trace: bool,
    },

    /// Check a built-in join for associativity, commutativity and idempotence.
    Laws {
        /// Join name: max, min, set_union, set_intersection, or, and, ordinal.
        join: String,

        /// Number of random rounds.
        #[arg(short, long, default_value_t = 100)]
        iterations: u32,

        /// Seed for the random rounds.
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() {
    let filter = EnvFilter::try_from_env("PROPNET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            graph,
            set,
            max_steps,
            trace,
        } => run_graph(&graph, &set, max_steps, trace),
        Commands::Laws {
            join,
            iterations,
            seed,
        } => run_laws(&join, iterations, seed),
    };
    process::exit(exit_code);
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = runtime error,
/// 2 = bad argument, 3 = I/O error.
fn run_graph(path: &Path, writes: &[String], max_steps: Option<usize>, trace: bool) -> i32 {
    let writes = match writes.iter().map(|w| parse_write(w)).collect::<Result<Vec<_>, _>>() {
        Ok(w) => w,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 2;
        }
    };

    let json = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return 3;
        }
    };
    let graph = match PortGraph::from_json(&json) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: invalid graph document '{}': {}", path.display(), e);
            return 3;
        }
    };

    let config = InterpreterConfig {
        trace_enabled: trace,
        max_steps,
    };
    let mut engine = propnet_interp::Engine::in_memory(config);
    let id = GraphId::new(path.display().to_string());
    if let Err(e) = engine.load(id.clone(), graph) {
        eprintln!("Error: {}", e);
        return 1;
    }

    for (port, value) in writes {
        match engine.set_port_value(&id, &port, value) {
            Ok(report) => {
                tracing::info!(port = %port, changed = report.changed.len(), "write settled");
                for entry in report.trace.iter().flatten() {
                    eprintln!(
                        "[{}] {} := {} (was {})",
                        entry.step, entry.port, entry.value, entry.previous
                    );
                }
            }
            Err(e @ RuntimeError::NonConvergent { .. }) => {
                eprintln!("Propagation did not settle: {}", e);
                return 1;
            }
            Err(e) => {
                eprintln!("Runtime error: {}", e);
                return 1;
            }
        }
    }

    let settled: serde_json::Map<String, Value> = match engine.store().graph(&id) {
        Ok(graph) => graph
            .ports()
            .map(|p| (p.name.to_string(), p.current_value.clone()))
            .collect(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    print_json(&Value::Object(settled));
    0
}

/// Execute the laws subcommand.
///
/// Returns exit code: 0 = every law held, at least up to contradiction,
/// 1 = violation found, 2 = unknown join.
fn run_laws(join: &str, iterations: u32, seed: u64) -> i32 {
    let config = LawCheckConfig {
        iterations,
        random_seed: seed,
        ..LawCheckConfig::default()
    };
    match check_builtin(join, config) {
        Ok(result) => {
            print_json(&serde_json::to_value(&result).unwrap_or(Value::Null));
            laws_exit_code(&result)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

fn laws_exit_code(result: &LawCheckResult) -> i32 {
    match result.verdict {
        Verdict::Holds => 0,
        Verdict::HoldsUpToContradiction => {
            eprintln!(
                "Note: join '{}' holds only up to contradiction ({} check(s) ended in differing contradictions)",
                result.join,
                result.violations.len()
            );
            0
        }
        Verdict::Violated => {
            eprintln!(
                "{} law violation(s) in join '{}'",
                result.violations.len(),
                result.join
            );
            1
        }
    }
}

/// Parse a `port=json` argument. A value that is not valid JSON is taken as
/// a string.
fn parse_write(arg: &str) -> Result<(PortId, Value), String> {
    let (port, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid write '{}', expected PORT=VALUE", arg))?;
    if port.is_empty() {
        return Err(format!("invalid write '{}', port name is empty", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((PortId::new(port), value))
}

fn print_json(value: &Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}
