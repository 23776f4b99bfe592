//! tgt CLI: driving adapter for the tgt targeting engine.
//!
//! Subcommands:
//! - `check <target>...`: resolve a target to minion IDs
//! - `explain <target>...`: show what every node of the expression matched
//! - `parse <target>...`: print the parsed expression and its atoms
//! - `nodegroups [name]`: print configured nodegroups and their expansion
//!
//! The fleet comes either from a YAML description (`--fleet`) or from a
//! master's PKI directory and filesystem cache (`--pki-dir`, `--cachedir`).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tgt::{
    parse_compound, parse_words, Atom, CheckOptions, Expr, FsCache, MatchResult, Nodegroups, Opts,
    PkiRegistry, TargetArg, TargetChecker, TargetType, DEFAULT_TARGET_DELIM,
};
use tgt_test::Fleet;

#[derive(Debug, Parser)]
#[command(name = "tgt", version)]
#[command(about = "Resolve compound minion targets", long_about = None)]
struct Cli {
    /// Master options file (YAML, or JSON by extension)
    #[arg(long, global = true, env = "TGT_OPTS")]
    opts: Option<PathBuf>,

    /// Fleet description (YAML) used instead of the PKI directory and cache
    #[arg(long, global = true)]
    fleet: Option<PathBuf>,

    /// Cache directory, overriding `cachedir` from the options file
    #[arg(long, global = true)]
    cachedir: Option<PathBuf>,

    /// PKI directory, overriding `pki_dir` from the options file
    #[arg(long, global = true)]
    pki_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a target to minion IDs
    Check(TargetArgs),
    /// Resolve a target and show what every node matched
    Explain(TargetArgs),
    /// Parse a compound expression without evaluating it
    Parse {
        /// Expression, as one argument or as separate words
        #[arg(required = true, num_args = 1..)]
        target: Vec<String>,
    },
    /// Print configured nodegroups and their expansion
    Nodegroups {
        /// Only this nodegroup
        name: Option<String>,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Target, as one argument or as separate words
    #[arg(required = true, num_args = 1..)]
    target: Vec<String>,

    /// How to interpret the target
    #[arg(short = 't', long, default_value = "compound")]
    tgt_type: TargetType,

    /// Key-path delimiter for grain and pillar target types
    #[arg(short, long, default_value_t = DEFAULT_TARGET_DELIM)]
    delimiter: char,

    /// Only match registered minions
    #[arg(long)]
    no_greedy: bool,

    /// Give up after this many milliseconds and report an incomplete result
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl TargetArgs {
    fn target(&self) -> TargetArg {
        target_arg(&self.target)
    }

    fn options(&self) -> CheckOptions {
        CheckOptions {
            delimiter: self.delimiter,
            greedy: !self.no_greedy,
            cancel: None,
            deadline: self
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Check(args) => cmd_check(&cli, args),
        Commands::Explain(args) => cmd_explain(&cli, args),
        Commands::Parse { target } => cmd_parse(&cli, target),
        Commands::Nodegroups { name } => cmd_nodegroups(&cli, name.as_deref()),
    };

    match result {
        Ok(out) => print!("{out}"),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// `TGT_LOG` (or `RUST_LOG`) filter, text or JSON lines on stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("TGT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("tgt=info"));
    let json = std::env::var("TGT_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_check(cli: &Cli, args: &TargetArgs) -> Result<String, String> {
    let checker = build_checker(cli)?;
    let result = checker
        .check_minions_with(args.target(), args.tgt_type, &args.options())
        .map_err(|e| e.to_string())?;
    if cli.json {
        return to_json(&result);
    }
    report_gaps(&result);
    Ok(render_minions(&result))
}

fn cmd_explain(cli: &Cli, args: &TargetArgs) -> Result<String, String> {
    let checker = build_checker(cli)?;
    let (result, trace) = checker
        .explain(args.target(), args.tgt_type, &args.options())
        .map_err(|e| e.to_string())?;
    if cli.json {
        return to_json(&serde_json::json!({ "result": result, "trace": trace }));
    }
    report_gaps(&result);
    Ok(trace.to_string())
}

fn cmd_parse(cli: &Cli, target: &[String]) -> Result<String, String> {
    let expr = match target_arg(target) {
        TargetArg::Expr(s) => parse_compound(&s),
        TargetArg::Words(w) => parse_words(&w),
    }
    .map_err(|e| e.to_string())?;

    if cli.json {
        let atoms: Vec<serde_json::Value> = expr.atoms().into_iter().map(atom_json).collect();
        return to_json(&serde_json::json!({
            "expr": expr.to_string(),
            "depth": expr.depth(),
            "atoms": atoms,
        }));
    }
    Ok(render_parse(&expr))
}

fn cmd_nodegroups(cli: &Cli, only: Option<&str>) -> Result<String, String> {
    let opts = load_opts(cli)?;
    let groups = Nodegroups::new(&opts.nodegroups);
    let names: Vec<&String> = opts
        .nodegroups
        .keys()
        .filter(|n| only.map_or(true, |o| o == n.as_str()))
        .collect();
    if let Some(name) = only.filter(|_| names.is_empty()) {
        return Err(format!("unknown nodegroup \"{name}\""));
    }

    let mut rows = Vec::new();
    for name in names {
        let expansion = groups
            .expand(name)
            .map_err(|e| format!("nodegroup \"{name}\": {e}"))?
            .map(|e| e.to_string());
        rows.push((name.clone(), expansion));
    }

    if cli.json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(name, exp)| (name, exp.map_or(serde_json::Value::Null, Into::into)))
            .collect();
        return to_json(&map);
    }
    Ok(rows
        .into_iter()
        .map(|(name, exp)| format!("{name}: {}\n", exp.as_deref().unwrap_or("(empty)")))
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Checker assembly (composition root)
// ═══════════════════════════════════════════════════════════════════════════════

fn load_opts(cli: &Cli) -> Result<Opts, String> {
    let mut opts = match &cli.opts {
        Some(path) => Opts::load(path).map_err(|e| e.to_string())?,
        None => Opts::default(),
    };
    if let Some(dir) = &cli.cachedir {
        opts.cachedir = Some(dir.clone());
    }
    if let Some(dir) = &cli.pki_dir {
        opts.pki_dir = Some(dir.clone());
    }
    Ok(opts)
}

fn build_checker(cli: &Cli) -> Result<TargetChecker, String> {
    let opts = load_opts(cli)?;

    if let Some(path) = &cli.fleet {
        let fleet = Fleet::load(path).map_err(|e| e.to_string())?;
        tracing::debug!(path = %path.display(), minions = fleet.minions.len(), "loaded fleet");
        return fleet.checker(opts).map_err(|e| e.to_string());
    }

    let (Some(pki_dir), Some(cachedir)) = (opts.pki_dir.clone(), opts.cachedir.clone()) else {
        return Err("no fleet: pass --fleet, or --pki-dir and --cachedir (or set them in --opts)".into());
    };
    let registry = PkiRegistry::new(&pki_dir, &opts.transport);
    tracing::debug!(dir = %registry.dir().display(), cache = %cachedir.display(), "using master stores");
    Ok(TargetChecker::new(
        opts,
        Arc::new(registry),
        Arc::new(FsCache::new(cachedir)),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════════

/// One word is a target string; several are pre-split words.
fn target_arg(words: &[String]) -> TargetArg {
    match words {
        [one] => TargetArg::Expr(one.clone()),
        many => TargetArg::Words(many.to_vec()),
    }
}

fn report_gaps(result: &MatchResult) {
    if !result.missing.is_empty() {
        let missing: Vec<&str> = result.missing.iter().map(String::as_str).collect();
        eprintln!("missing: {}", missing.join(", "));
    }
    if result.incomplete {
        eprintln!("warning: result is incomplete");
    }
}

fn render_minions(result: &MatchResult) -> String {
    result.minions.iter().map(|id| format!("{id}\n")).collect()
}

fn render_parse(expr: &Expr) -> String {
    let mut out = format!("{expr}\n");
    for atom in expr.atoms() {
        let line = match atom {
            Atom::Target(t) if t.engine.takes_delimiter() => {
                format!("  {atom}  {} (delimiter '{}')\n", t.engine.name(), t.delimiter)
            }
            Atom::Target(t) => format!("  {atom}  {}\n", t.engine.name()),
            Atom::Unknown(_) => format!("  {atom}  unknown\n"),
        };
        out.push_str(&line);
    }
    out
}

fn atom_json(atom: &Atom) -> serde_json::Value {
    match atom {
        Atom::Target(t) => serde_json::json!({
            "word": atom.to_string(),
            "engine": t.engine.name(),
            "delimiter": t.delimiter.to_string(),
            "pattern": t.pattern,
        }),
        Atom::Unknown(w) => serde_json::json!({ "word": w, "engine": null }),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value)
        .map(|s| s + "\n")
        .map_err(|e| format!("JSON encode error: {e}"))
}
