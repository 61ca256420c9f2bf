//! Clap derive structures for the `sfos` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sfos -- script Sophos Firewall web admin sessions
#[derive(Debug, Parser)]
#[command(
    name = "sfos",
    version,
    about = "Run web admin requests against Sophos Firewalls from the command line",
    long_about = "Logs in to the SFOS web admin console the way a browser does, then\n\
        replays request templates (named commands) on that session.\n\n\
        Targets come from --hostname, named targets in the config file, or\n\
        YAML inventory files, and are processed concurrently.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Named target from the config file (repeatable)
    #[arg(long, short = 't', global = true)]
    pub target: Vec<String>,

    /// Firewall hostname or IP for a single ad-hoc target
    #[arg(long, short = 'H', env = "FW_HOSTNAME", global = true)]
    pub hostname: Option<String>,

    /// Web admin port
    #[arg(long, short = 'P', global = true)]
    pub port: Option<u16>,

    /// Admin username
    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    /// Admin password
    #[arg(long, env = "FW_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// YAML inventory file (repeatable)
    #[arg(long, short = 'i', global = true)]
    pub inventory: Vec<PathBuf>,

    /// Template directory searched before the built-in templates (repeatable)
    #[arg(long, global = true)]
    pub templates: Vec<PathBuf>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Talk plain HTTP instead of HTTPS (proxies, test fixtures)
    #[arg(long, global = true, hide = true)]
    pub plain_http: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Targets processed at once
    #[arg(long, short = 'j', global = true)]
    pub concurrency: Option<usize>,

    /// Output format
    #[arg(long, short = 'o', env = "SFOS_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and show device identity
    Info,

    /// Show licensed subscriptions
    #[command(alias = "subs")]
    Licenses,

    /// Send one named command
    Send(SendArgs),

    /// Run a script file of named commands
    Run(RunArgs),

    /// Stream a command's response body to disk
    #[command(alias = "dl")]
    Download(DownloadArgs),

    /// List available command templates
    Templates,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Command (template) name, e.g. HEARTBEAT_STATUS
    pub command: String,

    /// Request object defined in the template's `req_objects`
    #[arg(long)]
    pub object: Option<String>,

    /// JSON payload sent in the `json` field
    #[arg(long)]
    pub data: Option<String>,

    /// Variable for `{name}` placeholders (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    #[command(flatten)]
    pub save: SaveArgs,
}

/// Keep a JSON copy of the responses.
#[derive(Debug, Default, Args)]
pub struct SaveArgs {
    /// Also write the responses as JSON to this file (overwritten unless --append)
    #[arg(long = "out", short = 'w', value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Append to the --out file instead of replacing it
    #[arg(long, short = 'a', requires = "out")]
    pub append: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script file (JSON or YAML)
    pub script: PathBuf,

    /// Variable for `{name}` placeholders (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    #[command(flatten)]
    pub save: SaveArgs,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Command (template) name, e.g. DOWNLOAD_BACKUP
    pub command: String,

    /// Directory the files are written to
    #[arg(long, short = 'd', default_value = ".")]
    pub dest: PathBuf,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

/// Parse a `KEY=VALUE` pair.
fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn vars_split_on_first_equals() {
        assert_eq!(
            parse_var("filter=a=b").unwrap(),
            ("filter".to_owned(), "a=b".to_owned())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn repeatable_globals_collect() {
        let cli = Cli::try_parse_from([
            "sfos", "-t", "edge", "-t", "core", "-i", "a.yaml", "send", "HEARTBEAT_STATUS",
            "--var", "a=1", "--var", "b=2",
        ])
        .unwrap();
        assert_eq!(cli.global.target, ["edge", "core"]);
        assert_eq!(cli.global.inventory, [PathBuf::from("a.yaml")]);
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.vars.len(), 2);
        assert_eq!(args.save.out, None);
    }

    #[test]
    fn append_requires_out() {
        assert!(Cli::try_parse_from(["sfos", "send", "HEARTBEAT_STATUS", "--append"]).is_err());
        let cli = Cli::try_parse_from([
            "sfos", "run", "job.yaml", "-w", "results.json", "-a",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.save.out, Some(PathBuf::from("results.json")));
        assert!(args.save.append);
    }
}
