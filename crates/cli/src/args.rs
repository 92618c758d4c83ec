use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parade")]
#[command(version)]
#[command(about = "Run Lighthouse against every page of a site and collect the scores", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit pages and write one row of scores per page
    Run(RunArgs),

    /// Serve audit requests on stdin/stdout. Started by `run` for each runner.
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Page URL to audit, or a file with one URL per line ("-" reads stdin)
    pub entry: String,

    /// Output file, .csv or .jsonl. Repeat to write several.
    /// Defaults to parade-data/<timestamp>/report.csv
    #[arg(short, long = "output", value_name = "FILE")]
    pub outputs: Vec<PathBuf>,

    /// Max audits running at once. Defaults to CPU count minus one.
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per-audit timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only audit paths matching this glob; repeatable. `*` matches one
    /// segment, `**` several. The entry page is always audited.
    #[arg(long = "include-path-glob", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Skip paths matching this glob; repeatable. Wins over includes.
    #[arg(long = "exclude-path-glob", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Audit engine executable
    #[arg(long, default_value = "lighthouse")]
    pub engine: String,

    /// Device to emulate
    #[arg(long, default_value = "mobile", value_parser = ["mobile", "desktop"])]
    pub form_factor: String,

    /// Comma-separated categories to run, e.g. performance,seo
    #[arg(long, value_delimiter = ',')]
    pub only_categories: Vec<String>,

    /// Chrome flag passed to the engine; repeatable. Replaces the defaults.
    #[arg(long = "chrome-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub chrome_flags: Vec<String>,

    /// Stop writing to an output after its first failure
    #[arg(long)]
    pub exclude_failed_outputs: bool,

    /// Preset: fast, balanced, thorough
    #[arg(long, default_value = "balanced", value_parser = ["fast", "balanced", "thorough"])]
    pub preset: String,

    /// Extra arguments passed to the engine verbatim (after `--`)
    #[arg(last = true)]
    pub engine_args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "parade",
            "-v",
            "run",
            "https://a.example/",
            "-o",
            "out.csv",
            "-o",
            "out.jsonl",
            "--exclude-path-glob",
            "/admin/**",
            "--only-categories",
            "performance,seo",
            "--",
            "--throttling-method=provided",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.outputs.len(), 2);
        assert_eq!(args.exclude, ["/admin/**"]);
        assert_eq!(args.only_categories, ["performance", "seo"]);
        assert_eq!(args.engine_args, ["--throttling-method=provided"]);
        assert_eq!(args.preset, "balanced");
        assert_eq!(args.form_factor, "mobile");
    }

    #[test]
    fn test_worker_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["parade", "worker"]).unwrap();
        assert!(matches!(cli.command, Commands::Worker));
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("worker"));
    }

    #[test]
    fn test_rejects_unknown_preset() {
        assert!(Cli::try_parse_from(["parade", "run", "urls.txt", "--preset", "stealth"]).is_err());
    }
}
