use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "fieldqueue")]
#[command(about = "Durable offline queue for state-changing HTTP requests")]
#[command(long_about = "fieldqueue - offline action queue

Saves write requests (POST, PUT, PATCH, DELETE) that could not reach the
server and replays them, oldest first, once connectivity returns. Actions
that keep being rejected are dropped after a bounded number of attempts.

QUICK START:
  fieldqueue send --method POST --url https://api.example.com/notes --body '{}'
  fieldqueue list                 Show queued actions, oldest first
  fieldqueue replay               Replay everything once
  fieldqueue watch                Replay periodically until Ctrl-C

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  fieldqueue <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output (default),
    /// or 'json' for machine-readable output suitable for scripting.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Queue database file (overrides the config file)
    #[arg(long, global = true, env = "FIELDQUEUE_DB")]
    pub db: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a request for later replay without sending it
    ///
    /// # Examples
    ///
    ///   fieldqueue enqueue --method POST --url /api/units/7/status --body '{"status":"on scene"}'
    ///   fieldqueue enqueue -X DELETE -u /api/notes/42 -H "Authorization: Bearer abc"
    #[command(alias = "add")]
    Enqueue(RequestArgs),

    /// Send a request now, queueing it if the server cannot be reached
    ///
    /// A response of any status is printed and nothing is queued. Only a
    /// transport failure (DNS, refused connection, timeout) queues the request.
    Send(SendArgs),

    /// List queued actions, oldest first
    #[command(alias = "ls")]
    List {
        /// Show at most this many actions
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show a single queued action
    Show {
        /// Action ID
        id: String,
    },

    /// Remove a queued action without replaying it
    #[command(alias = "rm")]
    Remove {
        /// Action ID
        id: String,
    },

    /// Print the number of queued actions
    Size,

    /// Show queue statistics
    Status,

    /// Replay every queued action once
    ///
    /// Successful actions are removed. Rejected actions have their retry
    /// count raised and are dropped once it reaches the limit. Actions whose
    /// outcome is unknown (no response, timeout) are left untouched.
    Replay(ReplayArgs),

    /// Replay periodically until interrupted
    ///
    /// Runs a pass immediately, then every --interval seconds. Stops on Ctrl-C.
    Watch(WatchArgs),

    /// Remove every queued action
    Clear {
        /// Required; queued actions are discarded without replay
        #[arg(long)]
        force: bool,
    },

    /// Write a default config file
    ///
    /// Creates ~/.fieldqueue/config.yaml with every setting at its default.
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    ///
    /// Example: fieldqueue completions bash > ~/.bash_completion.d/fieldqueue
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Description of a request to queue or send.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// HTTP method (POST, PUT, PATCH, DELETE, ...)
    #[arg(short = 'X', long, default_value = "POST")]
    pub method: String,

    /// Request URL, absolute or relative to the configured base URL
    #[arg(short, long)]
    pub url: String,

    /// Header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body, sent verbatim
    #[arg(short, long)]
    pub body: Option<String>,
}

/// Arguments for `send`.
#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Base URL for relative request URLs
    #[arg(long)]
    pub base_url: Option<String>,

    /// Skip the attempt and queue straight away
    #[arg(long)]
    pub offline: bool,
}

/// Arguments for `replay`.
#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Base URL for relative queued URLs
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-action delivery timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum explicit failures before an action is dropped
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for `watch`.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub replay: ReplayArgs,

    /// Seconds between passes
    #[arg(short, long)]
    pub interval: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_output_format_default() {
        let cli = Cli::try_parse_from(["fieldqueue", "size"]).unwrap();
        assert!(cli.output.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_output_format_json() {
        let cli = Cli::try_parse_from(["fieldqueue", "--output", "json", "list"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }

    #[test]
    fn test_cli_output_format_short_after_command() {
        let cli = Cli::try_parse_from(["fieldqueue", "list", "-o", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }

    #[test]
    fn test_cli_enqueue_command() {
        let cli = Cli::try_parse_from([
            "fieldqueue",
            "enqueue",
            "-X",
            "put",
            "--url",
            "/api/notes/1",
            "-H",
            "Content-Type: application/json",
            "-H",
            "X-Unit: 7",
            "--body",
            "{}",
        ])
        .unwrap();

        match cli.command {
            Commands::Enqueue(args) => {
                assert_eq!(args.method, "put");
                assert_eq!(args.url, "/api/notes/1");
                assert_eq!(args.headers.len(), 2);
                assert_eq!(args.body.as_deref(), Some("{}"));
            }
            _ => panic!("Expected Enqueue command"),
        }
    }

    #[test]
    fn test_cli_enqueue_defaults_to_post() {
        let cli = Cli::try_parse_from(["fieldqueue", "add", "-u", "/x"]).unwrap();
        match cli.command {
            Commands::Enqueue(args) => assert_eq!(args.method, "POST"),
            _ => panic!("Expected Enqueue command"),
        }
    }

    #[test]
    fn test_cli_send_offline() {
        let cli =
            Cli::try_parse_from(["fieldqueue", "send", "-u", "/x", "--offline", "--base-url", "http://h"])
                .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert!(args.offline);
                assert_eq!(args.base_url.as_deref(), Some("http://h"));
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_cli_watch_interval() {
        let cli =
            Cli::try_parse_from(["fieldqueue", "watch", "-i", "5", "--timeout", "2"]).unwrap();
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.interval, Some(5));
                assert_eq!(args.replay.timeout, Some(2));
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_db_flag() {
        let cli = Cli::try_parse_from(["fieldqueue", "--db", "/tmp/q.db", "size"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/q.db")));
    }

    #[test]
    fn test_cli_init_force() {
        let cli = Cli::try_parse_from(["fieldqueue", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Init { force } => assert!(force),
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_completions_rejects_unknown_shell() {
        assert!(Cli::try_parse_from(["fieldqueue", "completions", "tcsh"]).is_err());
    }
}
