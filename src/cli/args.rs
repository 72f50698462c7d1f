//! CLI argument definitions (clap)

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// forge - multi-phase UI generation with versioned artifacts
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(about = "Turn UI requests into runnable pages through a cancellable multi-phase pipeline")]
#[command(long_about = r#"
forge plans, fabricates and assembles single-file UI pages with a generative model.
Every finished build is committed as a new version of the document; any earlier
version can be restored without losing history.

EXAMPLES:
  # Interactive session on the "home" document
  forge chat

  # One-shot build, code to stdout
  forge generate "A login card with remember-me and a submit button"

  # Force the hierarchical build and write the result to a file
  forge generate "Dashboard with three charts" --branch hierarchical --output dash.html

  # Offline demo with canned responses
  forge chat --llm-provider scripted

  # Show the effective configuration and where each value came from
  forge config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults.
  The config file is --config, else $FORGE_HOME/config.toml, else the nearest
  .forge/config.toml found searching upward from the current directory.

CHAT COMMANDS:
  :history        list saved versions, newest first
  :restore N      make version N current again
  :show           print the current code
  :export PATH    write the current version to PATH
  :quit           leave the session
  Ctrl-C cancels the generation in flight; a new line while one runs replaces it.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model for planning, architecture, assembly and refinement
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Faster model for per-component workers
    #[arg(long, global = true)]
    pub worker_model: Option<String>,

    /// Default flow when a request has no branch override
    #[arg(long, global = true, value_parser = ["flat", "hierarchical"])]
    pub flow: Option<String>,

    /// Model gateway: gemini or scripted (offline canned responses)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// Enable the remote context retrieval endpoint
    #[arg(long, global = true, overrides_with = "no_retrieval")]
    pub retrieval: bool,

    /// Disable remote context retrieval (static reference only)
    #[arg(long, global = true, overrides_with = "retrieval")]
    pub no_retrieval: bool,

    /// Retrieval endpoint URL
    #[arg(long, global = true)]
    pub retrieval_endpoint: Option<String>,

    /// Append-only artifact log; history is memory-only without it
    #[arg(long, global = true)]
    pub artifacts_log: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive session on one document
    ///
    /// EXAMPLES:
    ///   forge chat
    ///   forge chat --document pricing --name "Pricing page"
    Chat {
        /// Document id
        #[arg(long, default_value = "home")]
        document: String,

        /// Display name used when the document is created
        #[arg(long)]
        name: Option<String>,
    },

    /// Run one generation and print the committed code
    ///
    /// EXAMPLES:
    ///   forge generate "A todo list with filters"
    ///   echo "A pricing table" | forge generate --output pricing.html
    Generate {
        /// Request text; read from stdin when omitted
        request: Option<String>,

        /// Document id
        #[arg(long, default_value = "home")]
        document: String,

        /// Phase sequence override
        #[arg(long, value_parser = ["refine", "hierarchical", "direct"])]
        branch: Option<String>,

        /// File holding a base64-encoded reference image
        #[arg(long, requires = "image_mime")]
        image_base64: Option<PathBuf>,

        /// MIME type of the reference image (e.g. image/png)
        #[arg(long)]
        image_mime: Option<String>,

        /// Write the code here instead of stdout
        #[arg(long)]
        output: Option<Utf8PathBuf>,

        /// Print the outcome and document snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
