//! Command-line argument definitions (§6): the four operating modes and the
//! flags the original `enhanced_document_processor.py` argparse block
//! exposed, plus the `--mode=cli` operational subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Document pipeline: worker, read API, telemetry scheduler, and operational CLI")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Operating mode
    #[arg(long, value_enum, default_value = "worker")]
    pub mode: Mode,

    /// Configuration file path (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ollama/local model name to use for inference
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL for an Ollama-compatible (OpenAI chat-completions) endpoint
    #[arg(long)]
    pub ollama_base: Option<String>,

    /// Thread count for the local llama.cpp backend
    #[arg(long)]
    pub threads: Option<u32>,

    /// Context size for the model
    #[arg(long)]
    pub ctx_size: Option<u32>,

    /// Batch size for job dequeues
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Maximum number of jobs processed concurrently
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Assumed compute cost, dollars per hour, for budget accounting
    #[arg(long)]
    pub cost_per_hour: Option<f64>,

    /// Maximum cumulative compute budget before a graceful shutdown
    #[arg(long)]
    pub max_budget: Option<f64>,

    /// Seconds of no dequeued work before the worker shuts down
    #[arg(long)]
    pub idle_shutdown: Option<u64>,

    /// Process a single file and exit instead of entering the mode's loop
    #[arg(long = "single-file")]
    pub single_file: Option<PathBuf>,

    /// Local path for object storage and temporary document files
    #[arg(long = "storage-path")]
    pub storage_path: Option<PathBuf>,

    /// Redis connection string for the coordination store
    #[arg(long = "redis-url")]
    pub redis_url: Option<String>,

    /// Object storage replication factor
    #[arg(long)]
    pub replication: Option<usize>,

    /// Local storage capacity, in gigabytes, advertised to the storage node registry
    #[arg(long = "storage-capacity")]
    pub storage_capacity: Option<f64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operational subcommand, required when `--mode=cli`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Worker,
    Api,
    Cli,
    Telemetry,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check adapter connectivity
    Health,
    /// Read the graph directly
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },
    /// Write a graph snapshot to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Enqueue a document file for worker processing
    Enqueue {
        /// Path to the document to process
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum QueryCommands {
    /// List nodes, optionally filtered by type and/or label substring
    Nodes {
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },
    /// BFS out from a node to the given depth
    Subgraph {
        node_id: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
}
