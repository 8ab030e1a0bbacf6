use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "manualqa", about = "Ask questions about motorcycle manuals")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild the vector index from the manuals directory.
    Ingest {
        #[arg(long)]
        manuals: Option<String>,
        #[arg(long)]
        index: Option<String>,
        #[arg(long, default_value = "*.pdf")]
        pattern: String,
    },
    /// Ask a single question against the index.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List the manuals present in the index.
    Sources {
        #[arg(long)]
        index: Option<String>,
    },
}
