mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Ingest {
            manuals,
            index,
            pattern,
        } => commands::ingest(manuals, index, pattern),
        Command::Ask { question, top_k } => commands::ask(question, top_k),
        Command::Sources { index } => commands::sources(index),
    }
}
