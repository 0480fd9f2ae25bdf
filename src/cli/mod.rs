//! CLI module for the command cache
//!
//! Each subcommand loads configuration, initializes the cache, runs one
//! operation, prints the result as JSON and shuts the cache down.

mod commands;

pub use commands::run;

use clap::{Parser, Subcommand};

/// Semantic command cache for smart-home utterances
#[derive(Parser)]
#[command(name = "command-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Look up a cached resolution for an utterance
    Lookup {
        /// The utterance as spoken
        query: String,
    },

    /// Offer a resolved command to the cache
    Store {
        /// The utterance as spoken
        query: String,

        /// Resolution as JSON: {"intent": {...}, "entity_ids": [...]}
        #[arg(long)]
        resolution: String,
    },

    /// Show entry counts
    Summary,

    /// Show lookup statistics
    Stats,

    /// Drop all learned entries, keeping anchors
    Invalidate,
}
