//! CLI command definitions and parsing
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sanad",
    version,
    about = "Semantic document search and question answering",
    long_about = "Sanad stores text documents, indexes them with a local embedding model and \
                  answers questions from the most relevant ones, using a language model when one \
                  is available and an extractive summary otherwise."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/sanad/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Document body given inline or read from a file
#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ContentSource {
    /// Document content
    #[arg(long)]
    pub content: Option<String>,

    /// Read document content from a file
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a document
    Add {
        /// Document title
        #[arg(short, long)]
        title: String,

        #[command(flatten)]
        source: ContentSource,
    },

    /// Update a document's title and/or content
    Update {
        /// Document id
        id: i64,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        #[command(flatten)]
        source: ContentSource,
    },

    /// Delete a document
    Delete {
        /// Document id
        id: i64,
    },

    /// List all documents, newest first
    List {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a single document
    Show {
        /// Document id
        id: i64,

        /// Show result in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Search documents by meaning (falls back to substring match)
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about the stored documents
    Ask {
        /// Question to ask
        question: String,

        /// Restrict the answer to these document ids (repeatable)
        #[arg(short, long = "doc", value_name = "ID")]
        documents: Vec<i64>,

        /// Show the answer in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Re-embed every document and rebuild the vector index
    RebuildIndex,

    /// Show storage, index and backend status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_doc_ids() {
        let cli = Cli::try_parse_from(["sanad", "ask", "what?", "--doc", "3", "--doc", "7"]).unwrap();
        match cli.command {
            Commands::Ask { documents, .. } => assert_eq!(documents, vec![3, 7]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_content_and_file_conflict() {
        let result = Cli::try_parse_from([
            "sanad", "add", "--title", "t", "--content", "c", "--file", "f.txt",
        ]);
        assert!(result.is_err());
    }
}
