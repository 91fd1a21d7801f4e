pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lectio")]
#[command(about = "Read the Bible with Catechism cross-references", long_about = None)]
pub struct Cli {
    /// Serve data from a JSON dataset instead of the remote endpoint
    #[arg(long, value_name = "FILE", global = true)]
    pub offline: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter when RUST_LOG is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "lectio=warn",
            1 => "lectio=debug",
            _ => "lectio=trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the testaments
    Testaments,
    /// List the genres of a testament
    Genres {
        /// Testament slug
        testament: String,
    },
    /// List the books of a genre
    Books {
        /// Genre slug
        genre: String,
    },
    /// List the available Bible versions
    Versions,
    /// Show a book and its chapters
    Book {
        /// Book slug
        slug: String,
        /// Version code (default: configured version)
        #[arg(long)]
        version: Option<String>,
    },
    /// Print a chapter with its Catechism references
    Read {
        /// Book slug
        book: String,
        /// Chapter number (default: first chapter)
        chapter: Option<u32>,
        /// Version code (default: configured version)
        #[arg(long)]
        version: Option<String>,
        /// Print as running text instead of verse by verse
        #[arg(long)]
        paragraph: bool,
    },
    /// Resolve a reader path like /ancien-testament/pentateuque/gen/1
    Open {
        path: String,
    },
    /// Warm the cache for a book and show what was loaded
    Prefetch {
        /// Book slug
        slug: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_arguments() {
        let cli = Cli::parse_from([
            "lectio",
            "read",
            "gen",
            "3",
            "--version",
            "JER",
            "--paragraph",
        ]);
        match cli.command {
            Commands::Read {
                book,
                chapter,
                version,
                paragraph,
            } => {
                assert_eq!(book, "gen");
                assert_eq!(chapter, Some(3));
                assert_eq!(version.as_deref(), Some("JER"));
                assert!(paragraph);
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["lectio", "testaments", "--offline", "bible.json", "-vv"]);
        assert_eq!(cli.offline, Some(PathBuf::from("bible.json")));
        assert_eq!(cli.log_filter(), "lectio=trace");
    }

    #[test]
    fn test_chapter_must_be_a_number() {
        assert!(Cli::try_parse_from(["lectio", "read", "gen", "one"]).is_err());
    }
}
