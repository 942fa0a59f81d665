//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bookfetch_core::transport::DEFAULT_MAX_RETRIES;

/// Fetch e-books from an authenticated learning platform.
///
/// Log in once (or import browser cookies), then download books by
/// identifier. Downloads are atomic: an interrupted transfer never leaves a
/// partial file behind.
#[derive(Parser, Debug)]
#[command(name = "bookfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Sustained request rate in requests per second (0 to disable)
    #[arg(short = 'l', long, global = true, default_value_t = 1.0)]
    pub rate_limit: f64,

    /// Service base URL (scheme and host)
    #[arg(long, global = true, env = "BOOKFETCH_BASE_URL", hide = true)]
    pub base_url: Option<String>,

    /// Session file location (defaults to the per-user config directory)
    #[arg(long, global = true, env = "BOOKFETCH_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with email and password
    ///
    /// Examples:
    ///   bookfetch login --username me@example.com
    ///   BOOKFETCH_PASSWORD=... bookfetch login -u me@example.com
    Login {
        /// Account email or username
        #[arg(short, long, env = "BOOKFETCH_USERNAME")]
        username: String,

        /// Account password
        #[arg(short, long, env = "BOOKFETCH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Build a session from exported browser cookies
    ///
    /// Accepts a Netscape cookies.txt file or a JSON export. Use `-` to read
    /// from stdin.
    ImportCookies {
        /// Cookie file path, or `-` for stdin
        source: String,
    },

    /// Delete the saved session
    Logout,

    /// Show whether a valid session is saved
    Status,

    /// Download a book (EPUB, falling back to PDF)
    Download {
        /// Book identifier (ISBN or archive id)
        id: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Do not show a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List a book's chapters
    Toc {
        /// Book identifier used by the TOC endpoint
        id: String,

        /// Book id used in the reader's navigation path
        book_id: String,
    },

    /// Search titles
    Search {
        /// Search terms
        query: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
}

impl Command {
    /// Subcommand name as typed, for logging without argument values.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::ImportCookies { .. } => "import-cookies",
            Self::Logout => "logout",
            Self::Status => "status",
            Self::Download { .. } => "download",
            Self::Toc { .. } => "toc",
            Self::Search { .. } => "search",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_status_parses_with_defaults() {
        let args = Args::try_parse_from(["bookfetch", "status"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.max_retries, 3);
        assert!((args.rate_limit - 1.0).abs() < f64::EPSILON);
        assert!(matches!(args.command, Command::Status));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["bookfetch", "logout", "-vv", "--max-retries", "0"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.max_retries, 0);
    }

    #[test]
    fn test_cli_max_retries_range() {
        let result = Args::try_parse_from(["bookfetch", "--max-retries", "11", "status"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_download_args() {
        let args =
            Args::try_parse_from(["bookfetch", "download", "9781098", "--out", "books"]).unwrap();
        match args.command {
            Command::Download {
                id,
                out,
                no_progress,
            } => {
                assert_eq!(id, "9781098");
                assert_eq!(out, PathBuf::from("books"));
                assert!(!no_progress);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["bookfetch"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_search_limit_default() {
        let args = Args::try_parse_from(["bookfetch", "search", "rust"]).unwrap();
        assert!(matches!(args.command, Command::Search { limit: 5, .. }));
        assert_eq!(args.command.name(), "search");
    }
}
