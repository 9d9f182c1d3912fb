use clap::{Args, Parser, Subcommand};
use shelf_core::export::ExportFormat;
use shelf_core::library::query::SortKey;
use shelf_core::library::{Rating, ReadingStatus};
use shelf_core::persistence::DEFAULT_LIBRARY_KEY;
use shelf_core::resolver::{llm, open_library};
use std::path::PathBuf;

/// Keep track of your books by scanning their barcodes.
#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by all subcommands. Each of them can also be given through the environment or a
/// `.env` file.
#[non_exhaustive]
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Directory holding the local database and saved login.
    #[arg(long, global = true, env = "SHELF_HOME")]
    pub home: Option<PathBuf>,

    /// Local SQLite database, defaults to `library.db` inside the home directory.
    #[arg(long, global = true, env = "SHELF_DB")]
    pub db: Option<PathBuf>,

    /// Name under which the library is stored.
    #[arg(long, global = true, env = "SHELF_LIBRARY", default_value = DEFAULT_LIBRARY_KEY)]
    pub library: String,

    /// Sync server to use instead of the saved one.
    #[arg(long, global = true, env = "SHELF_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// API key of the model fallback. Without it only Open Library is asked.
    #[arg(long, global = true, env = "SHELF_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, global = true, env = "SHELF_LLM_BASE_URL", default_value = llm::DEFAULT_BASE_URL)]
    pub llm_base_url: String,

    /// Models to try in order, comma-separated.
    #[arg(long, global = true, env = "SHELF_LLM_MODELS", value_delimiter = ',')]
    pub llm_models: Vec<String>,

    #[arg(
        long,
        global = true,
        env = "SHELF_OPEN_LIBRARY_URL",
        default_value = open_library::DEFAULT_BASE_URL
    )]
    pub open_library_url: String,

    /// Quiet period after a scanned code was handled, in milliseconds.
    #[arg(long, global = true, env = "SHELF_SCAN_COOLDOWN_MS", default_value_t = 1500)]
    pub scan_cooldown_ms: u64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read decoded barcodes from stdin, one per line, and add the books they name.
    Scan,

    /// Look up an ISBN without adding it.
    Lookup { isbn: String },

    /// Look up an ISBN and add the book.
    Add { isbn: String },

    /// Add a book by hand, without looking anything up.
    AddManual(ManualArgs),

    /// List books, newest first unless sorted otherwise.
    List(ListArgs),

    /// Show everything known about one book.
    Show { isbn: String },

    /// Set the reading status of a book.
    Status { isbn: String, status: ReadingStatus },

    /// Rate a book from 1 to 5 stars.
    Rate {
        isbn: String,
        #[arg(value_parser = parse_rating, required_unless_present = "clear")]
        rating: Option<Rating>,
        /// Remove the rating instead.
        #[arg(long, conflicts_with = "rating")]
        clear: bool,
    },

    /// Replace the notes of a book.
    Note { isbn: String, text: String },

    /// Toggle whether a book is a favorite.
    Favorite { isbn: String },

    /// Remove a book.
    Delete { isbn: String },

    /// Remove every book.
    Clear {
        /// Required, as this cannot be undone.
        #[arg(long)]
        yes: bool,
    },

    /// Write the library to a file.
    Export {
        path: PathBuf,
        /// Taken from the file extension if omitted.
        #[arg(long)]
        format: Option<ExportFormat>,
    },

    /// Read books from an export. Books already in the library are kept.
    Import {
        path: PathBuf,
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Replace the library instead of merging into it.
        #[arg(long)]
        replace: bool,
    },

    /// Summarize the library.
    Stats,

    /// Store the library on a sync server from now on.
    Login {
        /// Base URL of the server.
        url: String,
        #[arg(long, short)]
        username: String,
        #[arg(long, short, env = "SHELF_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the saved login and go back to the local database.
    Logout,
}

#[non_exhaustive]
#[derive(Debug, Clone, Args)]
pub struct ManualArgs {
    #[arg(long)]
    pub title: String,
    /// May be repeated.
    #[arg(long = "author")]
    pub authors: Vec<String>,
    #[arg(long)]
    pub isbn: Option<String>,
    /// May be repeated.
    #[arg(long = "genre")]
    pub genres: Vec<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "")]
    pub cover_url: String,
    #[arg(long, default_value_t = 0)]
    pub pages: u32,
    #[arg(long, default_value = "unread")]
    pub status: ReadingStatus,
    #[arg(long)]
    pub publisher: Option<String>,
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub series: Option<String>,
    #[arg(long)]
    pub series_order: Option<f32>,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<ReadingStatus>,
    #[arg(long)]
    pub genre: Option<String>,
    /// Part of an author's name.
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub favorites: bool,
    #[arg(long, value_parser = parse_rating)]
    pub min_rating: Option<Rating>,
    /// Searches titles, authors and ISBNs.
    #[arg(long)]
    pub search: Option<String>,
    /// One of date-added, title, author, rating, pages.
    #[arg(long, default_value = "date-added")]
    pub sort: SortKey,
    #[arg(long)]
    pub reverse: bool,
}

fn parse_rating(value: &str) -> Result<Rating, String> {
    let stars: u8 = value
        .trim()
        .parse()
        .map_err(|_error| format!("`{value}` is not a number"))?;
    Rating::new(stars).map_err(|error| error.to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rate_and_status() {
        let cli = Cli::try_parse_from(["shelf", "rate", "9780140449136", "4"]).unwrap();
        match cli.command {
            Command::Rate {
                isbn,
                rating,
                clear,
            } => {
                assert_eq!(isbn, "9780140449136");
                assert_eq!(rating, Some(Rating::new(4).unwrap()));
                assert!(!clear);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["shelf", "status", "9780140449136", "Reading"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status {
                status: ReadingStatus::Reading,
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_rating() {
        assert!(Cli::try_parse_from(["shelf", "rate", "9780140449136", "6"]).is_err());
        assert!(Cli::try_parse_from(["shelf", "rate", "9780140449136"]).is_err());
        assert!(Cli::try_parse_from(["shelf", "rate", "9780140449136", "--clear"]).is_ok());
    }

    #[test]
    fn list_filters_and_global_options() {
        let cli = Cli::try_parse_from([
            "shelf",
            "list",
            "--status",
            "read",
            "--sort",
            "title",
            "--favorites",
            "--library",
            "shared",
            "--llm-models",
            "a,b",
        ])
        .unwrap();
        assert_eq!(cli.settings.library, "shared");
        assert_eq!(cli.settings.llm_models, vec!["a", "b"]);
        match cli.command {
            Command::List(args) => {
                assert_eq!(args.status, Some(ReadingStatus::Read));
                assert_eq!(args.sort, SortKey::Title);
                assert!(args.favorites);
                assert!(!args.reverse);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn manual_entry_takes_repeated_authors() {
        let cli = Cli::try_parse_from([
            "shelf",
            "add-manual",
            "--title",
            "Good Omens",
            "--author",
            "Terry Pratchett",
            "--author",
            "Neil Gaiman",
            "--pages",
            "412",
        ])
        .unwrap();
        match cli.command {
            Command::AddManual(args) => {
                assert_eq!(args.authors, vec!["Terry Pratchett", "Neil Gaiman"]);
                assert_eq!(args.pages, 412);
                assert_eq!(args.status, ReadingStatus::Unread);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn export_format_is_optional() {
        let cli = Cli::try_parse_from(["shelf", "export", "out.txt", "--format", "csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Export {
                format: Some(ExportFormat::Csv),
                ..
            }
        ));
    }
}
