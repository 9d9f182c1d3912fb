use crate::cli::{Command, ListArgs, ManualArgs};
use crate::errors::Error;
use crate::state::AppState;
use chrono::Utc;
use core::fmt::Write as _;
use futures::future::join_all;
use shelf_core::auth::Credentials;
use shelf_core::export::{self, ExportFormat};
use shelf_core::isbn;
use shelf_core::library::query::{LibraryQuery, LibraryStats};
use shelf_core::library::{BookRecord, LibraryStore, ManualEntry, ReadingStatus, SharedLibrary};
use shelf_core::persistence::StoreError;
use shelf_core::persistence::remote::RemoteBackend;
use shelf_core::resolver::Resolver;
use shelf_core::resolver::client::build_http_client;
use shelf_core::scan::{ScanOutcome, ScanSession};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::task::JoinHandle;
use tracing::{Instrument as _, info_span, instrument};

/// Runs one subcommand against the library of `state`.
pub async fn execute(command: Command, state: &mut AppState) -> Result<(), Error> {
    match command {
        Command::Scan => scan(state).await,
        Command::Lookup { isbn } => lookup(state, &isbn).await,
        Command::Add { isbn } => add(state, &isbn).await,
        Command::AddManual(args) => add_manual(state, args).await,
        Command::List(args) => list(state, &args).await,
        Command::Show { isbn } => show(state, &isbn).await,
        Command::Status { isbn, status } => {
            edit(state, &isbn, |library| library.set_status(&isbn, status)).await?;
            println!("{isbn} is now {status}");
            Ok(())
        }
        Command::Rate {
            isbn,
            rating,
            clear,
        } => {
            let rating = if clear { None } else { rating };
            edit(state, &isbn, |library| library.set_rating(&isbn, rating)).await?;
            match rating {
                Some(rating) => println!("Rated {isbn} {rating}"),
                None => println!("Removed the rating of {isbn}"),
            }
            Ok(())
        }
        Command::Note { isbn, text } => {
            edit(state, &isbn, |library| library.set_notes(&isbn, &text)).await?;
            println!("Updated the notes of {isbn}");
            Ok(())
        }
        Command::Favorite { isbn } => favorite(state, &isbn).await,
        Command::Delete { isbn } => {
            edit(state, &isbn, |library| library.delete(&isbn)).await?;
            println!("Removed {isbn}");
            Ok(())
        }
        Command::Clear { yes } => clear(state, yes).await,
        Command::Export { path, format } => export_library(state, &path, format).await,
        Command::Import {
            path,
            format,
            replace,
        } => import_library(state, &path, format, replace).await,
        Command::Stats => {
            let library = state.load_library().await?;
            print!("{}", stats_report(&LibraryStats::collect(&library)));
            let location = if state.is_remote() { "on the sync server" } else { "locally" };
            println!("Library `{}` is stored {location}", state.settings.library);
            Ok(())
        }
        Command::Login {
            url,
            username,
            password,
        } => login(state, &url, &username, &password).await,
        Command::Logout => logout(state).await,
    }
}

fn checked_isbn(raw: &str) -> Result<String, Error> {
    let candidate = isbn::normalize_candidate(raw);
    if isbn::is_valid(&candidate) {
        Ok(candidate)
    } else {
        Err(Error::InvalidIsbn(raw.to_owned()))
    }
}

/// Loads the library, applies `change` and saves the result. `change` returns whether the book was
/// found.
async fn edit<F>(state: &AppState, isbn: &str, change: F) -> Result<(), Error>
where
    F: FnOnce(&mut LibraryStore) -> bool,
{
    let mut library = state.load_library().await?;
    if !change(&mut library) {
        return Err(Error::UnknownBook(isbn.to_owned()));
    }
    state.save_library(&library).await
}

async fn resolve(state: &AppState, isbn: &str) -> Result<Option<BookRecord>, Error> {
    let resolver = Resolver::from_config(&state.settings.resolver_config())?;
    let span = info_span!("metadata.resolve", isbn = %isbn);
    let record = async {
        let t0 = Instant::now();
        let record = resolver.resolve(isbn).await;
        tracing::info!(
            elapsed_ms = t0.elapsed().as_millis(),
            found = record.is_some(),
            "metadata lookup done"
        );
        record
    }
    .instrument(span)
    .await;
    Ok(record)
}

#[instrument(name = "cmd.lookup", skip(state))]
async fn lookup(state: &AppState, raw: &str) -> Result<(), Error> {
    let isbn = checked_isbn(raw)?;
    match resolve(state, &isbn).await? {
        Some(record) => print!("{}", book_details(&record)),
        None => println!("No metadata found for {isbn}"),
    }
    Ok(())
}

#[instrument(name = "cmd.add", skip(state))]
async fn add(state: &AppState, raw: &str) -> Result<(), Error> {
    let isbn = checked_isbn(raw)?;
    let mut library = state.load_library().await?;
    if library.contains(&isbn) {
        println!("{isbn} is already in your library");
        return Ok(());
    }

    let Some(record) = resolve(state, &isbn).await? else {
        println!("No metadata found for {isbn}, add it by hand with `shelf add-manual`");
        return Ok(());
    };
    println!("Added {}", book_line(&record));
    library.add(record);
    state.save_library(&library).await
}

fn manual_entry(args: ManualArgs) -> Result<ManualEntry, Error> {
    let mut entry = ManualEntry::new(&args.title);
    entry.isbn = args.isbn.map(|raw| checked_isbn(&raw)).transpose()?;
    entry.authors = args.authors;
    entry.genres = args.genres;
    entry.description = args.description;
    entry.cover_url = args.cover_url;
    entry.page_count = args.pages;
    entry.reading_status = args.status;
    entry.publisher = args.publisher;
    entry.publish_year = args.year;
    entry.language = args.language;
    entry.series = args.series;
    entry.series_order = args.series_order;
    Ok(entry)
}

#[instrument(name = "cmd.add_manual", skip_all, fields(title = %args.title))]
async fn add_manual(state: &AppState, args: ManualArgs) -> Result<(), Error> {
    let record = manual_entry(args)?.into_record(Utc::now());
    let mut library = state.load_library().await?;
    let line = book_line(&record);
    if !library.add(record) {
        println!("A book with this ISBN is already in your library");
        return Ok(());
    }
    println!("Added {line}");
    state.save_library(&library).await
}

fn list_query(args: &ListArgs) -> LibraryQuery {
    let mut query = LibraryQuery::new();
    query.status = args.status;
    query.genre.clone_from(&args.genre);
    query.author.clone_from(&args.author);
    query.favorites_only = args.favorites;
    query.min_rating = args.min_rating;
    query.text.clone_from(&args.search);
    query.sort = args.sort;
    query.reverse = args.reverse;
    query
}

async fn list(state: &AppState, args: &ListArgs) -> Result<(), Error> {
    let library = state.load_library().await?;
    let books = list_query(args).apply(&library);
    if books.is_empty() {
        println!("No books found");
    }
    for book in books {
        println!("{}", book_line(book));
    }
    Ok(())
}

async fn show(state: &AppState, isbn: &str) -> Result<(), Error> {
    let library = state.load_library().await?;
    let book = library
        .get(isbn)
        .ok_or_else(|| Error::UnknownBook(isbn.to_owned()))?;
    print!("{}", book_details(book));
    Ok(())
}

async fn favorite(state: &AppState, isbn: &str) -> Result<(), Error> {
    let mut library = state.load_library().await?;
    let Some(favorite) = library.toggle_favorite(isbn) else {
        return Err(Error::UnknownBook(isbn.to_owned()));
    };
    state.save_library(&library).await?;
    if favorite {
        println!("Marked {isbn} as favorite");
    } else {
        println!("{isbn} is no longer a favorite");
    }
    Ok(())
}

async fn clear(state: &AppState, confirmed: bool) -> Result<(), Error> {
    if !confirmed {
        return Err(Error::Other(
            "Refusing to remove every book without --yes".to_owned(),
        ));
    }
    let mut library = state.load_library().await?;
    let count = library.len();
    library.clear();
    state.save_library(&library).await?;
    println!("Removed {count} books");
    Ok(())
}

fn pick_format(path: &Path, format: Option<ExportFormat>) -> Result<ExportFormat, Error> {
    format
        .or_else(|| ExportFormat::from_path(path))
        .ok_or_else(|| {
            Error::Other(format!(
                "Cannot tell the format of {}, pass --format json or --format csv",
                path.display()
            ))
        })
}

#[instrument(name = "cmd.export", skip(state))]
async fn export_library(
    state: &AppState,
    path: &Path,
    format: Option<ExportFormat>,
) -> Result<(), Error> {
    let format = pick_format(path, format)?;
    let library = state.load_library().await?;
    let contents = export::export(library.records(), format)?;
    tokio::fs::write(path, contents).await?;
    println!(
        "Exported {} books to {} as {}",
        library.len(),
        path.display(),
        format.extension()
    );
    Ok(())
}

/// Adds every imported book not yet in `library`, or replaces the library entirely. Returns how
/// many books were added.
fn merge_imported(library: &mut LibraryStore, books: Vec<BookRecord>, replace: bool) -> usize {
    if replace {
        *library = LibraryStore::from_records(books);
        return library.len();
    }
    // Imports are listed newest first, adding back to front keeps that order on top
    books
        .into_iter()
        .rev()
        .map(|book| library.add(book))
        .filter(|added| *added)
        .count()
}

#[instrument(name = "cmd.import", skip(state))]
async fn import_library(
    state: &AppState,
    path: &Path,
    format: Option<ExportFormat>,
    replace: bool,
) -> Result<(), Error> {
    let format = pick_format(path, format)?;
    let contents = tokio::fs::read_to_string(path).await?;
    let books = export::import(&contents, format)?;
    let total = books.len();
    let mut library = state.load_library().await?;
    let added = merge_imported(&mut library, books, replace);
    state.save_library(&library).await?;
    println!("Imported {added} of {total} books from {}", path.display());
    Ok(())
}

/// One line per scan result; invalid codes stay silent.
fn scan_report(outcome: &ScanOutcome) -> Option<String> {
    match outcome {
        ScanOutcome::Added(record) => Some(format!("Added {}", book_line(record))),
        ScanOutcome::NotFound { isbn } => Some(format!("No metadata found for {isbn}")),
        ScanOutcome::AlreadyInLibrary { isbn } => {
            Some(format!("{isbn} is already in your library"))
        }
        ScanOutcome::Busy => Some("Still looking up the previous book".to_owned()),
        ScanOutcome::Discarded { isbn } => Some(format!("Stopped before {isbn} was added")),
        _ => None,
    }
}

#[instrument(name = "cmd.scan", skip(state))]
async fn scan(state: &AppState) -> Result<(), Error> {
    let resolver = Arc::new(Resolver::from_config(&state.settings.resolver_config())?);
    let library = state.load_library().await?.into_shared();
    let known = library.read().await.len();
    let session = Arc::new(ScanSession::with_cooldown(
        resolver,
        Arc::clone(&library),
        state.settings.scan_cooldown(),
    ));
    println!("Ready to scan, one code per line. Press Ctrl-C or close the input to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = Vec::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let session = Arc::clone(&session);
                pending.push(tokio::spawn(async move {
                    let outcome = session.on_decode(&line).await;
                    if let Some(report) = scan_report(&outcome) {
                        println!("{report}");
                    }
                    outcome
                }));
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Interrupted, discarding lookups in flight");
                session.stop();
                pending.iter().for_each(JoinHandle::abort);
                break;
            }
        }
    }

    let added = settle_scans(pending, &library, known).await?;
    session.stop();

    if added > 0 {
        let library = library.read().await;
        state.save_library(&library).await?;
    }
    println!("Scanned {added} new books");
    Ok(())
}

/// Waits for the scan tasks and counts the books they added. A task aborted right after adding its
/// book still counts, so the count is taken from the library.
async fn settle_scans<T>(
    pending: Vec<JoinHandle<T>>,
    library: &SharedLibrary,
    known: usize,
) -> Result<usize, Error> {
    for result in join_all(pending).await {
        match result {
            Ok(_) => {}
            Err(error) if error.is_cancelled() => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(library.read().await.len().saturating_sub(known))
}

#[instrument(name = "cmd.login", skip(state, password))]
async fn login(state: &mut AppState, url: &str, username: &str, password: &str) -> Result<(), Error> {
    let credentials = Credentials::new(username, password)?;
    let token = credentials.token();
    let backend = RemoteBackend::new(build_http_client()?, url, credentials);
    let count = match backend.verify(&state.settings.library).await {
        Ok(count) => count,
        Err(StoreError::Unauthorized) => {
            return Err(Error::Other(
                "The server rejected this username or password".to_owned(),
            ));
        }
        Err(error) => return Err(error.into()),
    };

    state.config.remote_url = Some(url.to_owned());
    state.config.token = Some(token);
    state.config.save(&state.paths.config).await?;
    println!("Logged in to {url} as {username}, {count} books stored there");
    Ok(())
}

async fn logout(state: &mut AppState) -> Result<(), Error> {
    if state.config.token.is_none() {
        println!("Not logged in");
        return Ok(());
    }
    state.config.forget_token();
    state.config.save(&state.paths.config).await?;
    println!("Logged out, using the local library from now on");
    Ok(())
}

fn book_line(book: &BookRecord) -> String {
    let mut line = format!("{}  {} by {}", book.isbn, book.title, book.authors_display());
    if book.reading_status != ReadingStatus::Unread {
        write!(line, "  [{}]", book.reading_status).ok();
    }
    if let Some(rating) = book.rating {
        write!(line, "  {rating}").ok();
    }
    if book.favorite {
        line.push_str("  *");
    }
    line
}

fn book_details(book: &BookRecord) -> String {
    let mut details = format!("{}\n", book.title);
    let mut field = |name: &str, value: &str| {
        if !value.is_empty() {
            writeln!(details, "  {name:<12}{value}").ok();
        }
    };
    field("ISBN", &book.isbn);
    field("Authors", &book.authors_display());
    field("Genres", &book.genres.join(", "));
    if let Some(series) = &book.series {
        let order = book
            .series_order
            .map(|order| format!(" #{order}"))
            .unwrap_or_default();
        field("Series", &format!("{series}{order}"));
    }
    field("Publisher", book.publisher.as_deref().unwrap_or_default());
    field(
        "Published",
        &book.publish_year.map(|year| year.to_string()).unwrap_or_default(),
    );
    field("Language", book.language.as_deref().unwrap_or_default());
    if book.page_count > 0 {
        field("Pages", &book.page_count.to_string());
    }
    field("Status", book.reading_status.as_str());
    field(
        "Rating",
        &book.rating.map(|rating| rating.to_string()).unwrap_or_default(),
    );
    field("Favorite", if book.favorite { "yes" } else { "" });
    field("Added", &book.date_added.format("%Y-%m-%d %H:%M").to_string());
    field("Cover", &book.cover_url);
    field(
        "Source",
        book.source.map(|source| source.as_str()).unwrap_or_default(),
    );
    field("Notes", &book.notes);
    field("Description", &book.description);
    details
}

fn stats_report(stats: &LibraryStats) -> String {
    let mut report = format!("{} books\n", stats.total);
    for status in ReadingStatus::ALL {
        writeln!(report, "  {:<10}{}", status.as_str(), stats.count(status)).ok();
    }
    writeln!(report, "Favorites   {}", stats.favorites).ok();
    match stats.average_rating {
        Some(average) => writeln!(
            report,
            "Rated       {} (average {average:.1} stars)",
            stats.rated
        ),
        None => writeln!(report, "Rated       0"),
    }
    .ok();
    writeln!(report, "Pages read  {}", stats.pages_read).ok();
    writeln!(report, "Genres      {}", stats.genres.len()).ok();
    report
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::state::tests::temp_settings;
    use chrono::TimeZone as _;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use shelf_core::library::Rating;

    fn odyssey() -> BookRecord {
        let mut book = BookRecord::new(
            "9780140449136".to_owned(),
            "The Odyssey".to_owned(),
            vec!["Homer".to_owned(), "Robert Fagles".to_owned()],
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap(),
        );
        book.genres = vec!["Epic".to_owned()];
        book.page_count = 541;
        book
    }

    #[tokio::test]
    async fn aborted_scan_task_still_counts_its_book() {
        let library = LibraryStore::new().into_shared();
        let known = library.read().await.len();
        let (added_tx, added_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn({
            let library = Arc::clone(&library);
            async move {
                library.write().await.add(odyssey());
                added_tx.send(()).unwrap();
                core::future::pending::<()>().await;
            }
        });
        added_rx.await.unwrap();
        task.abort();

        assert_eq!(settle_scans(vec![task], &library, known).await.unwrap(), 1);
        assert!(library.read().await.contains("9780140449136"));
    }

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["shelf"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn isbns_are_normalized_before_validation() {
        assert_eq!(checked_isbn("978-0-14-044913-6").unwrap(), "9780140449136");
        assert!(matches!(
            checked_isbn("9780140449137"),
            Err(Error::InvalidIsbn(_))
        ));
    }

    #[test]
    fn book_line_shows_status_rating_and_favorite() {
        let mut book = odyssey();
        assert_eq!(
            book_line(&book),
            "9780140449136  The Odyssey by Homer, Robert Fagles"
        );
        book.reading_status = ReadingStatus::Read;
        book.rating = Some(Rating::new(5).unwrap());
        book.favorite = true;
        assert_eq!(
            book_line(&book),
            "9780140449136  The Odyssey by Homer, Robert Fagles  [read]  5/5  *"
        );
    }

    #[test]
    fn details_skip_empty_fields() {
        let details = book_details(&odyssey());
        assert!(details.starts_with("The Odyssey\n"));
        assert!(details.contains("Pages       541"));
        assert!(!details.contains("Rating"));
        assert!(!details.contains("Notes"));
    }

    #[test]
    fn scan_reports() {
        assert_eq!(scan_report(&ScanOutcome::Invalid), None);
        assert_eq!(
            scan_report(&ScanOutcome::Suppressed {
                isbn: "9780140449136".to_owned()
            }),
            None
        );
        assert_eq!(
            scan_report(&ScanOutcome::AlreadyInLibrary {
                isbn: "9780140449136".to_owned()
            })
            .unwrap(),
            "9780140449136 is already in your library"
        );
        assert_eq!(
            scan_report(&ScanOutcome::Added(Box::new(odyssey()))).unwrap(),
            "Added 9780140449136  The Odyssey by Homer, Robert Fagles"
        );
    }

    #[test]
    fn merging_keeps_existing_books() {
        let mut existing = odyssey();
        existing.notes = "mine".to_owned();
        let mut library = LibraryStore::from_records(vec![existing]);
        let newer = BookRecord::new(
            "9780547928227".to_owned(),
            "The Hobbit".to_owned(),
            vec!["J. R. R. Tolkien".to_owned()],
            Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
        );

        let added = merge_imported(&mut library, vec![newer.clone(), odyssey()], false);
        assert_eq!(added, 1);
        assert_eq!(library.len(), 2);
        assert_eq!(library.records()[0].isbn, "9780547928227");
        assert_eq!(library.get("9780140449136").unwrap().notes, "mine");

        let added = merge_imported(&mut library, vec![newer], true);
        assert_eq!(added, 1);
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn stats_report_lists_every_status() {
        let mut read = odyssey();
        read.reading_status = ReadingStatus::Read;
        read.rating = Some(Rating::new(4).unwrap());
        let report = stats_report(&LibraryStats::collect(&[read]));
        assert!(report.starts_with("1 books\n"));
        assert!(report.contains("  read      1\n"));
        assert!(report.contains("  wishlist  0\n"));
        assert!(report.contains("average 4.0 stars"));
        assert!(report.contains("Pages read  541"));
    }

    #[tokio::test]
    async fn editing_commands_change_the_stored_library() {
        let (settings, home) = temp_settings("commands-edit");
        let mut state = AppState::open(settings, None).await.unwrap();

        let commands = [
            parse(&[
                "add-manual",
                "--title",
                "The Odyssey",
                "--author",
                "Homer",
                "--isbn",
                "9780140449136",
            ]),
            parse(&["status", "9780140449136", "reading"]),
            parse(&["rate", "9780140449136", "4"]),
            parse(&["note", "9780140449136", "Fagles translation"]),
            parse(&["favorite", "9780140449136"]),
        ];
        for command in commands {
            execute(command, &mut state).await.unwrap();
        }

        let library = state.load_library().await.unwrap();
        let book = library.get("9780140449136").unwrap();
        assert_eq!(book.reading_status, ReadingStatus::Reading);
        assert_eq!(book.rating, Some(Rating::new(4).unwrap()));
        assert_eq!(book.notes, "Fagles translation");
        assert!(book.favorite);

        let error = execute(parse(&["delete", "9780547928227"]), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnknownBook(_)));
        assert!(
            execute(parse(&["clear"]), &mut state).await.is_err(),
            "clear needs --yes"
        );

        execute(parse(&["delete", "9780140449136"]), &mut state)
            .await
            .unwrap();
        assert!(state.load_library().await.unwrap().is_empty());
        state.close().await;
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[tokio::test]
    async fn export_then_import_through_files() {
        let (settings, home) = temp_settings("commands-export");
        let mut state = AppState::open(settings, None).await.unwrap();
        let mut library = LibraryStore::new();
        library.add(odyssey());
        state.save_library(&library).await.unwrap();

        let path = home.join("backup.csv");
        let path_arg = path.to_str().unwrap();
        execute(parse(&["export", path_arg]), &mut state)
            .await
            .unwrap();
        execute(parse(&["clear", "--yes"]), &mut state).await.unwrap();
        assert!(state.load_library().await.unwrap().is_empty());

        execute(parse(&["import", path_arg]), &mut state)
            .await
            .unwrap();
        let library = state.load_library().await.unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library.records()[0].title, "The Odyssey");
        state.close().await;
        std::fs::remove_dir_all(&home).unwrap();
    }
}
