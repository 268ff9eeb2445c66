//! quill: encrypted book files from the command line
//!
//! Commands:
//!   init <book>              - create a new, empty book
//!   info <book>              - header facts (no password needed)
//!   show <book>              - title, chapters and word counts
//!   add-chapter <book>       - append a chapter from a file or stdin
//!   write <book>             - stream stdin into a chapter with auto-save
//!   passwd <book>            - re-encrypt under a new password
//!   upgrade <book>           - rewrite an old-format file in the current format
//!   backups <book>           - list rolling backups, newest first
//!   restore <book> <backup>  - replace the book with a backup
//!   export <book>            - render the book as markdown

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quill_core::{Document, EntityId, Entry, QuillConfig, QuillError};
use quill_store::autosave::{self, SharedSession};
use quill_store::{AsyncStore, AutoSaveEvent, AutoSaveOptions, BookSession, DocumentStore};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Password-protected book files")]
struct Cli {
    /// Path to quill.toml configuration file
    #[arg(long, short = 'c', env = "QUILL_CONFIG", default_value = "quill.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "QUILL_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "QUILL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new book file
    Init {
        book: PathBuf,
        #[arg(long, short = 't')]
        title: String,
        #[arg(long, short = 'a', default_value = "")]
        author: String,
        #[arg(long, short = 'g', default_value = "")]
        genre: String,
    },

    /// Show container header facts without decrypting
    Info { book: PathBuf },

    /// Show the book outline
    Show { book: PathBuf },

    /// Append a chapter
    AddChapter {
        book: PathBuf,
        #[arg(long, short = 't')]
        title: String,
        /// Read chapter text from this file (default: stdin)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Append stdin to a chapter line by line, auto-saving as it goes
    ///
    /// The chapter is created if no chapter has this title.
    Write {
        book: PathBuf,
        #[arg(long, short = 't')]
        chapter: String,
    },

    /// Change the book password
    Passwd { book: PathBuf },

    /// Rewrite a file in the current container format
    Upgrade { book: PathBuf },

    /// List rolling backups
    Backups { book: PathBuf },

    /// Replace the book with one of its backups
    Restore { book: PathBuf, backup: PathBuf },

    /// Render the book as markdown
    Export {
        book: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<QuillError>() {
                Some(q) => {
                    eprintln!("error: {}", q.user_message());
                    debug!(kind = q.kind(), "{e:#}");
                }
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = cli.log_format.unwrap_or(if config.log.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    init_logging(level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "quill starting"
    );

    let store = DocumentStore::from_config(&config);
    match cli.command {
        Commands::Init {
            book,
            title,
            author,
            genre,
        } => cmd_init(&store, &book, title, author, genre),
        Commands::Info { book } => cmd_info(&store, &book),
        Commands::Show { book } => cmd_show(&store, &book),
        Commands::AddChapter { book, title, file } => {
            cmd_add_chapter(&store, &book, title, file.as_deref())
        }
        Commands::Write { book, chapter } => cmd_write(&config, store, &book, chapter).await,
        Commands::Passwd { book } => cmd_passwd(&store, &book),
        Commands::Upgrade { book } => cmd_upgrade(&store, &book),
        Commands::Backups { book } => cmd_backups(&store, &book),
        Commands::Restore { book, backup } => cmd_restore(&store, &book, &backup),
        Commands::Export { book, output } => cmd_export(&store, &book, output.as_deref()),
    }
}

// ── Config / logging ──────────────────────────────────────────────────────────

/// Defaults when the file does not exist.
fn load_config(path: &Path) -> Result<QuillConfig> {
    QuillConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries command output
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init(),
    }
}

// ── Password prompts ──────────────────────────────────────────────────────────

/// `QUILL_PASSWORD` wins over the prompt, for scripted use.
fn password(prompt: &str) -> Result<SecretString> {
    let raw = match std::env::var("QUILL_PASSWORD") {
        Ok(value) => value,
        Err(_) => rpassword::prompt_password(prompt).context("reading password")?,
    };
    if raw.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(SecretString::from(raw))
}

fn new_password(prompt: &str) -> Result<SecretString> {
    let first = password(prompt)?;
    if std::env::var_os("QUILL_PASSWORD").is_some() {
        return Ok(first);
    }
    let again = password("Repeat password: ")?;
    if first.expose_secret() != again.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_init(
    store: &DocumentStore,
    book: &Path,
    title: String,
    author: String,
    genre: String,
) -> Result<()> {
    if book.exists() {
        anyhow::bail!("{} already exists", book.display());
    }
    let pw = new_password("New book password: ")?;
    let mut doc = Document::new(title, author);
    doc.genre = genre;
    store.save(book, &mut doc, &pw)?;
    println!("created {}", book.display());
    Ok(())
}

fn cmd_info(store: &DocumentStore, book: &Path) -> Result<()> {
    let info = store.inspect(book)?;
    println!("file:        {}", book.display());
    println!("version:     {}", info.version);
    println!("iterations:  {}", info.iterations);
    println!("payload:     {} bytes", info.payload_len);
    if info.needs_upgrade {
        println!("note:        old format, run `quill upgrade`");
    }
    Ok(())
}

fn cmd_show(store: &DocumentStore, book: &Path) -> Result<()> {
    let doc = store.open(book, &password("Password: ")?)?;
    println!("{} by {}", doc.title, doc.author);
    if !doc.genre.is_empty() {
        println!("genre: {}", doc.genre);
    }
    println!("modified: {}", doc.modified.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    for (i, ch) in doc.chapters.iter().enumerate() {
        println!("{:>3}. {:<40} {:>7} words", i + 1, ch.title, ch.word_count());
    }
    println!();
    println!(
        "{} chapters, {} characters, {} world entries, {} notes, {} words",
        doc.chapters.len(),
        doc.characters.len(),
        doc.world_building.len(),
        doc.story_notes.len(),
        doc.total_word_count()
    );
    Ok(())
}

fn cmd_add_chapter(
    store: &DocumentStore,
    book: &Path,
    title: String,
    file: Option<&Path>,
) -> Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
    };
    let pw = password("Password: ")?;
    let mut session = BookSession::open(store, book, pw)?;
    session.document_mut().add_chapter(title, content);
    session.save(store)?;
    println!(
        "{} now has {} chapters",
        book.display(),
        session.document().chapters.len()
    );
    Ok(())
}

async fn cmd_write(
    config: &QuillConfig,
    store: DocumentStore,
    book: &Path,
    chapter: String,
) -> Result<()> {
    let pw = password("Password: ")?;
    let store = AsyncStore::from(store);
    let mut session = {
        let store = store.store().clone();
        let book = book.to_path_buf();
        tokio::task::spawn_blocking(move || BookSession::open(&store, book, pw))
            .await
            .context("opening book")??
    };

    let existing = session
        .document()
        .chapters
        .iter()
        .find(|c| c.title == chapter)
        .map(|c| c.id);
    let id = match existing {
        Some(id) => id,
        None => session.document_mut().add_chapter(chapter, ""),
    };
    write_loop(config, store, session, id).await
}

async fn write_loop(
    config: &QuillConfig,
    store: AsyncStore,
    session: BookSession,
    chapter: EntityId,
) -> Result<()> {
    let session: SharedSession = Arc::new(Mutex::new(session));
    let (tx, mut events) = mpsc::channel(16);
    let saver = config
        .autosave
        .enabled
        .then(|| {
            autosave::spawn(
                session.clone(),
                store.clone(),
                AutoSaveOptions::from(&config.autosave),
                tx,
            )
        })
        .transpose()?;

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AutoSaveEvent::SaveCompleted { revision } => {
                    eprintln!("[auto-saved revision {revision}]")
                }
                AutoSaveEvent::SaveFailed { error, .. } => {
                    eprintln!("[auto-save failed: {}]", error.user_message())
                }
                other => debug!(?other, "auto-save event"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ch) = guard.document_mut().chapter_mut(chapter) {
            let mut content = std::mem::take(&mut ch.content);
            content.push_str(&line);
            content.push('\n');
            ch.set_content(content);
        }
    }

    if let Some(saver) = saver {
        saver.shutdown().await;
    }
    if let Err(e) = reporter.await {
        warn!(error = %e, "auto-save reporter ended abnormally");
    }

    // final save for whatever the last tick missed
    let snapshot = {
        let guard = session.lock().unwrap_or_else(|e| e.into_inner());
        guard.is_dirty().then(|| guard.snapshot())
    };
    if let Some(snap) = snapshot {
        let saved = store
            .save(snap.path, snap.document, snap.password)
            .await?;
        let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
        guard.record_save(snap.revision, saved.modified);
    }

    let guard = session.lock().unwrap_or_else(|e| e.into_inner());
    let words = guard
        .document()
        .chapter(chapter)
        .map_or(0, |c| c.word_count());
    println!("saved {} ({words} words in chapter)", guard.path().display());
    Ok(())
}

fn cmd_passwd(store: &DocumentStore, book: &Path) -> Result<()> {
    let old = password("Current password: ")?;
    if !store.verify_password(book, &old)? {
        return Err(QuillError::AuthenticationFailure.into());
    }
    let new = new_password("New password: ")?;
    store.change_password(book, &old, &new)?;
    println!("password changed for {}", book.display());
    Ok(())
}

fn cmd_upgrade(store: &DocumentStore, book: &Path) -> Result<()> {
    if !store.inspect(book)?.needs_upgrade {
        println!("{} is already current", book.display());
        return Ok(());
    }
    let mut session = BookSession::open(store, book, password("Password: ")?)?;
    session.save(store)?;
    println!("upgraded {}", book.display());
    Ok(())
}

fn cmd_backups(store: &DocumentStore, book: &Path) -> Result<()> {
    let backups = store.list_backups(book)?;
    if backups.is_empty() {
        println!("no backups for {}", book.display());
        return Ok(());
    }
    for b in backups {
        println!("{:>6}  {:>10} bytes  {}", b.seq, b.size, b.path.display());
    }
    Ok(())
}

fn cmd_restore(store: &DocumentStore, book: &Path, backup: &Path) -> Result<()> {
    store.restore_backup(book, backup)?;
    println!("restored {} from {}", book.display(), backup.display());
    Ok(())
}

fn cmd_export(store: &DocumentStore, book: &Path, output: Option<&Path>) -> Result<()> {
    let doc = store.open(book, &password("Password: ")?)?;
    let markdown = quill_core::export::to_markdown(&doc);
    match output {
        Some(path) => {
            std::fs::write(path, markdown)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("exported to {}", path.display());
        }
        None => print!("{markdown}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write_command() {
        let cli = Cli::try_parse_from([
            "quill",
            "--log-format",
            "json",
            "write",
            "dune.book",
            "--chapter",
            "Ch1",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        match cli.command {
            Commands::Write { book, chapter } => {
                assert_eq!(book, PathBuf::from("dune.book"));
                assert_eq!(chapter, "Ch1");
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn test_init_requires_title() {
        assert!(Cli::try_parse_from(["quill", "init", "x.book"]).is_err());
    }
}
