mod session;

use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use marginalia_core::{
    Annotation, ChatMessages, DocumentId, GlobalUiState, Highlight, Note, Theme,
    ViewerUiState, metadata_from_filename,
};
use marginalia_sync::{LocalFileHost, SyncError, SyncState, reconcile};

use crate::session::Session;

#[derive(Debug, Parser)]
#[command(name = "marginalia", version, about = "Local annotation and reading-state store")]
struct Cli {
    /// Directory holding the local cache and sync settings
    #[arg(long, env = "MARGINALIA_DATA_DIR", default_value = ".marginalia", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Doc(DocCommand),

    /// Manage the external sync file
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },

    /// Infer title and author from a file name
    ParseTitle { file_name: String },
}

/// Commands on the local cache. Annotation and progress changes are mirrored
/// to the sync file when one is connected.
#[derive(Debug, Subcommand)]
enum DocCommand {
    /// Show the versioned records of a document, or list known documents
    Records { doc: Option<DocumentId> },

    /// List the annotations of a document
    Annotations { doc: DocumentId },

    /// Highlight text on a page
    Highlight {
        doc: DocumentId,
        page: u32,
        text: String,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Add a note, or replace the text of an existing annotation with --id
    Note {
        doc: DocumentId,
        text: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, conflicts_with = "page")]
        id: Option<String>,
    },

    /// Toggle the bookmark on a page
    Bookmark { doc: DocumentId, page: u32 },

    /// Delete an annotation
    Remove { doc: DocumentId, id: String },

    /// Record the page being read
    Progress { doc: DocumentId, page: u32 },

    /// Show or change application-wide preferences
    Prefs {
        #[arg(long)]
        theme: Option<Theme>,
        #[arg(long)]
        chat_panel_width: Option<u32>,
        #[arg(long)]
        show_page_numbers: Option<bool>,
    },

    /// Remove everything stored for a document
    Forget { doc: DocumentId },
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    /// Show the sync binding
    Status,
    /// Bind an existing sync file
    Connect { path: PathBuf },
    /// Create a new sync file and bind it. PATH may be a directory.
    Create {
        path: PathBuf,
        #[arg(long, default_value = "marginalia-sync")]
        name: String,
    },
    /// Forget the sync binding
    Clear,
    /// Merge the sync file into the local cache
    Pull { doc: DocumentId },
    /// Write local annotations and progress to the sync file
    Push {
        doc: DocumentId,
        /// Derive title and author from this document file name
        #[arg(long)]
        file_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    tracing::debug!(data_dir = %cli.data_dir.display(), "marginalia v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::ParseTitle { file_name } => {
            let meta = metadata_from_filename(&file_name);
            println!("title:  {}", meta.title);
            println!("author: {}", meta.author.as_deref().unwrap_or("-"));
            Ok(())
        }
        Command::Sync { command } => run_sync(&cli.data_dir, command).await,
        Command::Doc(command) => {
            let session = Session::open(&cli.data_dir, LocalFileHost::new()).await?;
            run(&session, command).await
        }
    }
}

async fn run(session: &Session, command: DocCommand) -> anyhow::Result<()> {
    match command {
        DocCommand::Records { doc: None } => {
            let docs = session.cache.documents().await;
            if docs.is_empty() {
                println!("no documents");
            }
            for doc in docs {
                println!("{doc}");
            }
        }
        DocCommand::Records { doc: Some(doc) } => {
            let viewer: ViewerUiState = session.cache.record(&doc).await;
            let chat: ChatMessages = session.cache.record(&doc).await;
            let global: GlobalUiState = session.cache.global_record().await;
            print_json("viewer-ui", &viewer)?;
            print_json("chat-messages", &chat)?;
            print_json("global-ui", &global)?;
        }
        DocCommand::Annotations { doc } => {
            let annotations = session.cache.annotations(&doc).await;
            if annotations.is_empty() {
                println!("no annotations");
            }
            for a in annotations.iter() {
                print_annotation(a);
            }
        }
        DocCommand::Highlight {
            doc,
            page,
            text,
            note,
            color,
        } => {
            let mut annotations = session.cache.annotations(&doc).await;
            let id = session.ids.next_id();
            annotations.add(Annotation::Highlight(Highlight {
                id: id.clone(),
                created_at: Utc::now(),
                page_number: page.max(1),
                text,
                rect: None,
                line_rects: Vec::new(),
                note,
                color,
            }));
            session.save_annotations(&doc, &annotations).await?;
            println!("added highlight {id}");
        }
        DocCommand::Note {
            doc,
            text,
            page: _,
            id: Some(id),
        } => {
            let mut annotations = session.cache.annotations(&doc).await;
            if !annotations.update_note(&id, &text) {
                bail!("no highlight or note with id {id} in {doc}");
            }
            session.save_annotations(&doc, &annotations).await?;
            println!("updated {id}");
        }
        DocCommand::Note {
            doc,
            text,
            page,
            id: None,
        } => {
            let mut annotations = session.cache.annotations(&doc).await;
            let id = session.ids.next_id();
            annotations.add(Annotation::Note(Note {
                id: id.clone(),
                created_at: Utc::now(),
                content: text,
                page_number: page,
            }));
            session.save_annotations(&doc, &annotations).await?;
            println!("added note {id}");
        }
        DocCommand::Bookmark { doc, page } => {
            let mut annotations = session.cache.annotations(&doc).await;
            let bookmarked = annotations.toggle_bookmark(page, session.ids.next_id(), Utc::now());
            session.save_annotations(&doc, &annotations).await?;
            if bookmarked {
                println!("bookmarked page {page}");
            } else {
                println!("removed bookmark on page {page}");
            }
        }
        DocCommand::Remove { doc, id } => {
            let mut annotations = session.cache.annotations(&doc).await;
            if annotations.remove(&id).is_none() {
                bail!("no annotation with id {id} in {doc}");
            }
            session.save_annotations(&doc, &annotations).await?;
            println!("removed {id}");
        }
        DocCommand::Progress { doc, page } => {
            let mut viewer: ViewerUiState = session.cache.record(&doc).await;
            viewer.go_to_page(page);
            println!(
                "page {} (furthest {})",
                viewer.current_page, viewer.furthest_page
            );
            session.save_viewer(&doc, viewer).await?;
        }
        DocCommand::Prefs {
            theme,
            chat_panel_width,
            show_page_numbers,
        } => {
            let mut prefs: GlobalUiState = session.cache.global_record().await;
            let changed = theme.is_some() || chat_panel_width.is_some() || show_page_numbers.is_some();
            if let Some(theme) = theme {
                prefs.theme = theme;
            }
            if let Some(width) = chat_panel_width {
                prefs.chat_panel_width = width;
            }
            if let Some(show) = show_page_numbers {
                prefs.show_page_numbers = show;
            }
            if changed {
                session
                    .cache
                    .put_global_record(prefs.clone())
                    .await
                    .context("saving preferences")?;
            }
            print_json("global-ui", &prefs)?;
        }
        DocCommand::Forget { doc } => {
            let removed = session
                .cache
                .forget_document(&doc)
                .await
                .with_context(|| format!("forgetting {doc}"))?;
            println!("removed {removed} entries for {doc}");
        }
    }
    Ok(())
}

async fn run_sync(data_dir: &std::path::Path, command: SyncCommand) -> anyhow::Result<()> {
    let host = match &command {
        SyncCommand::Connect { path } | SyncCommand::Create { path, .. } => {
            LocalFileHost::with_selection(path)
        }
        _ => LocalFileHost::new(),
    };
    let mut session = Session::open(data_dir, host).await?;

    match command {
        SyncCommand::Status => match session.sync.state() {
            SyncState::Unsupported => println!("sync files are not supported here"),
            SyncState::Unbound {
                last_display_name: Some(name),
            } => println!("not connected ({name} is no longer accessible)"),
            SyncState::Unbound { .. } => println!("not connected"),
            SyncState::Bound { display_name } => {
                println!("connected to {display_name}");
                if let Some(target) = session.sync.target() {
                    println!("handle: {}", target.handle());
                    if let Ok(meta) = target.resource().metadata().await {
                        println!("last modified: {}", meta.last_modified.to_rfc3339());
                    }
                }
            }
        },
        SyncCommand::Connect { .. } => {
            let result = session.sync.connect_existing().await;
            report_flow(result)?;
        }
        SyncCommand::Create { name, .. } => {
            let result = session.sync.create_new(&name).await;
            report_flow(result)?;
        }
        SyncCommand::Clear => {
            session.sync.clear().await.context("clearing sync binding")?;
            println!("sync file disconnected");
        }
        SyncCommand::Pull { doc } => {
            if !session.sync.is_bound() {
                println!("no sync file connected");
                return Ok(());
            }
            let remote = session.merger().read_document().await;
            if let Some(owner) = remote.document_id() {
                if owner != doc.as_str() {
                    println!("sync file belongs to document {owner}; nothing pulled into {doc}");
                    return Ok(());
                }
            }
            let local = session.cache.annotations(&doc).await;
            let viewer: ViewerUiState = session.cache.record(&doc).await;
            let merged = reconcile(local, viewer, remote);
            session
                .cache
                .put_annotations(&doc, &merged.annotations)
                .await
                .context("saving merged annotations")?;
            session
                .cache
                .put_record(&doc, merged.viewer.clone())
                .await
                .context("saving merged viewer state")?;
            println!(
                "imported {} annotations; at page {} (furthest {})",
                merged.imported, merged.viewer.current_page, merged.viewer.furthest_page
            );
        }
        SyncCommand::Push { doc, file_name } => {
            let merger = session.merger();
            let annotations = session.cache.annotations(&doc).await;
            let viewer: ViewerUiState = session.cache.record(&doc).await;
            let pushed = async {
                if !session.claim_sync_file(&doc).await? {
                    return Ok(false);
                }
                merger.write_annotations(annotations.as_slice()).await?;
                merger
                    .write_progress(Some(viewer.furthest_page), Some(viewer.current_page))
                    .await?;
                if let Some(file_name) = &file_name {
                    merger
                        .write_metadata(Some(metadata_from_filename(file_name)))
                        .await?;
                }
                Ok::<_, SyncError>(true)
            }
            .await;
            match pushed {
                Ok(true) => println!("pushed {} annotations", annotations.len()),
                Ok(false) => println!("nothing pushed"),
                Err(SyncError::NoSyncTarget) => println!("no sync file connected"),
                Err(err) => return Err(err).context("writing sync file"),
            }
        }
    }
    Ok(())
}

/// Print the outcome of an interactive acquisition flow. Cancellation is a
/// normal outcome, not an error.
fn report_flow(result: Result<String, SyncError>) -> anyhow::Result<()> {
    match result {
        Ok(name) => println!("connected to {name}"),
        Err(SyncError::Cancelled) => println!("cancelled"),
        Err(SyncError::Write(err)) => {
            println!("connected for this session only: {err}");
        }
        Err(err) => return Err(err).context("connecting sync file"),
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(label: &str, value: &T) -> anyhow::Result<()> {
    println!("{label}: {}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_annotation(annotation: &Annotation) {
    let page = annotation
        .page_number()
        .map(|p| format!("p.{p}"))
        .unwrap_or_else(|| "-".to_string());
    let created = annotation.created_at().format("%Y-%m-%d %H:%M");
    match annotation {
        Annotation::Highlight(h) => {
            print!("{:<14} {:<9} {:<6} {created}  \"{}\"", h.id, "highlight", page, h.text);
            if let Some(note) = &h.note {
                print!("  [{note}]");
            }
            println!();
        }
        Annotation::Note(n) => {
            println!("{:<14} {:<9} {:<6} {created}  {}", n.id, "note", page, n.content)
        }
        Annotation::Bookmark(b) => {
            println!("{:<14} {:<9} {:<6} {created}", b.id, "bookmark", page)
        }
    }
}
