//! Note board CLI - notes with images for signed-in users.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use noteboard_core::{NoteBoard, PendingImage, Session, SessionProvider};
use noteboard_fs::{FsBlobStore, FsRecordStore, FsSessionProvider};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

const NOTEBOARD_DIR: &str = ".noteboard";

#[derive(Parser)]
#[command(
    name = "noteboard",
    about = "Notes with images for signed-in users",
    version
)]
struct Cli {
    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a note board in the current directory
    Init {
        /// Delete existing data and reinitialize
        #[arg(long)]
        reinitialize: bool,
    },
    /// Sign in as a user
    Login {
        /// Username to sign in as
        username: String,
    },
    /// Sign out of the current session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Add a new note
    Add {
        /// Note name
        #[arg(long)]
        name: String,
        /// Note description (reads from stdin if not provided)
        #[arg(long)]
        description: Option<String>,
        /// Path to an image to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// List notes
    Ls,
    /// Delete a note and its image
    Rm {
        /// Note id
        id: String,
    },
}

/// Find the .noteboard directory by searching up from the current directory
fn find_board_dir() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let board_path = current.join(NOTEBOARD_DIR);
        if board_path.is_dir() {
            return Some(board_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the note board directory, or error if not initialized
fn get_board_dir() -> Result<PathBuf> {
    match find_board_dir() {
        Some(dir) => Ok(dir),
        None => bail!("No .noteboard directory found. Run 'noteboard init' first."),
    }
}

fn open_stores(board_dir: &Path) -> Result<(FsSessionProvider, FsRecordStore, FsBlobStore)> {
    let sessions = FsSessionProvider::open(board_dir).context("Failed to open session store")?;
    let records =
        FsRecordStore::open(board_dir.join("records")).context("Failed to open record store")?;
    let blobs = FsBlobStore::open(board_dir.join("blobs")).context("Failed to open blob store")?;
    Ok((sessions, records, blobs))
}

async fn require_session(sessions: &FsSessionProvider) -> Result<Session> {
    match sessions.current().await? {
        Some(session) => Ok(session),
        None => bail!("Not signed in. Run 'noteboard login <username>' first."),
    }
}

/// Guess an image content type from the file extension.
fn image_content_type(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let content_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => bail!(
            "Unsupported image type: {} (png, jpg, gif, webp, svg or bmp)",
            path.display()
        ),
    };
    Ok(content_type.to_string())
}

fn load_image(path: &Path) -> Result<PendingImage> {
    let content_type = image_content_type(path)?;

    let bytes = std::fs::read(path)
        .context(format!("Failed to read image {}", path.display()))?;

    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => bail!("Image path has no file name: {}", path.display()),
    };

    Ok(PendingImage {
        file_name,
        content_type,
        bytes,
    })
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn is_stdin_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("noteboard={}", filter).parse()?)
                .add_directive(format!("noteboard_core={}", filter).parse()?)
                .add_directive(format!("noteboard_fs={}", filter).parse()?),
        )
        .init();

    if let Commands::Init { reinitialize } = cli.command {
        let board_dir = PathBuf::from(NOTEBOARD_DIR);

        if board_dir.exists() {
            if reinitialize {
                std::fs::remove_dir_all(&board_dir)
                    .context("Failed to remove existing .noteboard directory")?;
            } else {
                let has_records = board_dir.join("records").exists();
                let has_session = board_dir.join("session.json").exists();
                if has_records || has_session {
                    bail!("A note board is already initialized here. Use --reinitialize to delete and recreate.");
                }
            }
        }

        open_stores(&board_dir)?;

        if reinitialize {
            println!("Reinitialized note board in {}", board_dir.display());
        } else {
            println!("Initialized note board in {}", board_dir.display());
        }
        return Ok(());
    }

    // All other commands need an initialized board
    let board_dir = get_board_dir()?;
    let (sessions, records, blobs) = open_stores(&board_dir)?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Login { username } => {
            let session = sessions.sign_in(&username).await?;
            println!("Hello {}", session.username);
        }

        Commands::Logout => {
            sessions.sign_out().await?;
            println!("Signed out");
        }

        Commands::Whoami => {
            let session = require_session(&sessions).await?;
            println!("Hello {}", session.username);
        }

        Commands::Add {
            name,
            description,
            image,
        } => {
            let session = require_session(&sessions).await?;
            let mut board = NoteBoard::new(session, records, blobs);

            let description = match description {
                Some(d) => d,
                None if !is_stdin_tty() => read_stdin()?,
                None => bail!("No description provided. Pass --description or pipe one on stdin."),
            };

            let form = board.form_mut();
            form.name = name;
            form.description = description;
            if let Some(path) = image {
                form.image = Some(load_image(&path)?);
            }

            let note = board.create_note().await?;
            println!("Added note {}", note.id);
        }

        Commands::Ls => {
            let session = require_session(&sessions).await?;
            let mut board = NoteBoard::new(session, records, blobs);
            board.refresh().await?;

            for note in board.notes() {
                println!(
                    "{}: {} ({}) -- {}",
                    note.id, note.name, note.created_at, note.description
                );
                if let Some(url) = &note.image_url {
                    println!("    image: {}", url);
                }
            }
        }

        Commands::Rm { id } => {
            let session = require_session(&sessions).await?;
            let mut board = NoteBoard::new(session, records, blobs);
            board.refresh().await?;

            let image_ref = match board.notes().iter().find(|n| n.id == id) {
                Some(note) => note.image_ref.clone(),
                None => {
                    eprintln!("Note {} not found", id);
                    std::process::exit(1);
                }
            };

            board.delete_note(&id, image_ref.as_deref()).await?;
            println!("Deleted note {}", id);
        }
    }

    Ok(())
}
