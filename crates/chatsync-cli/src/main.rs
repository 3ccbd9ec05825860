//! chatsync CLI
//!
//! Thin wrapper around chatsync-core for command-line usage. The
//! "remote" tree lives in a JSON file under the data directory, loaded
//! into the in-memory store at startup and written back after each
//! command, so two-user flows can be driven from one shell.
//!
//! ## Usage
//!
//! ```bash
//! # Register (and log in as) a user
//! chatsync register Alice Anders a@x.com
//!
//! # Switch the logged-in account
//! chatsync login b@x.com
//!
//! # List the directory (minus yourself)
//! chatsync users
//!
//! # Open a thread with a first message
//! chatsync new b@x.com "hi"
//!
//! # Reply into an existing thread
//! chatsync send <conversation_id> b@x.com "how are you?"
//!
//! # Show a thread / your conversation list
//! chatsync messages <conversation_id>
//! chatsync conversations
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use chatsync_core::{
    ChatEngine, ConversationId, DerivedKey, MemoryBlobStore, MemoryTreeStore, OutgoingMessage,
    SessionKey,
};

/// chatsync - conversation sync over a file-backed tree
#[derive(Parser)]
#[command(name = "chatsync")]
#[command(version = "0.1.0")]
#[command(about = "chatsync - two-party chat over an external tree store")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.chatsync)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account and log in as it
    Register {
        first_name: String,
        last_name: String,
        email: String,
    },

    /// Log in as an already registered account
    Login { email: String },

    /// Log out
    Logout,

    /// List registered users, minus the logged-in account
    Users,

    /// List the logged-in account's conversations
    Conversations,

    /// Open a new conversation with its first message
    New {
        /// Other party's email
        email: String,
        /// First message text
        message: String,
    },

    /// Send a message into an existing conversation
    Send {
        /// Conversation id
        conversation_id: String,
        /// Other party's email
        email: String,
        /// Message text
        message: String,
    },

    /// Show a conversation's history
    Messages {
        /// Conversation id
        conversation_id: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.chatsync)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatsync")
}

fn load_tree(path: &Path) -> Result<MemoryTreeStore> {
    let tree = MemoryTreeStore::new();
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading tree file {}", path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing tree file {}", path.display()))?;
        tree.import(snapshot)?;
        tracing::debug!(path = %path.display(), "loaded tree snapshot");
    }
    Ok(tree)
}

fn save_tree(tree: &MemoryTreeStore, path: &Path) -> Result<()> {
    let raw = serde_json::to_string_pretty(&tree.export())?;
    fs::write(path, raw).with_context(|| format!("writing tree file {}", path.display()))?;
    Ok(())
}

fn load_session(engine: &ChatEngine, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    let values: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing session file {}", path.display()))?;
    for (key, session_key) in [
        ("email", SessionKey::Email),
        ("display_name", SessionKey::DisplayName),
        ("picture_file_name", SessionKey::PictureFileName),
    ] {
        if let Some(value) = values.get(key).and_then(|v| v.as_str()) {
            engine.session().set(session_key, value);
        }
    }
    Ok(())
}

fn save_session(engine: &ChatEngine, path: &Path) -> Result<()> {
    let values = serde_json::json!({
        "email": engine.session().get(SessionKey::Email),
        "display_name": engine.session().get(SessionKey::DisplayName),
        "picture_file_name": engine.session().get(SessionKey::PictureFileName),
    });
    fs::write(path, serde_json::to_string_pretty(&values)?)
        .with_context(|| format!("writing session file {}", path.display()))?;
    Ok(())
}

/// Display name of a registered account, from its profile node
async fn display_name_of(engine: &ChatEngine, key: &DerivedKey) -> Result<String> {
    let node = engine.directory().get_user(key).await?;
    Ok(format!("{} {}", node.first_name, node.last_name))
}

fn require_login(engine: &ChatEngine) -> Result<String> {
    let email = engine.session().get(SessionKey::Email);
    if email.is_empty() {
        bail!("not logged in; run `chatsync register` or `chatsync login` first");
    }
    Ok(email)
}

/// The other-side conversation entry is written by a spawned task;
/// give it a moment to land before the tree is exported
async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let tree_path = data_dir.join("tree.json");
    let session_path = data_dir.join("session.json");

    let tree = Arc::new(load_tree(&tree_path)?);
    let engine = ChatEngine::new(tree.clone(), Arc::new(MemoryBlobStore::new()));
    load_session(&engine, &session_path)?;

    match cli.command {
        Commands::Register {
            first_name,
            last_name,
            email,
        } => {
            let inserted = engine
                .register_user(&first_name, &last_name, &email, None)
                .await?;
            if !inserted {
                bail!("{} is already registered", email);
            }
            engine.login(&email, &format!("{} {}", first_name, last_name));
            println!("Registered and logged in as {}", email);
        }

        Commands::Login { email } => {
            let key = DerivedKey::from_email(&email);
            if !engine.directory().user_exists(&key).await? {
                bail!("{} is not registered", email);
            }
            let name = display_name_of(&engine, &key).await?;
            engine.login(&email, &name);
            println!("Logged in as {} ({})", name, email);
        }

        Commands::Logout => {
            engine.logout();
            println!("Logged out");
        }

        Commands::Users => {
            require_login(&engine)?;
            let users = engine.directory().get_all_users().await?;
            if users.is_empty() {
                println!("No other users registered");
            }
            for user in users {
                println!("{}  ({})", user.name, user.email);
            }
        }

        Commands::Conversations => {
            require_login(&engine)?;
            let key = engine.session().current_derived_key();
            let mut feed = engine.ledger().subscribe_conversations(&key).await?;
            let entries = feed.recv().await.unwrap_or(Ok(Vec::new()))?;
            if entries.is_empty() {
                println!("No conversations yet");
            }
            for entry in entries {
                println!("{}", entry.id);
                println!("  with: {} ({})", entry.name, entry.other_user_email);
                println!(
                    "  latest: {}  [{}]",
                    entry.latest_message.text, entry.latest_message.date
                );
            }
        }

        Commands::New { email, message } => {
            require_login(&engine)?;
            let other_key = DerivedKey::from_email(&email);
            let other_name = display_name_of(&engine, &other_key).await?;
            let sender = engine.session().get(SessionKey::DisplayName);

            let id = engine
                .ledger()
                .create_new_conversation(&other_key, &other_name, OutgoingMessage::text(message, sender))
                .await?;
            settle().await;
            println!("Created conversation {}", id);
        }

        Commands::Send {
            conversation_id,
            email,
            message,
        } => {
            require_login(&engine)?;
            let other_key = DerivedKey::from_email(&email);
            let sender = engine.session().get(SessionKey::DisplayName);
            let id = ConversationId::from_string(conversation_id);

            engine
                .ledger()
                .deliver(&id, &other_key, OutgoingMessage::text(message, sender))
                .await?;
            println!("Sent");
        }

        Commands::Messages { conversation_id } => {
            require_login(&engine)?;
            let id = ConversationId::from_string(conversation_id);
            let mut feed = engine.ledger().subscribe_messages(&id).await?;
            let messages = feed.recv().await.unwrap_or(Ok(Vec::new()))?;
            if messages.is_empty() {
                println!("No messages");
            }
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    message.sent_at.format("%Y-%m-%d %H:%M:%S"),
                    message.sender_name,
                    message.content()
                );
            }
        }
    }

    save_tree(&tree, &tree_path)?;
    save_session(&engine, &session_path)?;
    Ok(())
}
