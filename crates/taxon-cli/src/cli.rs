//! Command-line argument definitions.

use clap::{Args, Parser, Subcommand};
use taxon_core::EntryLabels;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "taxon")]
#[command(author, version, about = "Edit hierarchical, multilingual vocabularies")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Manage vocabularies
    #[command(subcommand)]
    Vocab(VocabCommand),

    /// Manage vocabulary entries
    #[command(subcommand)]
    Entry(EntryCommand),

    /// Print a vocabulary's entries as an indented tree
    Tree {
        /// Vocabulary ID
        vocabulary_id: Uuid,

        /// Locale used for labels, falling back to the first label
        #[arg(short, long, default_value = "en")]
        locale: String,

        /// Print the forest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move an entry to a new parent and position, then save
    Move {
        /// Vocabulary ID
        vocabulary_id: Uuid,

        /// Entry to move
        item_id: Uuid,

        #[command(flatten)]
        target: ParentTarget,

        /// Zero-based position among the new siblings
        #[arg(short, long, default_value_t = 0)]
        rank: u32,

        /// Print the batch that would be written without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Derive an entry slug without touching the database
    Slug {
        /// Vocabulary display name (blank for the default token)
        vocabulary_name: String,

        /// Slug of the parent entry
        #[arg(long)]
        parent_slug: Option<String>,

        /// Label as LOCALE=TEXT (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
pub enum VocabCommand {
    /// Create a vocabulary
    Create {
        /// Display name
        name: String,
    },

    /// List vocabularies by name
    List,

    /// Rename a vocabulary (entry slugs are kept)
    Rename {
        /// Vocabulary ID
        id: Uuid,
        /// New display name
        name: String,
    },

    /// Delete a vocabulary and all of its entries
    Delete {
        /// Vocabulary ID
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum EntryCommand {
    /// Create an entry
    Create {
        /// Vocabulary ID
        vocabulary_id: Uuid,

        /// Label as LOCALE=TEXT (repeatable, at least one)
        #[arg(short, long = "label", required = true, value_parser = parse_label)]
        labels: Vec<(String, String)>,

        /// Parent entry ID (omit for a root entry)
        #[arg(short, long)]
        parent: Option<Uuid>,

        /// Position among siblings (default: after the last one)
        #[arg(short, long)]
        rank: Option<u32>,
    },

    /// Edit an entry's labels, parent or rank
    Edit {
        /// Entry ID
        id: Uuid,

        /// Replacement labels as LOCALE=TEXT (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,

        /// New parent entry ID
        #[arg(short, long, conflicts_with = "root")]
        parent: Option<Uuid>,

        /// Move the entry to the root
        #[arg(long)]
        root: bool,

        /// New position among siblings
        #[arg(short, long)]
        rank: Option<u32>,
    },

    /// Delete an entry; its children become roots
    Delete {
        /// Entry ID
        id: Uuid,
    },
}

/// Destination parent for a move: exactly one of `--parent` or `--root`.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ParentTarget {
    /// New parent entry ID
    #[arg(short, long)]
    pub parent: Option<Uuid>,

    /// Move to the root
    #[arg(long)]
    pub root: bool,
}

impl ParentTarget {
    pub fn parent_id(&self) -> Option<Uuid> {
        if self.root {
            None
        } else {
            self.parent
        }
    }
}

/// Parse `LOCALE=TEXT`.
pub fn parse_label(s: &str) -> Result<(String, String), String> {
    let (locale, text) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LOCALE=TEXT, got '{}'", s))?;
    let locale = locale.trim();
    if locale.is_empty() {
        return Err("locale must not be empty".to_string());
    }
    Ok((locale.to_string(), text.to_string()))
}

/// Collect parsed label pairs; later duplicates of a locale win.
pub fn into_labels(pairs: Vec<(String, String)>) -> EntryLabels {
    pairs.into_iter().collect()
}
