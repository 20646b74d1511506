//! Subcommand handlers.
//!
//! The CLI stands in for a drag-and-drop tree view: `move` computes the
//! sibling order a drop would produce, records it in a fresh session, and
//! saves immediately.

use anyhow::{bail, Context};
use tracing::{info, warn};
use uuid::Uuid;

use taxon_core::defaults::{DEPTH_INDENT, NOTICE_SAVE_FAILED};
use taxon_core::{
    slug, tree, CreateEntryRequest, EntryNode, EntryRepository, UpdateEntryRequest,
    VocabularyRepository,
};
use taxon_db::Database;

use crate::cli::{into_labels, EntryCommand, VocabCommand};

pub async fn migrate(db: &Database) -> anyhow::Result<()> {
    db.migrate().await.context("Failed to run migrations")?;
    info!(subsystem = "cli", op = "migrate", "Migrations applied");
    println!("Migrations applied");
    Ok(())
}

pub async fn vocab(db: &Database, command: VocabCommand) -> anyhow::Result<()> {
    match command {
        VocabCommand::Create { name } => {
            let vocab = db.vocabularies.create(&name).await?;
            println!("{}\t{}", vocab.id, vocab.name);
        }
        VocabCommand::List => {
            for vocab in db.vocabularies.list().await? {
                println!("{}\t{}", vocab.id, vocab.name);
            }
        }
        VocabCommand::Rename { id, name } => {
            let vocab = db.vocabularies.rename(id, &name).await?;
            println!("{}\t{}", vocab.id, vocab.name);
        }
        VocabCommand::Delete { id } => {
            db.vocabularies.delete(id).await?;
            println!("Deleted vocabulary {}", id);
        }
    }
    Ok(())
}

pub async fn entry(db: &Database, command: EntryCommand) -> anyhow::Result<()> {
    match command {
        EntryCommand::Create {
            vocabulary_id,
            labels,
            parent,
            rank,
        } => {
            let entry = db
                .entries
                .create(CreateEntryRequest {
                    vocabulary_id,
                    parent_id: parent,
                    entry_labels: into_labels(labels),
                    rank,
                })
                .await?;
            println!("{}\t{}\trank {}", entry.id, entry.entry_value, entry.rank);
        }
        EntryCommand::Edit {
            id,
            labels,
            parent,
            root,
            rank,
        } => {
            let req = UpdateEntryRequest {
                entry_labels: (!labels.is_empty()).then(|| into_labels(labels)),
                parent_id: if root { Some(None) } else { parent.map(Some) },
                rank,
            };
            let entry = db.entries.update(id, req).await?;
            println!("{}\t{}\trank {}", entry.id, entry.entry_value, entry.rank);
        }
        EntryCommand::Delete { id } => {
            db.entries.delete(id).await?;
            println!("Deleted entry {}", id);
        }
    }
    Ok(())
}

pub async fn print_tree(
    db: &Database,
    vocabulary_id: Uuid,
    locale: &str,
    json: bool,
) -> anyhow::Result<()> {
    let mut session = db.tree_session();
    session.load(vocabulary_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(session.snapshot())?);
        return Ok(());
    }

    for line in render_tree(session.snapshot(), locale) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per entry in display order, indented by depth.
pub fn render_tree(forest: &[EntryNode], locale: &str) -> Vec<String> {
    tree::flatten(forest)
        .into_iter()
        .map(|(depth, node)| {
            format!(
                "{}{}  [{}]  rank={}  id={}",
                DEPTH_INDENT.repeat(depth),
                node.entry.label(locale),
                node.entry.entry_value,
                node.entry.rank,
                node.id()
            )
        })
        .collect()
}

pub async fn move_entry(
    db: &Database,
    vocabulary_id: Uuid,
    item_id: Uuid,
    parent_id: Option<Uuid>,
    rank: u32,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut session = db.tree_session();
    session.load(vocabulary_id).await?;

    let snapshot = session.snapshot();
    if tree::find_node(snapshot, item_id).is_none() {
        bail!("Entry {} is not in vocabulary {}", item_id, vocabulary_id);
    }
    if let Some(parent_id) = parent_id {
        if tree::find_node(snapshot, parent_id).is_none() {
            bail!("Parent {} is not in vocabulary {}", parent_id, vocabulary_id);
        }
    }

    let siblings = session.siblings_after_move(item_id, parent_id, rank);
    session.record_move(item_id, parent_id, rank, &siblings);

    if dry_run {
        let batch = session.plan_batch()?;
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    match session.save().await {
        Ok(outcome) => {
            println!("{}", outcome.notice());
            Ok(())
        }
        Err(e) => {
            warn!(
                subsystem = "cli",
                op = "move",
                entry_id = %item_id,
                error = %e,
                "Move not saved"
            );
            bail!("{}: {}", NOTICE_SAVE_FAILED, e)
        }
    }
}

pub fn derive_slug(
    vocabulary_name: &str,
    parent_slug: Option<&str>,
    labels: Vec<(String, String)>,
) -> String {
    slug::derive(Some(vocabulary_name), parent_slug, &into_labels(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxon_core::{MemoryTreeStore, TreeStore};

    #[test]
    fn test_derive_slug() {
        let slug = derive_slug(
            "Fauna",
            None,
            vec![
                ("fr-BE".to_string(), "Mammifères".to_string()),
                ("en".to_string(), "Mammals".to_string()),
            ],
        );
        assert_eq!(slug, "FAUNA_MAMMALS");
        assert_eq!(derive_slug("", None, vec![]), "DEFAULT_VOCAB");
    }

    #[tokio::test]
    async fn test_render_tree_indents_by_depth() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let mammals = store.insert_entry(vocab, None, 0, "Mammals");
        store.insert_entry(vocab, Some(mammals), 0, "Dogs");

        let forest = store.load_tree(vocab).await.unwrap();
        let lines = render_tree(&forest, "en");

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Mammals  [DEFAULT_VOCAB_MAMMALS]  rank=0"));
        assert!(lines[1].starts_with("— Dogs  [DEFAULT_VOCAB_DEFAULT_VOCAB_MAMMALS_DOGS]"));
    }
}
