use std::path::Path;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::Settings,
    daemon::{storage::activity_storage::JsonlActivityStorage, RECORDS_DIR},
    error::GenerateError,
    generate::{ArtifactPaths, Generator, DATA_DIR},
    hierarchy::{
        chat::ChatSummarizer,
        summarizer::ResilientSummarizer,
        tree::{ConceptNode, ConceptTree},
    },
};

pub enum Artifact {
    Export { refined: bool },
    Tree,
}

/// Generates an artifact of the local day `date`. Ctrl-C cancels generation, leaving previous
/// artifacts as they were.
pub async fn process_generate_command(
    dir: &Path,
    settings: Settings,
    date: NaiveDate,
    artifact: Artifact,
) -> Result<()> {
    let storage = JsonlActivityStorage::open(dir.join(RECORDS_DIR)).await?;
    let backend = ChatSummarizer::from_settings(settings.summarizer.clone())?;
    let summarizer = ResilientSummarizer::new(Box::new(backend), settings.summarizer.attempts);
    let generator = Generator::new(
        storage,
        settings,
        summarizer,
        ArtifactPaths::new(dir.join(DATA_DIR)),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancelling generation");
            interrupt.cancel();
        }
    });

    let result = match artifact {
        Artifact::Export { refined } => generator
            .export(date, &Local, refined, &cancel)
            .await
            .map(|path| println!("Saved {}", path.display())),
        Artifact::Tree => generator.tree(date, &Local, &cancel).await.map(|(path, tree)| {
            print_tree(&tree);
            println!("Saved {}", path.display());
        }),
    };
    watcher.abort();

    match result {
        Ok(()) => Ok(()),
        Err(e @ GenerateError::NothingToGenerate { .. }) => {
            warn!("{e}");
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_tree(tree: &ConceptTree) {
    fn print_node(tree: &ConceptTree, node: &ConceptNode, depth: usize) {
        println!("{}{} (layer {})", "  ".repeat(depth), node.label, node.layer);
        for child in node.children.iter().filter_map(|id| tree.get(id)) {
            print_node(tree, child, depth + 1);
        }
    }

    if let Some(root) = tree.root() {
        print_node(tree, root, 0);
    }
}
