//! Builds the concept tree of a day from its text segments.
//!
//! Layer 1 holds the typed text. Every Layer-1 node gets concepts extracted from its content and
//! hangs under the first one (Layer 2). Then layers are merged into roughly half as many broader
//! concepts until a single node is left, and a root label is synthesized on top. Each step is a
//! separate call to the [ResilientSummarizer], so a failing step degrades on its own without
//! losing the layers already built.

use std::future::Future;

use chrono::TimeZone;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::LeafGrouping, error::GenerateError, reconstruct::TextSegment,
    utils::time::format_display,
};

use summarizer::ResilientSummarizer;
use tree::{ConceptTree, TreeError};

pub mod chat;
pub mod summarizer;
pub mod tree;

/// A Layer-1 activity before it becomes a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub label: String,
    pub content: String,
}

/// Turns segments into Layer-1 leaves. [LeafGrouping::PerApp] merges all segments of an app
/// into one leaf labelled with the app, in order of first appearance.
pub fn layer_one_leaves<Tz: TimeZone>(
    segments: &[TextSegment],
    grouping: LeafGrouping,
    tz: &Tz,
) -> Vec<Leaf>
where
    Tz::Offset: std::fmt::Display,
{
    let header = |segment: &TextSegment| format_display(&segment.start.with_timezone(tz));
    match grouping {
        LeafGrouping::PerSegment => segments
            .iter()
            .map(|segment| Leaf {
                label: format!("{} at {}", segment.app, header(segment)),
                content: segment.text.clone(),
            })
            .collect(),
        LeafGrouping::PerApp => {
            let mut leaves: Vec<Leaf> = vec![];
            for segment in segments {
                let entry = format!("Timestamp: {}\nContent: {}\n\n", header(segment), segment.text);
                match leaves.iter_mut().find(|l| l.label == *segment.app) {
                    Some(leaf) => leaf.content.push_str(&entry),
                    None => leaves.push(Leaf {
                        label: segment.app.to_string(),
                        content: entry,
                    }),
                }
            }
            leaves
        }
    }
}

/// Runs `step` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = T>,
) -> Result<T, GenerateError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerateError::Cancelled),
        value = step => Ok(value),
    }
}

/// Builds and validates the tree for `leaves`. Fails only when `leaves` is empty or on
/// cancellation; every summarizer failure has a fallback.
#[instrument(skip_all, fields(leaves = leaves.len()))]
pub async fn build_concept_tree(
    leaves: Vec<Leaf>,
    summarizer: &ResilientSummarizer,
    cancel: &CancellationToken,
) -> Result<ConceptTree, GenerateError> {
    if leaves.is_empty() {
        return Err(TreeError::Empty.into());
    }

    let mut tree = ConceptTree::new();
    let leaf_count = leaves.len();
    let mut leaf_ids = Vec::with_capacity(leaf_count);
    for leaf in &leaves {
        leaf_ids.push(tree.add_node(1, leaf.label.clone(), leaf.content.clone()));
    }
    if leaf_count == 1 {
        debug!("Single activity is its own root");
        tree.validate()?;
        return Ok(tree);
    }

    // Layer 2: every leaf goes under the first concept extracted from it.
    let mut concept_children: Vec<(String, Vec<String>)> = vec![];
    for (leaf, leaf_id) in leaves.iter().zip(&leaf_ids) {
        let concepts = cancellable(
            cancel,
            summarizer.extract_concepts(&leaf.label, &leaf.content),
        )
        .await?;
        debug!("Concepts of {}: {concepts:?}", leaf.label);
        let first = concepts
            .into_iter()
            .next()
            .unwrap_or_else(|| leaf.label.to_lowercase());
        match concept_children.iter_mut().find(|(label, _)| *label == first) {
            Some((_, children)) => children.push(leaf_id.clone()),
            None => concept_children.push((first, vec![leaf_id.clone()])),
        }
    }
    let mut current = materialize_layer(&mut tree, 2, concept_children)?;
    let mut layer = 2;

    while current.len() > 1 {
        let labels = labels_of(&tree, &current);
        let target = (labels.len() / 2).max(1);
        let mut broader = cancellable(cancel, summarizer.merge_concepts(&labels, target)).await?;
        if broader.len() >= labels.len() {
            warn!(
                "Merging {} concepts gave {}, keeping the first {target}",
                labels.len(),
                broader.len()
            );
            broader = labels[..target].to_vec();
        }

        let assignment = cancellable(cancel, summarizer.map_concepts(&labels, &broader)).await?;
        let mut children: Vec<Vec<String>> = vec![vec![]; broader.len()];
        for (id, category) in current.iter().zip(assignment) {
            children[category].push(id.clone());
        }

        layer += 1;
        let grouped = broader.into_iter().zip(children).collect();
        current = materialize_layer(&mut tree, layer, grouped)?;
        info!("Layer {layer} has {} concepts", current.len());
    }

    let top_labels = labels_of(&tree, &current);
    let root_label = cancellable(cancel, summarizer.synthesize_root(&top_labels)).await?;
    let root = tree.add_node(layer + 1, root_label, top_labels.join("\n"));
    for id in &current {
        tree.attach(&root, id)?;
    }

    tree.validate()?;
    info!("Built a tree of {} nodes and {} layers", tree.len(), layer + 1);
    Ok(tree)
}

fn labels_of(tree: &ConceptTree, ids: &[String]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| tree.get(id))
        .map(|node| node.label.clone())
        .collect()
}

/// Creates one node per label with at least one child and returns their ids. Content of a
/// synthesized node lists the labels of its children.
fn materialize_layer(
    tree: &mut ConceptTree,
    layer: u32,
    grouped: Vec<(String, Vec<String>)>,
) -> Result<Vec<String>, TreeError> {
    let mut ids = vec![];
    for (label, children) in grouped {
        if children.is_empty() {
            debug!("Concept {label:?} got no children, skipping it");
            continue;
        }
        let content = labels_of(tree, &children).join("\n");
        let id = tree.add_node(layer, label, content);
        for child in &children {
            tree.attach(&id, child)?;
        }
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
        sync::Arc,
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        config::LeafGrouping,
        error::GenerateError,
        reconstruct::TextSegment,
        utils::logging::TEST_LOGGING,
    };

    use super::{
        build_concept_tree, layer_one_leaves,
        summarizer::{MockSummarizer, ResilientSummarizer, SummarizeError, Summarizer},
        Leaf,
    };

    fn leaves(count: usize) -> Vec<Leaf> {
        (0..count)
            .map(|i| Leaf {
                label: format!("app {i}"),
                content: format!("text {i}"),
            })
            .collect()
    }

    fn resilient(backend: impl Summarizer + 'static) -> ResilientSummarizer {
        ResilientSummarizer::new(Box::new(backend), 1).with_retry_delay(Duration::ZERO)
    }

    /// Extracts the leaf's own label and merges pairs of labels, like a well behaved backend.
    struct HalvingSummarizer {
        merges: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Summarizer for HalvingSummarizer {
        async fn refine(&self, text: &str) -> Result<String, SummarizeError> {
            Ok(text.into())
        }

        async fn extract_concepts(
            &self,
            activity: &str,
            _content: &str,
        ) -> Result<Vec<String>, SummarizeError> {
            Ok(vec![format!("{activity} work"), "other".into()])
        }

        async fn merge_concepts(
            &self,
            labels: &[String],
            _target: usize,
        ) -> Result<Vec<String>, SummarizeError> {
            self.merges.fetch_add(1, Ordering::SeqCst);
            Ok(labels.chunks(2).map(|pair| pair.join(" & ")).collect())
        }

        async fn map_concepts(
            &self,
            labels: &[String],
            categories: &[String],
        ) -> Result<HashMap<String, String>, SummarizeError> {
            Ok(labels
                .iter()
                .enumerate()
                .map(|(i, label)| (label.clone(), categories[i / 2].clone()))
                .collect())
        }

        async fn synthesize_root(&self, _labels: &[String]) -> Result<String, SummarizeError> {
            Ok("A Productive Day".into())
        }
    }

    #[tokio::test]
    async fn tree_is_well_formed() -> Result<()> {
        *TEST_LOGGING;
        let merges = Arc::new(AtomicUsize::new(0));
        let summarizer = resilient(HalvingSummarizer {
            merges: merges.clone(),
        });

        let tree = build_concept_tree(leaves(5), &summarizer, &CancellationToken::new()).await?;

        tree.validate()?;
        let root = tree.root().expect("tree has a root");
        assert_eq!(root.label, "a productive day");
        assert_eq!(root.layer, tree.max_layer());
        assert_eq!(tree.nodes().iter().filter(|n| n.layer == 1).count(), 5);
        // "other" never gets a child, so layer 2 has one concept per leaf.
        assert_eq!(tree.nodes().iter().filter(|n| n.layer == 2).count(), 5);
        assert!(tree.nodes().iter().all(|n| !n.label.contains("other")));
        // 5 -> 3 -> 2 -> 1
        assert_eq!(merges.load(Ordering::SeqCst), 3);
        for node in tree.nodes() {
            if let Some(parent) = &node.parent {
                assert!(tree.get(parent).unwrap().children.contains(&node.id));
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn non_reducing_backend_still_terminates() -> Result<()> {
        let mut mock = MockSummarizer::new();
        mock.expect_extract_concepts()
            .returning(|activity, _| Ok(vec![activity.to_string()]));
        mock.expect_merge_concepts()
            .returning(|labels, _| Ok(labels.iter().map(|l| format!("{l} again")).collect()));
        mock.expect_map_concepts()
            .returning(|_, _| Err(SummarizeError::EmptyResponse));
        mock.expect_synthesize_root()
            .times(1)
            .returning(|_| Err(SummarizeError::EmptyResponse));

        let tree = build_concept_tree(leaves(9), &resilient(mock), &CancellationToken::new())
            .await?;

        tree.validate()?;
        // 9 -> 4 -> 2 -> 1, then the root
        assert_eq!(tree.max_layer(), 6);
        let root = tree.root().unwrap();
        assert_eq!(root.layer, 6);
        assert_eq!(root.children.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn single_leaf_is_the_root() -> Result<()> {
        let mock = MockSummarizer::new();

        let tree = build_concept_tree(leaves(1), &resilient(mock), &CancellationToken::new())
            .await?;

        assert_eq!(tree.len(), 1);
        let root = tree.root().unwrap();
        assert_eq!(root.layer, 1);
        assert!(root.children.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn identical_concepts_share_a_node() -> Result<()> {
        let mut mock = MockSummarizer::new();
        mock.expect_extract_concepts()
            .returning(|_, _| Ok(vec!["Coding".into(), "rust".into()]));
        mock.expect_synthesize_root()
            .returning(|_| Ok("\"Coding all day\"".into()));

        let tree = build_concept_tree(leaves(3), &resilient(mock), &CancellationToken::new())
            .await?;

        tree.validate()?;
        let coding = tree.get("L2_coding").unwrap();
        assert_eq!(coding.children.len(), 3);
        assert_eq!(tree.root().unwrap().label, "coding all day");
        assert_eq!(tree.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_stops_generation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut mock = MockSummarizer::new();
        mock.expect_extract_concepts()
            .returning(|_, _| Ok(vec!["x".into()]));

        let result = build_concept_tree(leaves(2), &resilient(mock), &cancel).await;
        assert!(matches!(result, Err(GenerateError::Cancelled)));
    }

    #[test]
    fn segments_are_grouped_by_app() {
        let at = |hour| Utc.with_ymd_and_hms(2026, 1, 8, hour, 0, 0).unwrap();
        let segment = |hour, app: &str, text: &str| TextSegment {
            start: at(hour),
            end: at(hour + 1),
            app: app.into(),
            text: text.into(),
        };
        let segments = [
            segment(9, "editor", "fn main"),
            segment(9, "chat", "hi"),
            segment(10, "editor", "cargo"),
        ];

        let per_app = layer_one_leaves(&segments, LeafGrouping::PerApp, &Utc);
        assert_eq!(per_app.len(), 2);
        assert_eq!(per_app[0].label, "editor");
        assert_eq!(
            per_app[0].content,
            "Timestamp: 8 Jan 2026 at 9:00 AM\nContent: fn main\n\n\
             Timestamp: 8 Jan 2026 at 10:00 AM\nContent: cargo\n\n"
        );

        let per_segment = layer_one_leaves(&segments, LeafGrouping::PerSegment, &Utc);
        assert_eq!(per_segment.len(), 3);
        assert_eq!(per_segment[2].label, "editor at 8 Jan 2026 at 10:00 AM");
        assert_eq!(per_segment[2].content, "cargo");
    }
}
