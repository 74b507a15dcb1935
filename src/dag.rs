// ABOUTME: DAG engine: sub-DAG construction, chain-preserving topological sort, history build
// ABOUTME: Reconstructs model-ready conversation history from a set of parent message IDs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # DAG Engine
//!
//! A braid conversation is a DAG of message nodes. Before a new question is
//! answered, the engine walks `parent_ids` upward from the question's
//! parents to collect exactly the ancestor branches that matter (the
//! sub-DAG), then linearizes them so the model sees a coherent history.
//!
//! The linearization is a modified Kahn sort with three extra rules on top
//! of dependency order:
//!
//! - the root (the one node with no parents inside the sub-DAG) comes first;
//! - a chain link (a node whose only sub-DAG child has it as its only
//!   sub-DAG parent) is never cleaved, so question/answer pairs and linear
//!   runs stay contiguous;
//! - ties between simultaneously-ready nodes break on creation timestamp,
//!   then ID, making the ordering deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::llm::ChatMessage;
#[cfg(test)]
use crate::llm::MessageRole;
use crate::models::MessageNode;
use crate::store::MessageStore;

/// Nodes fetched per store round-trip during the upward walk
const FETCH_BATCH_SIZE: usize = 100;

/// Upper bound on BFS rounds; stops runaway traversal over corrupted graphs
const MAX_TRAVERSAL_DEPTH: usize = 2000;

/// An ancestor closure: the nodes reachable upward from a seed set, plus the
/// directed edges among them
#[derive(Debug, Default)]
pub struct SubDag {
    /// Node ID to node
    pub nodes: HashMap<String, MessageNode>,
    /// Parent ID to child IDs, restricted to sub-DAG members
    pub edges: HashMap<String, Vec<String>>,
}

impl SubDag {
    /// Assemble a sub-DAG from a set of nodes
    ///
    /// Edges are derived from `parent_ids` (the authoritative direction);
    /// the denormalized `children` field is ignored so a divergent reverse
    /// edge cannot corrupt ordering.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = MessageNode>) -> Self {
        let nodes: HashMap<String, MessageNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes.values() {
            for parent_id in &node.parent_ids {
                if nodes.contains_key(parent_id) {
                    edges
                        .entry(parent_id.clone())
                        .or_default()
                        .push(node.id.clone());
                }
            }
        }
        // Deterministic edge order regardless of map iteration
        for children in edges.values_mut() {
            children.sort();
        }

        Self { nodes, edges }
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the sub-DAG is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A node's parent count restricted to sub-DAG members
    fn parent_count_within(&self, id: &str) -> usize {
        self.nodes.get(id).map_or(0, |n| {
            n.parent_ids
                .iter()
                .filter(|p| self.nodes.contains_key(p.as_str()))
                .count()
        })
    }
}

/// Walk `parent_ids` upward from the seed set and collect the ancestor closure
///
/// Traversal is a breadth-first walk with batched store reads. Unknown IDs
/// are skipped rather than treated as fatal: a dangling reference costs that
/// branch its history but never the request. The seed nodes themselves are
/// part of the result.
///
/// # Errors
///
/// Returns a store error if a batch read fails twice.
pub async fn build_sub_dag(
    store: &dyn MessageStore,
    parent_ids: &[String],
) -> AppResult<SubDag> {
    let mut queue: VecDeque<String> = parent_ids
        .iter()
        .filter(|id| !id.is_empty())
        .cloned()
        .collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut collected: Vec<MessageNode> = Vec::new();
    let mut rounds = 0_usize;

    while !queue.is_empty() && rounds < MAX_TRAVERSAL_DEPTH {
        let batch: Vec<String> = {
            let take = queue.len().min(FETCH_BATCH_SIZE);
            queue.drain(..take).filter(|id| !visited.contains(id)).collect()
        };
        if batch.is_empty() {
            rounds += 1;
            continue;
        }

        let fetched = match store.get_many(&batch).await {
            Ok(fetched) => fetched,
            // Transient read: retry once, then give up
            Err(first_err) => {
                debug!("Retrying batch fetch after store error: {first_err}");
                store.get_many(&batch).await?
            }
        };

        for (id, node) in fetched {
            if visited.insert(id) {
                for parent_id in &node.parent_ids {
                    if !parent_id.is_empty() && !visited.contains(parent_id) {
                        queue.push_back(parent_id.clone());
                    }
                }
                collected.push(node);
            }
        }

        rounds += 1;
    }

    if rounds >= MAX_TRAVERSAL_DEPTH && !queue.is_empty() {
        warn!("Sub-DAG traversal stopped at depth limit ({MAX_TRAVERSAL_DEPTH})");
    }

    let dag = SubDag::from_nodes(collected);
    debug!(
        "Sub-DAG built: {} node(s), {} edge(s)",
        dag.len(),
        dag.edges.values().map(Vec::len).sum::<usize>()
    );
    Ok(dag)
}

/// Heap key ordering the ready set by creation time, then ID
type ReadyKey = Reverse<(DateTime<Utc>, String)>;

/// Linearize a sub-DAG deterministically without cleaving chains
///
/// Modified Kahn: nodes become ready when all their in-sub-DAG parents have
/// been emitted; the ready set is a min-heap on `(created_at, id)`. After
/// emitting a node with exactly one child whose only parent it is, that
/// child is emitted immediately instead of going through the heap, which
/// keeps Q/A pairs and longer linear runs adjacent in the output.
///
/// # Errors
///
/// Returns an `InvalidDag` error if the input contains a cycle (some nodes
/// can never become ready).
pub fn topological_sort(dag: &SubDag) -> AppResult<Vec<String>> {
    if dag.is_empty() {
        return Ok(Vec::new());
    }

    // Immutable parent counts for the chain-link test, mutable remaining
    // counts for readiness tracking.
    let mut parent_count: HashMap<&str, usize> = HashMap::with_capacity(dag.len());
    for id in dag.nodes.keys() {
        parent_count.insert(id.as_str(), dag.parent_count_within(id));
    }
    let mut remaining: HashMap<&str, usize> = parent_count.clone();

    let mut ready: BinaryHeap<ReadyKey> = BinaryHeap::new();
    for (id, count) in &parent_count {
        if *count == 0 {
            let node = &dag.nodes[*id];
            ready.push(Reverse((node.created_at, (*id).to_owned())));
        }
    }

    let mut order: Vec<String> = Vec::with_capacity(dag.len());

    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id.clone());
        let mut current = id;

        // Follow the chain as far as it stays unbranched in both directions.
        loop {
            let children = dag.edges.get(&current).map_or(&[] as &[String], Vec::as_slice);
            let chain_child = match children {
                [only] if parent_count.get(only.as_str()) == Some(&1) => Some(only.clone()),
                _ => None,
            };

            match chain_child {
                Some(child) => {
                    // Consumed outside the heap; mark it so it never becomes
                    // ready a second time.
                    remaining.insert(dag.nodes[&child].id.as_str(), 0);
                    order.push(child.clone());
                    current = child;
                }
                None => {
                    // Release the children of the chain's final node.
                    for child in children {
                        if let Some(slot) = remaining.get_mut(child.as_str()) {
                            if *slot > 0 {
                                *slot -= 1;
                                if *slot == 0 {
                                    let node = &dag.nodes[child];
                                    ready.push(Reverse((node.created_at, child.clone())));
                                }
                            }
                        }
                    }
                    break;
                }
            }
        }
    }

    if order.len() != dag.len() {
        return Err(AppError::invalid_dag(format!(
            "Message graph contains a cycle: ordered {} of {} node(s)",
            order.len(),
            dag.len()
        )));
    }

    Ok(order)
}

/// Transform an ordered node sequence into the role-tagged history for a model
///
/// Empty-content nodes (partial writes from interrupted runs) are dropped,
/// and reasoning traces are never fed back to the model.
#[must_use]
pub fn format_history(dag: &SubDag, order: &[String]) -> Vec<ChatMessage> {
    order
        .iter()
        .filter_map(|id| dag.nodes.get(id))
        .filter(|node| !node.content.is_empty())
        .map(|node| ChatMessage::new(node.role, node.content.clone()))
        .collect()
}

/// Build the model-ready history for a new question under `parent_ids`
///
/// An empty seed set, or one that resolves to no known nodes, yields an
/// empty history: the caller treats that as the first question of the
/// conversation.
///
/// # Errors
///
/// Returns an `InvalidDag` error for cyclic graphs and a store error if
/// reads fail.
pub async fn build_history(
    store: &dyn MessageStore,
    parent_ids: &[String],
) -> AppResult<Vec<ChatMessage>> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }

    let dag = build_sub_dag(store, parent_ids).await?;
    if dag.is_empty() {
        warn!("No known message nodes among parents {parent_ids:?}; treating as first question");
        return Ok(Vec::new());
    }

    let order = topological_sort(&dag)?;
    debug!("History linearized across {} node(s)", order.len());
    Ok(format_history(&dag, &order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(
        id: &str,
        role: MessageRole,
        parents: &[&str],
        created_offset_secs: i64,
    ) -> MessageNode {
        MessageNode {
            id: id.to_owned(),
            conversation_id: "c1".to_owned(),
            role,
            content: format!("content of {id}"),
            reasoning: None,
            model: None,
            parent_ids: parents.iter().map(|p| (*p).to_owned()).collect(),
            children: Vec::new(),
            created_at: Utc.timestamp_opt(1_700_000_000 + created_offset_secs, 0).unwrap(),
        }
    }

    fn assert_dependencies_respected(dag: &SubDag, order: &[String]) {
        let index: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        for n in dag.nodes.values() {
            for parent in &n.parent_ids {
                if dag.nodes.contains_key(parent) {
                    assert!(
                        index[parent.as_str()] < index[n.id.as_str()],
                        "{parent} must precede {}",
                        n.id
                    );
                }
            }
        }
    }

    #[test]
    fn linear_chain_stays_in_order() {
        let dag = SubDag::from_nodes(vec![
            node("u1", MessageRole::User, &[], 0),
            node("a1", MessageRole::Assistant, &["u1"], 1),
            node("u2", MessageRole::User, &["a1"], 2),
            node("a2", MessageRole::Assistant, &["u2"], 3),
        ]);

        let order = topological_sort(&dag).unwrap();
        assert_eq!(order, vec!["u1", "a1", "u2", "a2"]);
    }

    #[test]
    fn branches_keep_qa_pairs_adjacent() {
        // u1 -> a1 branches into (u2 -> a2) and (u3 -> a3); u3 created later
        let dag = SubDag::from_nodes(vec![
            node("u1", MessageRole::User, &[], 0),
            node("a1", MessageRole::Assistant, &["u1"], 1),
            node("u2", MessageRole::User, &["a1"], 2),
            node("a2", MessageRole::Assistant, &["u2"], 3),
            node("u3", MessageRole::User, &["a1"], 4),
            node("a3", MessageRole::Assistant, &["u3"], 5),
        ]);

        let order = topological_sort(&dag).unwrap();
        assert_eq!(order[..2], ["u1", "a1"]);
        assert_dependencies_respected(&dag, &order);

        // Each Q/A pair is contiguous
        let index: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        assert_eq!(index["a2"], index["u2"] + 1);
        assert_eq!(index["a3"], index["u3"] + 1);

        // Earlier-created branch comes first
        assert!(index["u2"] < index["u3"]);
    }

    #[test]
    fn merge_point_waits_for_both_branches() {
        // Two branches under a1 merged by u4
        let dag = SubDag::from_nodes(vec![
            node("u1", MessageRole::User, &[], 0),
            node("a1", MessageRole::Assistant, &["u1"], 1),
            node("u2", MessageRole::User, &["a1"], 2),
            node("a2", MessageRole::Assistant, &["u2"], 3),
            node("u3", MessageRole::User, &["a1"], 4),
            node("a3", MessageRole::Assistant, &["u3"], 5),
            node("u4", MessageRole::User, &["a2", "a3"], 6),
        ]);

        let order = topological_sort(&dag).unwrap();
        assert_dependencies_respected(&dag, &order);
        assert_eq!(order.first().map(String::as_str), Some("u1"));
        assert_eq!(order.last().map(String::as_str), Some("u4"));
        assert_eq!(order.len(), 7);
    }

    #[test]
    fn sort_is_deterministic() {
        let build = || {
            SubDag::from_nodes(vec![
                node("u1", MessageRole::User, &[], 0),
                node("a1", MessageRole::Assistant, &["u1"], 1),
                node("u2", MessageRole::User, &["a1"], 2),
                node("u3", MessageRole::User, &["a1"], 2), // same timestamp: ID breaks the tie
            ])
        };

        let first = topological_sort(&build()).unwrap();
        let second = topological_sort(&build()).unwrap();
        assert_eq!(first, second);

        let index: HashMap<&str, usize> =
            first.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        assert!(index["u2"] < index["u3"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let dag = SubDag::from_nodes(vec![
            node("x", MessageRole::User, &["y"], 0),
            node("y", MessageRole::Assistant, &["x"], 1),
        ]);

        let err = topological_sort(&dag).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::InvalidDag);
    }

    #[test]
    fn edges_ignore_out_of_dag_parents() {
        // u2's second parent is not part of the node set and must not count
        let dag = SubDag::from_nodes(vec![
            node("u1", MessageRole::User, &[], 0),
            node("u2", MessageRole::User, &["u1", "elsewhere"], 1),
        ]);

        assert_eq!(dag.parent_count_within("u2"), 1);
        let order = topological_sort(&dag).unwrap();
        assert_eq!(order, vec!["u1", "u2"]);
    }

    #[test]
    fn formatter_drops_empty_content_and_reasoning() {
        let mut interrupted = node("a2", MessageRole::Assistant, &["u1"], 2);
        interrupted.content = String::new();

        let mut answered = node("a1", MessageRole::Assistant, &["u1"], 1);
        answered.reasoning = Some("chain of thought".to_owned());

        let dag = SubDag::from_nodes(vec![
            node("u1", MessageRole::User, &[], 0),
            answered,
            interrupted,
        ]);
        let order = topological_sort(&dag).unwrap();
        let history = format_history(&dag, &order);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].role, MessageRole::Assistant);
        // Reasoning is not part of what goes back to the model
        assert_eq!(history[1].content, "content of a1");
    }
}
