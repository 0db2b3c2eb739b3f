//! Shared information-set tree.
//!
//! Nodes are keyed by the 64-bit public play history; key zero is the
//! root. Workers race on get-or-insert, so node construction has no
//! side effects on the tree and a losing insert is simply dropped.
//! Statistics are per-field atomics; readers see a consistent but
//! possibly stale snapshot.

use bridge_core::model::card::Card;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Which model backs a node up: the seat the search acts for, its
/// partner, or an opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Actor,
    Partner,
    Opponent,
}

pub struct Tree {
    root: Arc<Node>,
    nodes: RwLock<HashMap<u64, Arc<Node>>>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::new(0, Role::Actor)),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Nodes created beyond the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Key zero designates the root, whose role is fixed. Anything else
    /// is atomically fetched or inserted with the caller's role.
    pub fn get_or_create(&self, key: u64, role: Role) -> Arc<Node> {
        if key == 0 {
            return Arc::clone(&self.root);
        }
        if let Some(node) = self.nodes.read().get(&key) {
            return Arc::clone(node);
        }
        Arc::clone(
            self.nodes
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Node::new(key, role))),
        )
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Node {
    key: u64,
    role: Role,
    edges: Mutex<HashMap<Card, Arc<Edge>>>,
    evals: AtomicU32,
    wins: AtomicU32,
    trick_sum: AtomicU64,
}

impl Node {
    fn new(key: u64, role: Role) -> Self {
        Self {
            key,
            role,
            edges: Mutex::new(HashMap::new()),
            evals: AtomicU32::new(0),
            wins: AtomicU32::new(0),
            trick_sum: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Record one leaf evaluation.
    pub fn record(&self, win: bool, tricks: u8) {
        self.evals.fetch_add(1, Ordering::Relaxed);
        self.trick_sum.fetch_add(tricks as u64, Ordering::Relaxed);
        if win {
            self.wins.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn evals(&self) -> u32 {
        self.evals.load(Ordering::Relaxed)
    }

    pub fn winrate(&self) -> f64 {
        let evals = self.evals.load(Ordering::Relaxed);
        if evals == 0 {
            return 0.0;
        }
        self.wins.load(Ordering::Relaxed) as f64 / evals as f64
    }

    pub fn avg_tricks(&self) -> f64 {
        let evals = self.evals.load(Ordering::Relaxed);
        if evals == 0 {
            return 0.0;
        }
        self.trick_sum.load(Ordering::Relaxed) as f64 / evals as f64
    }

    /// Get-or-insert the outgoing edge for a card.
    pub fn edge(&self, card: Card) -> Arc<Edge> {
        Arc::clone(
            self.edges
                .lock()
                .entry(card)
                .or_insert_with(|| Arc::new(Edge::new())),
        )
    }

    /// Outgoing edges in card order, so downstream aggregation does not
    /// depend on hash iteration order.
    pub fn edges(&self) -> Vec<(Card, Arc<Edge>)> {
        let mut edges: Vec<(Card, Arc<Edge>)> = self
            .edges
            .lock()
            .iter()
            .map(|(card, edge)| (*card, Arc::clone(edge)))
            .collect();
        edges.sort_by_key(|(card, _)| card.to_id());
        edges
    }

    /// Successor nodes aggregated over every outgoing edge, with the
    /// number of times each was visited, in key order.
    pub fn children(&self) -> Vec<(Arc<Node>, u32)> {
        let mut merged: HashMap<u64, (Arc<Node>, u32)> = HashMap::new();
        for (_, edge) in self.edges() {
            for (child, count) in edge.successors() {
                merged
                    .entry(child.key())
                    .and_modify(|slot| slot.1 += count)
                    .or_insert((child, count));
            }
        }
        let mut children: Vec<(Arc<Node>, u32)> = merged.into_values().collect();
        children.sort_by_key(|(child, _)| child.key());
        children
    }

    /// Visit-frequency action distribution smoothed by `prior`. The
    /// denominator never drops below the child count, so a barely
    /// visited node still yields proper weights.
    pub fn policy(&self, prior: f64) -> Vec<(Arc<Node>, f64)> {
        let children = self.children();
        if children.is_empty() {
            return Vec::new();
        }
        let count = children.len() as f64;
        let total: u32 = children.iter().map(|(_, visits)| *visits).sum();
        let denominator = (total as f64 + prior * count).max(count);
        children
            .into_iter()
            .map(|(child, visits)| (child, (visits as f64 + prior) / denominator))
            .collect()
    }
}

pub struct Edge {
    total: AtomicU32,
    successors: Mutex<HashMap<u64, (Arc<Node>, u32)>>,
}

impl Edge {
    fn new() -> Self {
        Self {
            total: AtomicU32::new(0),
            successors: Mutex::new(HashMap::new()),
        }
    }

    pub fn total(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }

    /// Count an observed transition into `child`.
    pub fn update(&self, child: &Arc<Node>) {
        let mut successors = self.successors.lock();
        successors
            .entry(child.key())
            .and_modify(|slot| slot.1 += 1)
            .or_insert((Arc::clone(child), 1));
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successors(&self) -> Vec<(Arc<Node>, u32)> {
        let mut successors: Vec<(Arc<Node>, u32)> = self
            .successors
            .lock()
            .values()
            .map(|(child, count)| (Arc::clone(child), *count))
            .collect();
        successors.sort_by_key(|(child, _)| child.key());
        successors
    }

    /// Smoothed successor distribution; empty without observations.
    pub fn dynamics(&self, prior: f64) -> Vec<(Arc<Node>, f64)> {
        let successors = self.successors();
        if successors.is_empty() {
            return Vec::new();
        }
        let count = successors.len() as f64;
        let total: u32 = successors.iter().map(|(_, visits)| *visits).sum();
        let denominator = total as f64 + prior * count;
        successors
            .into_iter()
            .map(|(child, visits)| (child, (visits as f64 + prior) / denominator))
            .collect()
    }
}
