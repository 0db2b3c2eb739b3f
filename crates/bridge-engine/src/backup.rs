//! Tree backup under pluggable opponent and partner models.
//!
//! Determinized search is prone to strategy fusion: a move that looks
//! best averaged over sampled worlds can be poor against the real
//! uncertainty. The models here let callers pick how optimistically
//! partner nodes and how pessimistically opponent nodes are collapsed.

use crate::tree::{Node, Role, Tree};
use bridge_core::model::card::Card;
use std::collections::HashMap;
use std::sync::Arc;

const WINRATE_EPSILON: f64 = 1e-9;
const TRICK_TIEBREAK: f64 = 1e-3;

/// Leaf value: the winrate, except at the certain ends where a small
/// trick-ratio term keeps more tricks preferable.
pub fn score(node: &Node) -> f64 {
    let winrate = node.winrate();
    let ratio = node.avg_tricks() / 13.0;
    if winrate < WINRATE_EPSILON {
        -TRICK_TIEBREAK * (1.0 - ratio)
    } else if winrate > 1.0 - WINRATE_EPSILON {
        1.0 + TRICK_TIEBREAK * ratio
    } else {
        winrate
    }
}

/// Collapses one interior node given a valuation of its successors.
pub trait BackupModel: Send + Sync {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64;
}

/// Best child: the node's side is assumed to find its best line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Optimistic;

impl BackupModel for Optimistic {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        node.children()
            .iter()
            .map(|(child, _)| value(child))
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Worst child: the node's side is assumed to play against us.
#[derive(Debug, Default, Clone, Copy)]
pub struct Adversarial;

impl BackupModel for Adversarial {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        node.children()
            .iter()
            .map(|(child, _)| value(child))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Visit-weighted average under the node's policy distribution. A node
/// without observed successors contributes the empty sum, zero.
#[derive(Debug, Clone, Copy)]
pub struct Expectation {
    prior: f64,
}

impl Expectation {
    pub fn new(prior: f64) -> Self {
        Self { prior }
    }
}

impl BackupModel for Expectation {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        node.policy(self.prior)
            .iter()
            .map(|(child, p)| p * value(child))
            .sum()
    }
}

/// `(1 - lambda) * extreme + lambda * expectation`, where the extreme is
/// the maximum for partner nodes and the minimum otherwise.
#[derive(Debug, Clone, Copy)]
pub struct LinearBlend {
    lambda: f64,
    prior: f64,
}

impl LinearBlend {
    pub fn new(lambda: f64, prior: f64) -> Self {
        Self { lambda, prior }
    }
}

impl BackupModel for LinearBlend {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        let extreme = if node.role() == Role::Partner {
            Optimistic.backup(node, value)
        } else {
            Adversarial.backup(node, value)
        };
        let expectation = Expectation::new(self.prior).backup(node, value);
        (1.0 - self.lambda) * extreme + self.lambda * expectation
    }
}

/// Smooth maximum at temperature `tau`, computed in log-sum-exp form so
/// large child values cannot overflow.
#[derive(Debug, Clone, Copy)]
pub struct SoftMax {
    tau: f64,
    prior: f64,
}

impl SoftMax {
    pub fn new(tau: f64, prior: f64) -> Self {
        Self { tau, prior }
    }
}

fn soft_extreme(
    node: &Node,
    value: &mut dyn FnMut(&Arc<Node>) -> f64,
    tau: f64,
    prior: f64,
    sign: f64,
) -> f64 {
    let weighted: Vec<(f64, f64)> = node
        .policy(prior)
        .iter()
        .map(|(child, p)| (*p, sign * value(child)))
        .collect();
    if weighted.is_empty() {
        return 0.0;
    }
    let shift = weighted
        .iter()
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = weighted
        .iter()
        .map(|(p, v)| p * ((v - shift) / tau).exp())
        .sum();
    sign * (tau * sum.ln() + shift)
}

impl BackupModel for SoftMax {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        soft_extreme(node, value, self.tau, self.prior, 1.0)
    }
}

/// Smooth minimum: the softmax of negated values, negated back.
#[derive(Debug, Clone, Copy)]
pub struct SoftMin {
    tau: f64,
    prior: f64,
}

impl SoftMin {
    pub fn new(tau: f64, prior: f64) -> Self {
        Self { tau, prior }
    }
}

impl BackupModel for SoftMin {
    fn backup(&self, node: &Node, value: &mut dyn FnMut(&Arc<Node>) -> f64) -> f64 {
        soft_extreme(node, value, self.tau, self.prior, -1.0)
    }
}

/// Walks a finished tree and values each root move.
pub struct Evaluator<'a> {
    opponent: &'a dyn BackupModel,
    partner: &'a dyn BackupModel,
}

impl<'a> Evaluator<'a> {
    pub fn new(opponent: &'a dyn BackupModel, partner: &'a dyn BackupModel) -> Self {
        Self { opponent, partner }
    }

    /// Per-card values over the root's edges, each edge weighted by its
    /// observed successor distribution.
    pub fn evaluate(&self, tree: &Tree) -> HashMap<Card, f64> {
        let mut scores = HashMap::new();
        for (card, edge) in tree.root().edges() {
            let dynamics = edge.dynamics(0.0);
            if dynamics.is_empty() {
                continue;
            }
            let value: f64 = dynamics
                .iter()
                .map(|(child, p)| p * self.value(child))
                .sum();
            scores.insert(card, value);
        }
        scores
    }

    pub fn value(&self, node: &Arc<Node>) -> f64 {
        let children = node.children();
        if children.is_empty() {
            return score(node);
        }
        match node.role() {
            Role::Actor => children
                .iter()
                .map(|(child, _)| self.value(child))
                .fold(f64::NEG_INFINITY, f64::max),
            Role::Partner => self.partner.backup(node, &mut |child| self.value(child)),
            Role::Opponent => self.opponent.backup(node, &mut |child| self.value(child)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Adversarial, BackupModel, Evaluator, Expectation, LinearBlend, Optimistic, SoftMax,
        SoftMin, score,
    };
    use crate::tree::{Node, Role, Tree};
    use bridge_core::model::card::Card;
    use std::sync::Arc;

    fn card(text: &str) -> Card {
        Card::parse(text).unwrap()
    }

    /// Leaf recorded `wins` wins out of `evals`, each worth `tricks`.
    fn leaf(tree: &Tree, key: u64, role: Role, wins: u32, evals: u32, tricks: u8) -> Arc<Node> {
        let node = tree.get_or_create(key, role);
        for i in 0..evals {
            node.record(i < wins, tricks);
        }
        node
    }

    #[test]
    fn score_boosts_certain_wins_and_orders_certain_losses_by_tricks() {
        let tree = Tree::new();
        let won = leaf(&tree, 1, Role::Opponent, 4, 4, 9);
        let lost_few = leaf(&tree, 2, Role::Opponent, 0, 4, 2);
        let lost_more = leaf(&tree, 3, Role::Opponent, 0, 4, 6);
        let mixed = leaf(&tree, 4, Role::Opponent, 1, 4, 6);

        assert!(score(&won) > 1.0);
        assert!(score(&lost_few) < 0.0 && score(&lost_more) < 0.0);
        assert!(score(&lost_more) > score(&lost_few));
        assert!((score(&mixed) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn evaluator_scores_each_root_edge() {
        let tree = Tree::new();
        let good = leaf(&tree, 1, Role::Opponent, 3, 3, 9);
        let bad = leaf(&tree, 2, Role::Opponent, 0, 3, 4);
        tree.root().edge(card("2C")).update(&good);
        tree.root().edge(card("3C")).update(&bad);

        let evaluator = Evaluator::new(&Adversarial, &Optimistic);
        let scores = evaluator.evaluate(&tree);
        assert_eq!(scores.len(), 2);
        assert!((scores[&card("2C")] - score(&good)).abs() < 1e-12);
        assert!((scores[&card("3C")] - score(&bad)).abs() < 1e-12);
    }

    #[test]
    fn opponent_nodes_collapse_to_their_worst_child_for_us() {
        let tree = Tree::new();
        let interior = tree.get_or_create(10, Role::Opponent);
        let high = leaf(&tree, 11, Role::Actor, 2, 2, 10);
        let low = leaf(&tree, 12, Role::Actor, 0, 2, 3);
        interior.edge(card("4D")).update(&high);
        interior.edge(card("5D")).update(&low);
        tree.root().edge(card("AS")).update(&interior);

        let evaluator = Evaluator::new(&Adversarial, &Optimistic);
        let scores = evaluator.evaluate(&tree);
        assert!((scores[&card("AS")] - score(&low)).abs() < 1e-12);
    }

    #[test]
    fn partner_nodes_use_the_partner_model() {
        let tree = Tree::new();
        let interior = tree.get_or_create(20, Role::Partner);
        let high = leaf(&tree, 21, Role::Actor, 2, 2, 10);
        let low = leaf(&tree, 22, Role::Actor, 0, 2, 3);
        interior.edge(card("4D")).update(&high);
        interior.edge(card("5D")).update(&low);
        tree.root().edge(card("AS")).update(&interior);

        let optimistic = Evaluator::new(&Adversarial, &Optimistic).evaluate(&tree);
        assert!((optimistic[&card("AS")] - score(&high)).abs() < 1e-12);

        let pessimistic = Evaluator::new(&Adversarial, &Adversarial).evaluate(&tree);
        assert!((pessimistic[&card("AS")] - score(&low)).abs() < 1e-12);
    }

    #[test]
    fn expectation_over_a_leaf_is_the_empty_sum() {
        let tree = Tree::new();
        let node = leaf(&tree, 1, Role::Opponent, 1, 2, 5);
        let value = Expectation::new(0.5).backup(&node, &mut |_| panic!("leaf has no children"));
        assert_eq!(value, 0.0);
    }

    #[test]
    fn expectation_weights_children_by_visits() {
        let tree = Tree::new();
        let interior = tree.get_or_create(30, Role::Opponent);
        let a = tree.get_or_create(31, Role::Actor);
        let b = tree.get_or_create(32, Role::Actor);
        let edge = interior.edge(card("7H"));
        edge.update(&a);
        edge.update(&a);
        edge.update(&a);
        edge.update(&b);

        let value = Expectation::new(0.0).backup(&interior, &mut |child| {
            if child.key() == 31 { 1.0 } else { 0.0 }
        });
        assert!((value - 0.75).abs() < 1e-12);
    }

    #[test]
    fn linear_blend_degenerates_at_the_endpoints() {
        let tree = Tree::new();
        let opponent = tree.get_or_create(40, Role::Opponent);
        let a = tree.get_or_create(41, Role::Actor);
        let b = tree.get_or_create(42, Role::Actor);
        opponent.edge(card("2C")).update(&a);
        opponent.edge(card("3C")).update(&b);

        let mut values = |child: &Arc<Node>| if child.key() == 41 { 0.8 } else { 0.2 };

        let blend0 = LinearBlend::new(0.0, 0.0).backup(&opponent, &mut values);
        let pure_min = Adversarial.backup(&opponent, &mut values);
        assert!((blend0 - pure_min).abs() < 1e-12);

        let blend1 = LinearBlend::new(1.0, 0.0).backup(&opponent, &mut values);
        let pure_expectation = Expectation::new(0.0).backup(&opponent, &mut values);
        assert!((blend1 - pure_expectation).abs() < 1e-12);

        let partner = tree.get_or_create(50, Role::Partner);
        partner.edge(card("2C")).update(&a);
        partner.edge(card("3C")).update(&b);
        let blend0 = LinearBlend::new(0.0, 0.0).backup(&partner, &mut values);
        let pure_max = Optimistic.backup(&partner, &mut values);
        assert!((blend0 - pure_max).abs() < 1e-12);
    }

    fn two_child_node(tree: &Tree, key: u64) -> Arc<Node> {
        let node = tree.get_or_create(key, Role::Partner);
        let a = tree.get_or_create(key + 1, Role::Actor);
        let b = tree.get_or_create(key + 2, Role::Actor);
        node.edge(card("2C")).update(&a);
        node.edge(card("3C")).update(&b);
        node
    }

    #[test]
    fn softmax_approaches_the_maximum_as_tau_vanishes() {
        let tree = Tree::new();
        let node = two_child_node(&tree, 60);
        let mut values = |child: &Arc<Node>| if child.key() == 61 { 0.7 } else { 0.3 };
        let value = SoftMax::new(1e-4, 0.0).backup(&node, &mut values);
        assert!((value - 0.7).abs() < 1e-3);
    }

    #[test]
    fn softmax_approaches_the_expectation_as_tau_grows() {
        let tree = Tree::new();
        let node = two_child_node(&tree, 70);
        let mut values = |child: &Arc<Node>| if child.key() == 71 { 0.7 } else { 0.3 };
        let value = SoftMax::new(1e9, 0.0).backup(&node, &mut values);
        assert!((value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn softmax_is_stable_for_huge_values() {
        let tree = Tree::new();
        let node = two_child_node(&tree, 80);
        let mut values = |child: &Arc<Node>| if child.key() == 81 { 1e6 } else { 1e6 + 1.0 };
        let value = SoftMax::new(1.0, 0.0).backup(&node, &mut values);
        assert!(value.is_finite());
        assert!((1e6..=1e6 + 1.0).contains(&value));
    }

    #[test]
    fn softmin_mirrors_softmax() {
        let tree = Tree::new();
        let node = two_child_node(&tree, 90);
        let mut values = |child: &Arc<Node>| if child.key() == 91 { 0.7 } else { 0.3 };
        let value = SoftMin::new(1e-4, 0.0).backup(&node, &mut values);
        assert!((value - 0.3).abs() < 1e-3);

        let mut huge = |child: &Arc<Node>| if child.key() == 91 { -1e6 } else { -1e6 - 1.0 };
        let value = SoftMin::new(1.0, 0.0).backup(&node, &mut huge);
        assert!(value.is_finite());
        assert!((-1e6 - 1.0..=-1e6).contains(&value));
    }
}
