//! Determinization: random full deals consistent with the game so far.
//!
//! The sampler snapshots a game with the current trick *unplayed*, so
//! every generated world starts from a trick boundary holding the full
//! original hands (played cards included). Constraints filter on those
//! original hands; synchronization then strips the cards already seen
//! and replays the trick in progress.

use crate::world::World;
use bridge_core::game::GameState;
use bridge_core::model::card::Card;
use bridge_core::model::cards::CardSet;
use bridge_core::model::constraints::HandConstraints;
use bridge_core::model::contract::Strain;
use bridge_core::model::hand::Hand;
use bridge_core::model::player::{Seat, Side};
use bridge_core::model::suit::Suit;
use bridge_core::model::trick::Trick;
use rand::Rng;
use rand::seq::SliceRandom;
use std::array;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Sampler {
    /// Pinned cards per seat: current holding plus everything the seat
    /// already played, with the in-progress trick restored.
    known: [CardSet; 4],
    /// Completed-trick plays, removed again when a world synchronizes.
    strip: [CardSet; 4],
    /// Cards each seat holds beyond its pinned ones.
    needed: [u8; 4],
    leftovers: Vec<Card>,
    voids: [[bool; 4]; 4],
    constraints: [HandConstraints; 4],
    strain: Strain,
    trick: Trick,
    taken: [u8; 2],
}

impl Sampler {
    pub fn new(game: &GameState) -> Self {
        let mut hands: [CardSet; 4] = array::from_fn(|i| game.hand(Seat::LOOP[i]));
        let mut plays: [CardSet; 4] = array::from_fn(|i| game.plays(Seat::LOOP[i]));
        for play in game.trick().plays() {
            hands[play.seat.index()].insert(play.card);
            plays[play.seat.index()].remove(play.card);
        }

        let known = array::from_fn(|i| hands[i] | plays[i]);
        let needed = array::from_fn(|i| game.unknown(Seat::LOOP[i]));
        let voids = array::from_fn(|s| {
            array::from_fn(|t| game.is_void(Seat::LOOP[s], Suit::ALL[t]))
        });

        Self {
            known,
            strip: plays,
            needed,
            leftovers: game.hidden().iter().collect(),
            voids,
            constraints: array::from_fn(|i| *game.constraints(Seat::LOOP[i])),
            strain: game.contract().strain(),
            trick: game.trick().clone(),
            taken: [
                game.tricks_taken(Side::NorthSouth),
                game.tricks_taken(Side::EastWest),
            ],
        }
    }

    /// Deal the hidden pool out at random. A card whose suit the seat is
    /// known void in goes back to the end of the queue; if only void
    /// cards remain for a seat the hand stays short and the filter will
    /// throw the world away.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> World {
        let mut pool: VecDeque<Card> = {
            let mut cards = self.leftovers.clone();
            cards.shuffle(rng);
            cards.into()
        };

        let mut hands: [Hand; 4] = array::from_fn(|i| Hand::from_set(self.known[i]));
        for seat in Seat::LOOP {
            let mut remaining = self.needed[seat.index()];
            let mut misses = 0;
            while remaining > 0 && misses < pool.len() {
                let card = pool.pop_front().expect("pool is non-empty");
                if self.voids[seat.index()][card.suit.index()] {
                    pool.push_back(card);
                    misses += 1;
                    continue;
                }
                hands[seat.index()].add(card);
                remaining -= 1;
                misses = 0;
            }
        }

        World::new(hands, self.strain, self.trick.leader(), self.taken)
    }

    /// Accept a world only if every hand came out full-sized and every
    /// edited seat satisfies its shape and HCP ranges.
    pub fn filter(&self, world: &World) -> bool {
        for seat in Seat::LOOP {
            let expected =
                self.known[seat.index()].len() as usize + self.needed[seat.index()] as usize;
            if world.hand(seat).len() != expected {
                return false;
            }
        }
        for seat in Seat::LOOP {
            let constraints = &self.constraints[seat.index()];
            if constraints.edited() && !constraints.admits(world.hand(seat)) {
                return false;
            }
        }
        true
    }

    /// Bring the world to the game's position: strip the plays already
    /// seen, anchor the oracle reset point, then replay the trick in
    /// progress so leader and trick match.
    pub fn synchronize(&self, world: &mut World) {
        world.remove_played(&self.strip);
        world.set_anchor();
        for play in self.trick.plays() {
            debug_assert_eq!(world.leader(), play.seat);
            world.play(play.card);
        }
    }
}
