//! Lightweight fully-specified deal driven through random playouts.
//!
//! A world starts at the trick boundary the sampler anchored (its PBN
//! plus the leader there), then mutates destructively as cards are
//! played. Every play is appended to a `<suit><rank>` history so the
//! position can be replayed into a double-dummy oracle, and shifted
//! into the 64-bit public key that identifies the information set.

use crate::oracle::{OracleError, OracleProvider};
use bridge_core::model::card::Card;
use bridge_core::model::cards::CardSet;
use bridge_core::model::contract::Strain;
use bridge_core::model::hand::Hand;
use bridge_core::model::player::{Seat, Side};
use bridge_core::model::trick::Trick;
use bridge_core::pbn;

#[derive(Debug, Clone)]
pub struct World {
    hands: [Hand; 4],
    strain: Strain,
    trick: Trick,
    taken: [u8; 2],
    history: String,
    key: u64,
    anchor_pbn: String,
    anchor_leader: Seat,
}

impl World {
    pub(crate) fn new(hands: [Hand; 4], strain: Strain, leader: Seat, taken: [u8; 2]) -> Self {
        Self {
            hands,
            strain,
            trick: Trick::new(leader),
            taken,
            history: String::new(),
            key: 0,
            anchor_pbn: String::new(),
            anchor_leader: leader,
        }
    }

    /// Seat due to play the next card.
    pub fn leader(&self) -> Seat {
        self.trick.to_act()
    }

    pub fn hand(&self, seat: Seat) -> &Hand {
        &self.hands[seat.index()]
    }

    pub fn taken(&self, side: Side) -> u8 {
        self.taken[side.index()]
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn is_over(&self) -> bool {
        self.hands.iter().all(Hand::is_empty)
    }

    pub fn legal_moves(&self) -> Vec<Card> {
        let hand = &self.hands[self.leader().index()];
        match self.trick.lead_suit() {
            Some(lead) if hand.suit_len(lead) > 0 => hand
                .iter()
                .copied()
                .filter(|card| card.suit == lead)
                .collect(),
            _ => hand.cards().to_vec(),
        }
    }

    /// Play a card for the seat on lead and return the updated public
    /// key: eight bits of `card_id | seat << 6` shifted in per play.
    pub fn play(&mut self, card: Card) -> u64 {
        let seat = self.leader();
        let removed = self.hands[seat.index()].remove(card);
        debug_assert!(removed, "{seat} does not hold {card}");

        if !self.history.is_empty() {
            self.history.push(' ');
        }
        self.history.push(card.suit.symbol());
        self.history.push(card.rank.symbol());

        self.key = (self.key << 8) | (card.to_id() as u64 | (seat.index() as u64) << 6);

        self.trick.push(seat, card).expect("seat is due to act");
        if self.trick.is_complete() {
            self.finish_trick();
        }
        self.key
    }

    fn finish_trick(&mut self) {
        let winner = self
            .trick
            .winner(self.strain.trump())
            .expect("complete trick");
        self.taken[winner.side().index()] += 1;
        self.trick = Trick::new(winner);
    }

    /// Drop the cards the game has already seen played from each hand.
    pub(crate) fn remove_played(&mut self, played: &[CardSet; 4]) {
        for seat in Seat::LOOP {
            self.hands[seat.index()].remove_all(played[seat.index()]);
        }
    }

    /// Record the current position as the oracle reset point.
    pub(crate) fn set_anchor(&mut self) {
        let mut sets = [CardSet::EMPTY; 4];
        for seat in Seat::LOOP {
            sets[seat.index()] = self.hands[seat.index()].to_set();
        }
        self.anchor_pbn = pbn::deal_string(Seat::North, &sets);
        self.anchor_leader = self.leader();
    }

    /// Total tricks the side currently on lead finishes with: the pair
    /// counter when the deal is played out, otherwise the counter plus
    /// the oracle's remaining tricks from the anchored position.
    pub fn tricks(&self, provider: &dyn OracleProvider) -> Result<u8, OracleError> {
        let side = self.leader().side();
        if self.is_over() {
            return Ok(self.taken[side.index()]);
        }
        let mut oracle = provider.open(&self.anchor_pbn, self.strain, self.anchor_leader)?;
        oracle.apply(&self.history)?;
        Ok(self.taken[side.index()] + oracle.tricks_to_take()?)
    }
}

#[cfg(test)]
mod tests {
    use super::World;
    use crate::oracle::MinimaxProvider;
    use bridge_core::model::card::Card;
    use bridge_core::model::contract::Strain;
    use bridge_core::model::hand::Hand;
    use bridge_core::model::player::{Seat, Side};
    use bridge_core::pbn;

    fn card(text: &str) -> Card {
        Card::parse(text).unwrap()
    }

    fn world_from(deal: &str, strain: Strain, leader: Seat) -> World {
        let parsed = pbn::parse_deal(deal).unwrap();
        let hands = parsed
            .hands
            .map(|hand| Hand::from_set(hand.expect("known hand")));
        let mut world = World::new(hands, strain, leader, [0; 2]);
        world.set_anchor();
        world
    }

    #[test]
    fn key_packs_card_and_seat_bytes() {
        let mut world = world_from("N:...A ...K ...Q ...J", Strain::NoTrump, Seat::North);
        let key = world.play(card("AC"));
        assert_eq!(key, card("AC").to_id() as u64);
        let key = world.play(card("KC"));
        let expected = ((card("AC").to_id() as u64) << 8)
            | (card("KC").to_id() as u64 | (Seat::East.index() as u64) << 6);
        assert_eq!(key, expected);
    }

    #[test]
    fn history_uses_suit_then_rank_tokens() {
        let mut world = world_from("N:...A ...K ...Q ...J", Strain::NoTrump, Seat::North);
        world.play(card("AC"));
        world.play(card("KC"));
        assert_eq!(world.history, "CA CK");
    }

    #[test]
    fn completed_trick_awards_the_winning_side() {
        let mut world = world_from("N:...A ...K ...Q ...J", Strain::NoTrump, Seat::North);
        for text in ["AC", "KC", "QC", "JC"] {
            world.play(card(text));
        }
        assert!(world.is_over());
        assert_eq!(world.taken(Side::NorthSouth), 1);
        assert_eq!(world.leader(), Seat::North);
        assert_eq!(world.tricks(&MinimaxProvider).unwrap(), 1);
    }

    #[test]
    fn follow_suit_restricts_moves() {
        let mut world = world_from("N:A...2 KQ... ...A3 ..32.", Strain::NoTrump, Seat::North);
        world.play(card("AS"));
        let moves = world.legal_moves();
        assert_eq!(moves, vec![card("KS"), card("QS")]);
    }

    #[test]
    fn oracle_consultation_adds_remaining_tricks() {
        // North leads the spade ace; after it holds, the club ace is
        // still to come for North-South.
        let mut world = world_from("N:A...2 KQ... ...A3 ..32.", Strain::NoTrump, Seat::North);
        for text in ["AS", "KS", "3C", "2D"] {
            world.play(card(text));
        }
        assert_eq!(world.taken(Side::NorthSouth), 1);
        assert_eq!(world.tricks(&MinimaxProvider).unwrap(), 2);
    }
}
