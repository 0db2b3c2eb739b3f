//! Authoritative position during the card-play phase.
//!
//! Known holdings, played cards and the hidden pool are 52-bit sets; the
//! per-seat `unknown` counters say how many cards a seat still holds that
//! are not pinned to it. Void flags only ever turn on.

use crate::model::card::Card;
use crate::model::cards::CardSet;
use crate::model::constraints::HandConstraints;
use crate::model::contract::Contract;
use crate::model::player::{Seat, Side};
use crate::model::suit::Suit;
use crate::model::trick::Trick;
use crate::pbn::Deal;
use std::fmt;

#[derive(Debug, Clone)]
pub struct GameState {
    hands: [CardSet; 4],
    plays: [CardSet; 4],
    hidden: CardSet,
    unknown: [u8; 4],
    voids: u16,
    leader: Seat,
    trick: Trick,
    taken: [u8; 2],
    constraints: [HandConstraints; 4],
    declarer: Seat,
    contract: Contract,
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
}

/// Full copy of the mutable position, for the undo/redo stacks.
#[derive(Debug, Clone)]
struct Snapshot {
    hands: [CardSet; 4],
    plays: [CardSet; 4],
    hidden: CardSet,
    unknown: [u8; 4],
    voids: u16,
    leader: Seat,
    trick: Trick,
    taken: [u8; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Played,
    TrickCompleted { winner: Seat },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayError {
    Illegal(Card),
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayError::Illegal(card) => write!(f, "{card} is not a legal play"),
        }
    }
}

impl std::error::Error for PlayError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Known hands of a fully-specified deal differ in size.
    UnevenHands,
    /// Unknown hands are only supported when every known hand has 13 cards.
    PartialWithUnknown,
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::UnevenHands => write!(f, "known hands differ in size"),
            GameError::PartialWithUnknown => {
                write!(f, "deals with unknown hands must give 13 cards to each known hand")
            }
        }
    }
}

impl std::error::Error for GameError {}

impl GameState {
    /// Build a game from a parsed deal. The opening leader is the seat to
    /// declarer's left.
    pub fn new(deal: &Deal, declarer: Seat, contract: Contract) -> Result<Self, GameError> {
        let mut hands = [CardSet::EMPTY; 4];
        let mut unknown = [0u8; 4];
        let mut union = CardSet::EMPTY;
        let unknown_seats = deal.hands.iter().filter(|hand| hand.is_none()).count();

        for seat in Seat::LOOP {
            match deal.hands[seat.index()] {
                Some(cards) => {
                    hands[seat.index()] = cards;
                    union |= cards;
                }
                None => unknown[seat.index()] = 13,
            }
        }

        let hidden = if unknown_seats == 0 {
            let first_len = hands[0].len();
            if hands.iter().any(|hand| hand.len() != first_len) {
                return Err(GameError::UnevenHands);
            }
            CardSet::EMPTY
        } else {
            if Seat::LOOP
                .iter()
                .any(|seat| deal.hands[seat.index()].is_some() && hands[seat.index()].len() != 13)
            {
                return Err(GameError::PartialWithUnknown);
            }
            !union
        };

        let leader = declarer.next();
        Ok(Self {
            hands,
            plays: [CardSet::EMPTY; 4],
            hidden,
            unknown,
            voids: 0,
            leader,
            trick: Trick::new(leader),
            taken: [0; 2],
            constraints: [HandConstraints::default(); 4],
            declarer,
            contract,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        })
    }

    pub fn hand(&self, seat: Seat) -> CardSet {
        self.hands[seat.index()]
    }

    pub fn plays(&self, seat: Seat) -> CardSet {
        self.plays[seat.index()]
    }

    pub fn all_plays(&self) -> CardSet {
        self.plays
            .iter()
            .fold(CardSet::EMPTY, |acc, plays| acc | *plays)
    }

    pub fn hidden(&self) -> CardSet {
        self.hidden
    }

    pub fn unknown(&self, seat: Seat) -> u8 {
        self.unknown[seat.index()]
    }

    pub fn leader(&self) -> Seat {
        self.leader
    }

    pub fn trick(&self) -> &Trick {
        &self.trick
    }

    pub fn tricks_taken(&self, side: Side) -> u8 {
        self.taken[side.index()]
    }

    pub fn declarer(&self) -> Seat {
        self.declarer
    }

    pub fn contract(&self) -> Contract {
        self.contract
    }

    pub fn trump(&self) -> Option<Suit> {
        self.contract.trump()
    }

    pub fn constraints(&self, seat: Seat) -> &HandConstraints {
        &self.constraints[seat.index()]
    }

    pub fn constraints_mut(&mut self, seat: Seat) -> &mut HandConstraints {
        &mut self.constraints[seat.index()]
    }

    pub fn is_void(&self, seat: Seat, suit: Suit) -> bool {
        self.voids & Self::void_bit(seat, suit) != 0
    }

    pub fn is_over(&self) -> bool {
        self.taken[0] + self.taken[1] >= 13
    }

    const fn void_bit(seat: Seat, suit: Suit) -> u16 {
        1 << (seat.index() * 4 + suit.index())
    }

    /// Cards the acting seat could conceivably play: its pinned cards,
    /// plus the hidden pool while it still has unknowns, minus anything
    /// already played and minus suits it is known void in.
    fn pool(&self, seat: Seat) -> CardSet {
        let mut pool = self.hands[seat.index()];
        if self.unknown[seat.index()] > 0 {
            pool |= self.hidden;
        }
        pool -= self.all_plays();
        for suit in Suit::ALL {
            if self.is_void(seat, suit) {
                pool -= CardSet::from_bits(CardSet::suit_mask(suit));
            }
        }
        pool
    }

    /// Follow-suit only binds on the seat's pinned cards; playing an
    /// off-suit card out of the hidden pool is how voids are discovered.
    pub fn is_legal(&self, card: Card) -> bool {
        let seat = self.leader;
        if !self.pool(seat).contains(card) {
            return false;
        }
        if let Some(lead) = self.trick.lead_suit() {
            if !self.hands[seat.index()].in_suit(lead).is_empty() && card.suit != lead {
                return false;
            }
        }
        true
    }

    pub fn legal_moves(&self) -> Vec<Card> {
        let seat = self.leader;
        let pool = self.pool(seat);
        let restricted = match self.trick.lead_suit() {
            Some(lead) if !self.hands[seat.index()].in_suit(lead).is_empty() => pool.in_suit(lead),
            _ => pool,
        };
        restricted.iter().collect()
    }

    pub fn play(&mut self, card: Card, check: bool) -> Result<PlayOutcome, PlayError> {
        if check && !self.is_legal(card) {
            return Err(PlayError::Illegal(card));
        }

        self.undo_stack.push(self.capture());
        self.redo_stack.clear();

        let seat = self.leader;
        if let Some(lead) = self.trick.lead_suit() {
            if card.suit != lead {
                self.apply_void(lead);
            }
        }

        if self.hidden.remove(card) {
            self.unknown[seat.index()] = self.unknown[seat.index()].saturating_sub(1);
        }
        self.hands[seat.index()].remove(card);
        self.plays[seat.index()].insert(card);
        self.trick.push(seat, card).expect("seat is due to act");

        if self.trick.is_complete() {
            let winner = self.finish_trick();
            Ok(PlayOutcome::TrickCompleted { winner })
        } else {
            self.leader = seat.next();
            Ok(PlayOutcome::Played)
        }
    }

    /// Mark the acting seat void in `suit`. When exactly one other seat
    /// still has unknowns, every hidden card of the suit must be theirs,
    /// so pin them.
    fn apply_void(&mut self, suit: Suit) {
        self.voids |= Self::void_bit(self.leader, suit);

        let mut candidates = Seat::LOOP
            .iter()
            .copied()
            .filter(|seat| *seat != self.leader && self.unknown[seat.index()] > 0);
        let first = candidates.next();
        if candidates.next().is_some() {
            return;
        }
        let Some(other) = first else { return };

        let suited = self.hidden.in_suit(suit);
        if suited.is_empty() {
            return;
        }
        let count = (suited.len() as u8).min(self.unknown[other.index()]);
        self.hands[other.index()] |= suited;
        self.unknown[other.index()] -= count;
        self.hidden -= suited;
    }

    fn finish_trick(&mut self) -> Seat {
        let winner = self.trick.winner(self.trump()).expect("complete trick");
        self.taken[winner.side().index()] += 1;
        self.trick = Trick::new(winner);
        self.leader = winner;
        winner
    }

    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(snapshot) => {
                self.redo_stack.push(self.capture());
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(snapshot) => {
                self.undo_stack.push(self.capture());
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    fn capture(&self) -> Snapshot {
        Snapshot {
            hands: self.hands,
            plays: self.plays,
            hidden: self.hidden,
            unknown: self.unknown,
            voids: self.voids,
            leader: self.leader,
            trick: self.trick.clone(),
            taken: self.taken,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.hands = snapshot.hands;
        self.plays = snapshot.plays;
        self.hidden = snapshot.hidden;
        self.unknown = snapshot.unknown;
        self.voids = snapshot.voids;
        self.leader = snapshot.leader;
        self.trick = snapshot.trick;
        self.taken = snapshot.taken;
    }
}
