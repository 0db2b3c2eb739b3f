//! Built-in double-dummy solver.
//!
//! Alpha-beta over the full-information play of a deal, maximizing the
//! tricks taken by North-South, with a transposition table of value
//! bounds keyed at trick boundaries. Intended for endgame-sized
//! positions; a native solver can replace it behind the same traits.

use super::{DoubleDummy, OracleError, OracleProvider};
use bridge_core::model::card::Card;
use bridge_core::model::cards::CardSet;
use bridge_core::model::contract::Strain;
use bridge_core::model::player::{Seat, Side};
use bridge_core::model::rank::Rank;
use bridge_core::model::suit::Suit;
use bridge_core::pbn;
use std::collections::HashMap;

/// Provider producing one fresh [`MinimaxOracle`] per evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimaxProvider;

impl OracleProvider for MinimaxProvider {
    fn open(
        &self,
        deal: &str,
        strain: Strain,
        leader: Seat,
    ) -> Result<Box<dyn DoubleDummy>, OracleError> {
        let parsed = pbn::parse_deal(deal)?;
        let mut hands = [CardSet::EMPTY; 4];
        for seat in Seat::LOOP {
            hands[seat.index()] = parsed.hands[seat.index()]
                .ok_or(OracleError::UnknownHand { seat })?;
        }
        Ok(Box::new(MinimaxOracle::new(hands, strain.trump(), leader)))
    }
}

#[derive(Debug, Clone, Copy)]
struct PartialTrick {
    leader: Seat,
    cards: [Option<Card>; 4],
    len: u8,
}

impl PartialTrick {
    fn empty(leader: Seat) -> Self {
        Self {
            leader,
            cards: [None; 4],
            len: 0,
        }
    }

    fn to_act(&self) -> Seat {
        let mut seat = self.leader;
        for _ in 0..self.len {
            seat = seat.next();
        }
        seat
    }

    fn lead_suit(&self) -> Option<Suit> {
        self.cards[0].map(|card| card.suit)
    }

    fn with(&self, card: Card) -> Self {
        let mut next = *self;
        next.cards[next.len as usize] = Some(card);
        next.len += 1;
        next
    }

    fn winner(&self, trump: Option<Suit>) -> Seat {
        debug_assert_eq!(self.len, 4);
        let lead = self.lead_suit().expect("complete trick has a lead");
        let mut best_seat = self.leader;
        let mut best_key = (0u8, Rank::Two);
        let mut seat = self.leader;
        for slot in self.cards {
            let card = slot.expect("complete trick");
            let priority = match trump {
                Some(t) if card.suit == t => 2,
                _ if card.suit == lead => 1,
                _ => 0,
            };
            if (priority, card.rank) > best_key {
                best_key = (priority, card.rank);
                best_seat = seat;
            }
            seat = seat.next();
        }
        best_seat
    }
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    lower: i32,
    upper: i32,
}

type TtKey = ([u64; 4], u8);

pub struct MinimaxOracle {
    hands: [CardSet; 4],
    trump: Option<Suit>,
    trick: PartialTrick,
    table: HashMap<TtKey, Bounds>,
}

impl MinimaxOracle {
    fn new(hands: [CardSet; 4], trump: Option<Suit>, leader: Seat) -> Self {
        Self {
            hands,
            trump,
            trick: PartialTrick::empty(leader),
            table: HashMap::new(),
        }
    }

    fn parse_play(token: &str) -> Result<Card, OracleError> {
        let mut chars = token.chars();
        let suit = chars.next().and_then(Suit::from_char);
        let rank = chars.next().and_then(Rank::from_char);
        match (suit, rank, chars.next()) {
            (Some(suit), Some(rank), None) => Ok(Card::new(rank, suit)),
            _ => Err(OracleError::BadPlay(token.to_string())),
        }
    }

    fn legal_moves(hands: &[CardSet; 4], trick: &PartialTrick) -> CardSet {
        let hand = hands[trick.to_act().index()];
        match trick.lead_suit() {
            Some(lead) if !hand.in_suit(lead).is_empty() => hand.in_suit(lead),
            _ => hand,
        }
    }

    /// North-South tricks among those not yet completed, with both sides
    /// playing perfectly. Window-bounded; results memoized per boundary.
    fn ns_tricks(
        &mut self,
        hands: [CardSet; 4],
        trick: PartialTrick,
        mut alpha: i32,
        mut beta: i32,
    ) -> i32 {
        let to_act = trick.to_act();
        let remaining = hands[to_act.index()].len() as i32;
        if remaining == 0 {
            return 0;
        }

        let boundary = trick.len == 0;
        let key: TtKey = (
            [
                hands[0].bits(),
                hands[1].bits(),
                hands[2].bits(),
                hands[3].bits(),
            ],
            to_act.index() as u8,
        );
        if boundary {
            if let Some(bounds) = self.table.get(&key) {
                if bounds.lower == bounds.upper {
                    return bounds.lower;
                }
                if bounds.lower >= beta {
                    return bounds.lower;
                }
                if bounds.upper <= alpha {
                    return bounds.upper;
                }
                alpha = alpha.max(bounds.lower);
                beta = beta.min(bounds.upper);
            }
        }

        let (alpha_in, beta_in) = (alpha, beta);
        let maximizing = to_act.side() == Side::NorthSouth;
        let mut best = if maximizing { 0 } else { remaining };

        for card in Self::legal_moves(&hands, &trick) {
            let mut next_hands = hands;
            next_hands[to_act.index()].remove(card);
            let next_trick = trick.with(card);

            let value = if next_trick.len == 4 {
                let winner = next_trick.winner(self.trump);
                let inc = i32::from(winner.side() == Side::NorthSouth);
                inc + self.ns_tricks(
                    next_hands,
                    PartialTrick::empty(winner),
                    alpha - inc,
                    beta - inc,
                )
            } else {
                self.ns_tricks(next_hands, next_trick, alpha, beta)
            };

            if maximizing {
                best = best.max(value);
                alpha = alpha.max(best);
            } else {
                best = best.min(value);
                beta = beta.min(best);
            }
            if alpha >= beta {
                break;
            }
        }

        if boundary {
            let entry = self.table.entry(key).or_insert(Bounds {
                lower: 0,
                upper: remaining,
            });
            if best <= alpha_in {
                entry.upper = entry.upper.min(best);
            } else if best >= beta_in {
                entry.lower = entry.lower.max(best);
            } else {
                entry.lower = best;
                entry.upper = best;
            }
        }

        best
    }
}

impl DoubleDummy for MinimaxOracle {
    fn apply(&mut self, plays: &str) -> Result<(), OracleError> {
        for token in plays.split_whitespace() {
            let card = Self::parse_play(token)?;
            let seat = self.trick.to_act();
            if !self.hands[seat.index()].remove(card) {
                return Err(OracleError::CardNotHeld { card });
            }
            self.trick = self.trick.with(card);
            if self.trick.len == 4 {
                let winner = self.trick.winner(self.trump);
                self.trick = PartialTrick::empty(winner);
            }
        }
        Ok(())
    }

    fn tricks_to_take(&mut self) -> Result<u8, OracleError> {
        let to_act = self.trick.to_act();
        let remaining = self.hands[to_act.index()].len() as i32;
        if remaining == 0 {
            return Ok(0);
        }
        let hands = self.hands;
        let trick = self.trick;
        let ns = self.ns_tricks(hands, trick, 0, remaining);
        let value = if to_act.side() == Side::NorthSouth {
            ns
        } else {
            remaining - ns
        };
        Ok(value as u8)
    }
}
