use crate::model::card::Card;
use crate::model::player::Seat;
use crate::model::suit::Suit;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trick {
    leader: Seat,
    plays: Vec<Play>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Play {
    pub seat: Seat,
    pub card: Card,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrickError {
    TrickComplete,
    OutOfTurn { expected: Seat, actual: Seat },
}

impl fmt::Display for TrickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrickError::TrickComplete => write!(f, "trick already complete"),
            TrickError::OutOfTurn { expected, actual } => {
                write!(f, "expected {expected} to play next but got {actual}")
            }
        }
    }
}

impl std::error::Error for TrickError {}

impl Trick {
    pub fn new(leader: Seat) -> Self {
        Self {
            leader,
            plays: Vec::with_capacity(4),
        }
    }

    pub fn leader(&self) -> Seat {
        self.leader
    }

    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.plays.len() == 4
    }

    pub fn lead_suit(&self) -> Option<Suit> {
        self.plays.first().map(|play| play.card.suit)
    }

    /// Seat due to play the next card.
    pub fn to_act(&self) -> Seat {
        self.plays
            .last()
            .map(|play| play.seat.next())
            .unwrap_or(self.leader)
    }

    pub fn push(&mut self, seat: Seat, card: Card) -> Result<(), TrickError> {
        if self.is_complete() {
            return Err(TrickError::TrickComplete);
        }

        let expected = self.to_act();
        if expected != seat {
            return Err(TrickError::OutOfTurn {
                expected,
                actual: seat,
            });
        }

        self.plays.push(Play { seat, card });
        Ok(())
    }

    /// Winner of a complete trick: highest trump if any was played,
    /// otherwise the highest card of the lead suit.
    pub fn winner(&self, trump: Option<Suit>) -> Option<Seat> {
        if !self.is_complete() {
            return None;
        }
        let lead_suit = self.lead_suit()?;
        self.plays
            .iter()
            .max_by_key(|play| {
                let priority = match trump {
                    Some(t) if play.card.suit == t => 2,
                    _ if play.card.suit == lead_suit => 1,
                    _ => 0,
                };
                (priority, play.card.rank)
            })
            .map(|play| play.seat)
    }
}
