//! PBN deal strings.
//!
//! A deal reads `N:AKQT3.J6.KJ42.95 652.AK42.AQ87.T4 ...` — a seat letter,
//! a colon, then four hands clockwise from that seat. Each hand lists its
//! suits in PBN order (spades, hearts, diamonds, clubs) separated by dots.
//! A hand given as `...` is unknown and feeds the hidden pool.

use crate::model::card::Card;
use crate::model::cards::CardSet;
use crate::model::player::Seat;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use std::fmt;

/// Parsed deal: per-seat holdings, `None` for unknown hands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub first: Seat,
    pub hands: [Option<CardSet>; 4],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PbnError {
    MissingSeatPrefix,
    BadSeat(char),
    WrongHandCount(usize),
    WrongSuitCount { hand: usize, found: usize },
    BadRank(char),
    DuplicateCard(Card),
}

impl fmt::Display for PbnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PbnError::MissingSeatPrefix => write!(f, "deal must start with `<seat>:`"),
            PbnError::BadSeat(c) => write!(f, "unrecognized seat letter {c:?}"),
            PbnError::WrongHandCount(found) => {
                write!(f, "expected 4 hands but found {found}")
            }
            PbnError::WrongSuitCount { hand, found } => {
                write!(f, "hand {hand} has {found} suit groups instead of 4")
            }
            PbnError::BadRank(c) => write!(f, "unrecognized rank character {c:?}"),
            PbnError::DuplicateCard(card) => write!(f, "card {card} appears twice"),
        }
    }
}

impl std::error::Error for PbnError {}

pub fn parse_deal(text: &str) -> Result<Deal, PbnError> {
    let trimmed = text.trim();
    let (prefix, body) = trimmed.split_once(':').ok_or(PbnError::MissingSeatPrefix)?;
    let seat_char = prefix
        .trim()
        .chars()
        .next()
        .ok_or(PbnError::MissingSeatPrefix)?;
    let first = Seat::from_char(seat_char).ok_or(PbnError::BadSeat(seat_char))?;

    let tokens: Vec<&str> = body.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(PbnError::WrongHandCount(tokens.len()));
    }

    let mut hands: [Option<CardSet>; 4] = [None; 4];
    let mut seen = CardSet::EMPTY;
    let mut seat = first;
    for (hand_index, token) in tokens.iter().enumerate() {
        if *token == "..." {
            hands[seat.index()] = None;
            seat = seat.next();
            continue;
        }
        let groups: Vec<&str> = token.split('.').collect();
        if groups.len() != 4 {
            return Err(PbnError::WrongSuitCount {
                hand: hand_index,
                found: groups.len(),
            });
        }
        let mut cards = CardSet::EMPTY;
        for (suit, group) in Suit::PBN_ORDER.iter().zip(groups) {
            for symbol in group.chars() {
                let rank = Rank::from_char(symbol).ok_or(PbnError::BadRank(symbol))?;
                let card = Card::new(rank, *suit);
                if seen.contains(card) {
                    return Err(PbnError::DuplicateCard(card));
                }
                seen.insert(card);
                cards.insert(card);
            }
        }
        hands[seat.index()] = Some(cards);
        seat = seat.next();
    }

    Ok(Deal { first, hands })
}

/// Serialize a fully-known deal, hands clockwise from `first`.
pub fn deal_string(first: Seat, hands: &[CardSet; 4]) -> String {
    let mut out = String::with_capacity(70);
    out.push(first.letter());
    out.push(':');
    let mut seat = first;
    for hand_index in 0..4 {
        if hand_index > 0 {
            out.push(' ');
        }
        let hand = hands[seat.index()];
        for (group_index, suit) in Suit::PBN_ORDER.iter().enumerate() {
            if group_index > 0 {
                out.push('.');
            }
            let mut ranks: Vec<Rank> = hand.in_suit(*suit).iter().map(|card| card.rank).collect();
            ranks.sort_by(|a, b| b.cmp(a));
            for rank in ranks {
                out.push(rank.symbol());
            }
        }
        seat = seat.next();
    }
    out
}
