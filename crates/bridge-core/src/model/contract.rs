use crate::model::suit::Suit;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Contract denomination: one of the four suits or no-trump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Strain {
    Clubs = 0,
    Diamonds = 1,
    Hearts = 2,
    Spades = 3,
    NoTrump = 4,
}

impl Strain {
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Strain::Clubs),
            1 => Some(Strain::Diamonds),
            2 => Some(Strain::Hearts),
            3 => Some(Strain::Spades),
            4 => Some(Strain::NoTrump),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// The trump suit, or None under no-trump.
    pub const fn trump(self) -> Option<Suit> {
        match self {
            Strain::Clubs => Some(Suit::Clubs),
            Strain::Diamonds => Some(Suit::Diamonds),
            Strain::Hearts => Some(Suit::Hearts),
            Strain::Spades => Some(Suit::Spades),
            Strain::NoTrump => None,
        }
    }
}

impl fmt::Display for Strain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Strain::Clubs => "C",
            Strain::Diamonds => "D",
            Strain::Hearts => "H",
            Strain::Spades => "S",
            Strain::NoTrump => "NT",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    level: u8,
    strain: Strain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    BadLevel(u8),
    BadSyntax(String),
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::BadLevel(level) => {
                write!(f, "contract level {level} outside 1..=7")
            }
            ContractError::BadSyntax(text) => write!(f, "unrecognized contract {text:?}"),
        }
    }
}

impl std::error::Error for ContractError {}

impl Contract {
    pub fn new(level: u8, strain: Strain) -> Result<Self, ContractError> {
        if !(1..=7).contains(&level) {
            return Err(ContractError::BadLevel(level));
        }
        Ok(Self { level, strain })
    }

    /// Parse `<level><strain>` (e.g. `3NT`, `4h`), case-insensitively.
    pub fn parse(text: &str) -> Result<Self, ContractError> {
        let trimmed = text.trim();
        let mut chars = trimmed.chars();
        let level = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| ContractError::BadSyntax(trimmed.to_string()))? as u8;
        let strain = match chars.as_str().to_ascii_uppercase().as_str() {
            "C" => Strain::Clubs,
            "D" => Strain::Diamonds,
            "H" => Strain::Hearts,
            "S" => Strain::Spades,
            "N" | "NT" => Strain::NoTrump,
            _ => return Err(ContractError::BadSyntax(trimmed.to_string())),
        };
        Contract::new(level, strain)
    }

    pub const fn level(self) -> u8 {
        self.level
    }

    pub const fn strain(self) -> Strain {
        self.strain
    }

    pub const fn trump(self) -> Option<Suit> {
        self.strain.trump()
    }

    /// Tricks declarer's side needs: book (6) plus the level.
    pub const fn required_tricks(self) -> u8 {
        6 + self.level
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.level, self.strain)
    }
}
