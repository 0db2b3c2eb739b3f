//! Double-dummy oracle seam.
//!
//! The engine scores playout leaves by asking an oracle how many tricks
//! the side on lead takes with all four hands face up. An oracle handle
//! is built from a fully-specified PBN deal, fed the plays made since
//! that position, then queried. Handles are cheap, single-threaded and
//! released by drop; every evaluation opens its own.

mod minimax;

pub use minimax::MinimaxProvider;

use bridge_core::model::card::Card;
use bridge_core::model::contract::Strain;
use bridge_core::model::player::Seat;
use bridge_core::pbn::PbnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("malformed deal: {0}")]
    Deal(#[from] PbnError),
    #[error("oracle deals must specify all four hands ({seat} is unknown)")]
    UnknownHand { seat: Seat },
    #[error("unrecognized play token {0:?}")]
    BadPlay(String),
    #[error("{card} is not held by the seat due to play")]
    CardNotHeld { card: Card },
    #[error("double-dummy backend unavailable: {0}")]
    Unavailable(String),
}

/// One resettable solver handle positioned at a concrete deal.
pub trait DoubleDummy {
    /// Apply a whitespace-separated sequence of `<suit><rank>` plays in
    /// temporal order, advancing tricks as they complete.
    fn apply(&mut self, plays: &str) -> Result<(), OracleError>;

    /// Optimal number of remaining tricks for the side currently on
    /// lead, in `[0, 13]`.
    fn tricks_to_take(&mut self) -> Result<u8, OracleError>;
}

/// Factory the engine holds for the lifetime of a search. Failure to
/// produce handles at startup is fatal for the engine.
pub trait OracleProvider: Send + Sync {
    fn open(
        &self,
        deal: &str,
        strain: Strain,
        leader: Seat,
    ) -> Result<Box<dyn DoubleDummy>, OracleError>;
}
