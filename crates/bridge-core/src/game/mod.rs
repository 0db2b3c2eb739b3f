pub mod state;

pub use state::{GameError, GameState, PlayError, PlayOutcome};
