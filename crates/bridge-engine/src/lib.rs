#![deny(warnings)]
pub mod backup;
pub mod oracle;
pub mod sampler;
pub mod search;
pub mod tree;
pub mod world;

pub use backup::{
    Adversarial, BackupModel, Evaluator, Expectation, LinearBlend, Optimistic, SoftMax, SoftMin,
};
pub use oracle::{DoubleDummy, MinimaxProvider, OracleError, OracleProvider};
pub use sampler::Sampler;
pub use search::{EngineError, EngineEvent, SearchConfig, SearchEngine, SearchLimits};
pub use tree::{Edge, Node, Role, Tree};
pub use world::World;
