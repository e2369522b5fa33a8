// compfarm test harness library

pub mod config;
pub mod constants;
pub mod types;
pub mod utils;

pub mod blockchain;
pub mod dex;
pub mod fixtures;
pub mod protocols;
pub mod scenarios;
pub mod storage;

// Re-exports for convenience
pub use config::Config;
pub use types::{HarnessError, HarnessResult, NamedAccount};
pub use utils::bn_from_e_notation;

pub use blockchain::{ArtifactStore, NodeClient, Replayer};
pub use fixtures::{TestDataLoader, TestRow};
pub use scenarios::{Scenario, ScenarioReport, TestEnv};
pub use storage::{ContractRegistry, SnapshotStore};
