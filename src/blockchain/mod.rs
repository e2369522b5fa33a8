pub mod abi;
pub mod contracts;
pub mod replay;
pub mod rpc;

pub use contracts::{Artifact, ArtifactStore, LoadedContract};
pub use replay::{BlockReplayOptions, BlockReplayReport, Replayer};
pub use rpc::{http_provider, NodeClient};
