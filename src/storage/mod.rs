//! 스크립트 실행 사이에 공유되는 평면 JSON 파일들
//!
//! - `snapshotIds.json`: 이름 → evm 스냅샷 ID
//! - `deployed_contracts.json`: 배포된 컨트랙트 목록

pub mod files;
pub mod snapshots;
pub mod deployed;

pub use files::{load_obj, load_obj_or_default, save_obj, to_pretty_json};
pub use snapshots::{SnapshotStore, INITIAL_SNAPSHOT};
pub use deployed::{ContractRegistry, DeployedContract};
