use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// 하네스 에러 타입
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Bad number string: {input}")]
    BadNumber { input: String },

    #[error("Integer only: {input} has exponent {exponent} below its {decimals} decimals")]
    IntegerOnly { input: String, exponent: i64, decimals: usize },

    #[error("Number out of range for {target}: {value}")]
    NumberOutOfRange { value: String, target: &'static str },

    #[error("csv header format error: {header}")]
    CsvHeader { header: String },

    #[error("parsed csv is empty: {key}")]
    EmptyCsv { key: String },

    #[error("Unknown signer: {0}")]
    UnknownSigner(String),

    #[error("Constant not found: {0}")]
    ConstantNotFound(String),

    #[error("no evm snapshot found! #{0}")]
    SnapshotNotFound(String),

    #[error("Contract not deployed: {0}")]
    ContractNotDeployed(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Fixture mismatch in row {row}: {field} expected {expected}, got {actual}")]
    FixtureMismatch { row: usize, field: String, expected: String, actual: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),
}

/// Result type alias
pub type HarnessResult<T> = Result<T, HarnessError>;

/// 이름이 붙은 노드 계정 (로컬 노드의 unlocked 계정)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedAccount {
    pub name: String,
    pub address: Address,
}

impl NamedAccount {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self { name: name.into(), address }
    }
}

impl std::fmt::Display for NamedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.name, self.address)
    }
}
