use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use anyhow::Result;
use ethers::types::H160;
use tracing::info;

use crate::constants;
use crate::utils::bn_from_e_notation;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 로컬 테스트 노드 (hardhat fork)
    pub rpc_url: String,
    /// 메인넷 트랜잭션 재현용 아카이브 노드
    pub archive_rpc_url: Option<String>,
    /// 펜딩 트랜잭션 영수증 폴링 간격
    pub poll_interval_ms: u64,
    /// 노드 기동 대기 루프 간격
    pub node_retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// `snapshotIds.json` 위치
    pub root_dir: PathBuf,
    /// `deployed_contracts.json`, `comp_constant.json`, `dydx_constant.json` 위치
    pub data_dir: PathBuf,
    /// 시나리오별 CSV
    pub csv_dir: PathBuf,
    /// 디코딩된 픽스처 JSON 미러
    pub json_mirror_dir: PathBuf,
    /// 컴파일 아티팩트 (`<Name>.sol/<Name>.json`)
    pub artifacts_dir: PathBuf,
    pub snapshot_file: String,
    pub deployed_file: String,
    pub comp_constant_file: String,
    pub dydx_constant_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCoinConfig {
    pub enabled: bool,
    /// 스왑 비용을 낼 노드 계정 인덱스
    pub signer_index: usize,
    pub recipients: Vec<H160>,
    pub coins: Vec<H160>,
    /// 지수 표기 금액 (coins와 같은 순서)
    pub amounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    pub weth: H160,
    pub uniswap_v2_router: H160,
    pub comptroller: H160,
    pub solo_margin: H160,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub paths: PathConfig,
    /// 서명자 이름 → 노드 계정 인덱스
    pub signers: BTreeMap<String, usize>,
    pub test_coins: TestCoinConfig,
    pub addresses: AddressConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            archive_rpc_url: None,
            poll_interval_ms: 250,
            node_retry_delay_secs: 5,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            data_dir: PathBuf::from("test/data"),
            csv_dir: PathBuf::from("test/data/csv"),
            json_mirror_dir: PathBuf::from("test/data/testdatajson"),
            artifacts_dir: PathBuf::from("artifacts/contracts"),
            snapshot_file: "snapshotIds".to_string(),
            deployed_file: "deployed_contracts".to_string(),
            comp_constant_file: "comp_constant".to_string(),
            dydx_constant_file: "dydx_constant".to_string(),
        }
    }
}

impl Default for TestCoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signer_index: 19,
            recipients: vec![constants::HARDHAT_ACCOUNT_0.parse().unwrap_or_default()],
            coins: vec![
                constants::WETH.parse().unwrap_or_default(),
                constants::DAI.parse().unwrap_or_default(),
                constants::USDC.parse().unwrap_or_default(),
            ],
            amounts: vec!["100e18".to_string(), "100000e18".to_string(), "100000e6".to_string()],
        }
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            weth: constants::WETH.parse().unwrap_or_default(),
            uniswap_v2_router: constants::UNISWAP_V2_ROUTER.parse().unwrap_or_default(),
            comptroller: constants::COMPOUND_COMPTROLLER.parse().unwrap_or_default(),
            solo_margin: constants::DYDX_SOLO_MARGIN.parse().unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut signers = BTreeMap::new();
        signers.insert("deployer".to_string(), 0);
        signers.insert("vaultUser1".to_string(), 1);

        Self {
            network: NetworkConfig::default(),
            paths: PathConfig::default(),
            signers,
            test_coins: TestCoinConfig::default(),
            addresses: AddressConfig::default(),
        }
    }
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값 사용
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("🔧 설정 파일 없음 ({}), 기본 설정 사용", path);
            Ok(Self::default())
        }
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// 환경 변수로 덮어쓰기
    pub fn apply_environment(&mut self) {
        if let Ok(rpc_url) = env::var("RPC_URL") {
            self.network.rpc_url = rpc_url;
            info!("🌐 RPC URL loaded from environment");
        }

        // 예전 스크립트가 쓰던 이름도 허용
        let archive = env::var("ARCHIVE_RPC_URL").or_else(|_| env::var("achieveNode"));
        if let Ok(archive_url) = archive {
            self.network.archive_rpc_url = Some(archive_url);
            info!("🗄️ Archive RPC URL loaded from environment");
        }

        if let Ok(data_dir) = env::var("HARNESS_DATA_DIR") {
            let data_dir = PathBuf::from(data_dir);
            self.paths.csv_dir = data_dir.join("csv");
            self.paths.json_mirror_dir = data_dir.join("testdatajson");
            self.paths.data_dir = data_dir;
            info!("📁 Data directory loaded from environment");
        }
    }

    pub fn signer_index(&self, name: &str) -> Option<usize> {
        self.signers.get(name).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            return Err(anyhow::anyhow!("Network RPC URL cannot be empty"));
        }

        if self.network.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Poll interval must be greater than 0"));
        }

        if self.network.node_retry_delay_secs == 0 {
            return Err(anyhow::anyhow!("Node retry delay must be greater than 0"));
        }

        if !self.signers.contains_key("deployer") {
            return Err(anyhow::anyhow!("A 'deployer' signer must be configured"));
        }

        if self.test_coins.enabled {
            if self.test_coins.coins.len() != self.test_coins.amounts.len() {
                return Err(anyhow::anyhow!(
                    "test_coins.coins ({}) and test_coins.amounts ({}) must have the same length",
                    self.test_coins.coins.len(),
                    self.test_coins.amounts.len()
                ));
            }

            if self.test_coins.recipients.is_empty() {
                return Err(anyhow::anyhow!("At least one test coin recipient must be configured"));
            }

            for amount in &self.test_coins.amounts {
                bn_from_e_notation(amount)
                    .map_err(|e| anyhow::anyhow!("Invalid test coin amount {}: {}", amount, e))?;
            }
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn load_test_config(root: &std::path::Path) -> Self {
        let mut config = Self::default();
        config.paths.root_dir = root.to_path_buf();
        config.paths.data_dir = root.join("data");
        config.paths.csv_dir = root.join("data").join("csv");
        config.paths.json_mirror_dir = root.join("data").join("testdatajson");
        config.paths.artifacts_dir = root.join("artifacts");
        config.test_coins.enabled = false;
        config
    }
}
