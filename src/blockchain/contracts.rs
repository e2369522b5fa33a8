use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ethers::{
    abi::{Abi, Token},
    contract::{Contract, ContractFactory},
    providers::Middleware,
    types::{Address, Bytes},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::storage::ContractRegistry;
use crate::types::HarnessError;

/// 컴파일 아티팩트 (`abi`, `bytecode`)
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: Abi,
    /// 튜플 컴포넌트 이름 조회용 원본 ABI
    pub raw_abi: Value,
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    abi: Value,
    #[serde(default)]
    bytecode: Option<String>,
}

impl Artifact {
    pub fn from_json(name: &str, raw: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(raw)
            .with_context(|| format!("아티팩트 파싱 실패: {}", name))?;
        let abi: Abi = serde_json::from_value(file.abi.clone())?;
        let bytecode = match file.bytecode.as_deref() {
            Some(code) if !code.is_empty() && code != "0x" => code
                .parse::<Bytes>()
                .map_err(|e| anyhow!("{} bytecode 파싱 실패: {}", name, e))?,
            _ => Bytes::default(),
        };

        Ok(Self {
            contract_name: file.contract_name.unwrap_or_else(|| name.to_string()),
            abi,
            raw_abi: file.abi,
            bytecode,
        })
    }
}

/// 배포된 이름에 묶인 컨트랙트 핸들
pub struct LoadedContract<M> {
    pub name: String,
    pub address: Address,
    pub contract: Contract<M>,
    pub raw_abi: Value,
}

/// `<artifacts>/<Name>.sol/<Name>.json` 아티팩트 저장소
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, folder: &str, contract_name: &str) -> PathBuf {
        self.dir.join(folder).join(format!("{}.json", contract_name))
    }

    pub async fn load(&self, contract_name: &str) -> Result<Artifact> {
        self.load_from(&format!("{}.sol", contract_name), contract_name).await
    }

    pub async fn load_from(&self, folder: &str, contract_name: &str) -> Result<Artifact> {
        let path = self.artifact_path(folder, contract_name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::ArtifactNotFound(path.display().to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        Artifact::from_json(contract_name, &raw)
    }

    /// `from` 계정으로 배포하고 주소를 돌려준다
    pub async fn deploy<M: Middleware + 'static>(
        &self,
        client: Arc<M>,
        contract_name: &str,
        from: Address,
        args: Vec<Token>,
    ) -> Result<Address> {
        let artifact = self.load(contract_name).await?;
        if artifact.bytecode.is_empty() {
            return Err(anyhow!("{}: 배포 가능한 bytecode 없음", contract_name));
        }

        let factory = ContractFactory::new(artifact.abi, artifact.bytecode, client);
        let mut deployer = factory
            .deploy_tokens(args)
            .map_err(|e| anyhow!("{} 생성자 인코딩 실패: {}", contract_name, e))?;
        deployer.tx.set_from(from);

        let (contract, receipt) = deployer
            .send_with_receipt()
            .await
            .map_err(|e| anyhow!("{} 배포 실패: {}", contract_name, e))?;

        info!("🚀 {} deployed at {:?} (tx {:?})", contract_name, contract.address(), receipt.transaction_hash);
        Ok(contract.address())
    }

    /// 배포 후 레지스트리에 기록
    pub async fn deploy_and_register<M: Middleware + 'static>(
        &self,
        client: Arc<M>,
        registry: &ContractRegistry,
        contract_name: &str,
        from: Address,
        args: Vec<Token>,
    ) -> Result<Address> {
        let address = self.deploy(client, contract_name, from, args).await?;
        registry
            .save(contract_name, address, &format!("{}.sol", contract_name), contract_name)
            .await?;
        Ok(address)
    }

    /// 레지스트리의 배포 이름을 아티팩트 ABI와 묶는다
    pub async fn load_contract<M: Middleware + 'static>(
        &self,
        client: Arc<M>,
        registry: &ContractRegistry,
        deployed_name: &str,
    ) -> Result<LoadedContract<M>> {
        let deployed = registry.get(deployed_name).await?;
        let artifact = self.load_from(&deployed.folder, &deployed.contract_name).await?;

        Ok(LoadedContract {
            name: deployed.deployed_contract_name,
            address: deployed.address,
            contract: Contract::new(deployed.address, artifact.abi, client),
            raw_abi: artifact.raw_abi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{MockProvider, Provider};
    use tempfile::tempdir;

    const ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "CompFarmingMath",
        "sourceName": "contracts/CompFarmingMath.sol",
        "abi": [
            {"type":"function","name":"getCompProfile","stateMutability":"view",
             "inputs":[{"name":"acc","type":"address","internalType":"address"}],
             "outputs":[{"name":"","type":"tuple","internalType":"struct CompProfile",
                "components":[{"name":"yetToClaimed","type":"uint256","internalType":"uint256"}]}]}
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x"
    }"#;

    async fn write_artifact(dir: &Path) {
        let folder = dir.join("CompFarmingMath.sol");
        tokio::fs::create_dir_all(&folder).await.unwrap();
        tokio::fs::write(folder.join("CompFarmingMath.json"), ARTIFACT).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_artifact() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path()).await;
        let store = ArtifactStore::new(dir.path());

        let artifact = store.load("CompFarmingMath").await.unwrap();

        assert_eq!(artifact.contract_name, "CompFarmingMath");
        assert!(artifact.abi.function("getCompProfile").is_ok());
        assert_eq!(artifact.bytecode.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert!(artifact.raw_abi.is_array());
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store.load("UserProxy").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HarnessError>(), Some(HarnessError::ArtifactNotFound(_))));
    }

    #[tokio::test]
    async fn test_load_contract_binds_registry_address() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path()).await;
        let store = ArtifactStore::new(dir.path());
        let registry = ContractRegistry::new(dir.path().join("data"), "deployed_contracts");
        let address = Address::from([0x42; 20]);
        registry.save("CompFarmingMath", address, "CompFarmingMath.sol", "CompFarmingMath").await.unwrap();

        let (provider, _mock) = Provider::mocked();
        let loaded = store
            .load_contract(Arc::new(provider), &registry, "CompFarmingMath")
            .await
            .unwrap();

        assert_eq!(loaded.address, address);
        assert_eq!(loaded.contract.address(), address);
        assert_eq!(loaded.name, "CompFarmingMath");
    }

    #[tokio::test]
    async fn test_load_contract_not_deployed() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let registry = ContractRegistry::new(dir.path(), "deployed_contracts");
        let (provider, _mock): (Provider<MockProvider>, _) = Provider::mocked();

        let err = store
            .load_contract(Arc::new(provider), &registry, "UserProxy")
            .await
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<HarnessError>(), Some(HarnessError::ContractNotDeployed(_))));
    }
}
