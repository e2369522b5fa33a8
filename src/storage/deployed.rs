use std::path::PathBuf;

use anyhow::Result;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::files::{load_obj_or_default, save_obj};
use crate::types::HarnessError;

/// 배포 기록 한 건
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContract {
    pub deployed_contract_name: String,
    pub address: Address,
    /// 아티팩트 폴더 (`CompFarmingContract.sol`)
    pub folder: String,
    pub contract_name: String,
}

/// `deployed_contracts.json` 레지스트리
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    dir: PathBuf,
    name: String,
}

impl ContractRegistry {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self { dir: dir.into(), name: name.into() }
    }

    pub async fn load(&self) -> Result<Vec<DeployedContract>> {
        load_obj_or_default(&self.dir, &self.name).await
    }

    /// 같은 이름의 기존 항목을 모두 지우고 새 항목을 추가
    pub async fn save(
        &self,
        deployed_contract_name: &str,
        address: Address,
        folder: &str,
        contract_name: &str,
    ) -> Result<()> {
        let mut contracts = self.load().await?;
        contracts.retain(|c| c.deployed_contract_name != deployed_contract_name);
        contracts.push(DeployedContract {
            deployed_contract_name: deployed_contract_name.to_string(),
            address,
            folder: folder.to_string(),
            contract_name: contract_name.to_string(),
        });
        save_obj(&self.dir, &self.name, &contracts).await?;
        info!("📝 {} 등록: {:?}", deployed_contract_name, address);
        Ok(())
    }

    pub async fn get(&self, deployed_contract_name: &str) -> Result<DeployedContract> {
        self.load()
            .await?
            .into_iter()
            .find(|c| c.deployed_contract_name == deployed_contract_name)
            .ok_or_else(|| HarnessError::ContractNotDeployed(deployed_contract_name.to_string()).into())
    }

    pub async fn address_of(&self, deployed_contract_name: &str) -> Result<Address> {
        Ok(self.get(deployed_contract_name).await?.address)
    }

    /// 레지스트리 초기화 (`[]`)
    pub async fn clear(&self) -> Result<()> {
        save_obj(&self.dir, &self.name, &Vec::<DeployedContract>::new()).await?;
        info!("🧹 배포 기록 초기화");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[tokio::test]
    async fn test_save_replaces_same_name() {
        let dir = tempdir().unwrap();
        let registry = ContractRegistry::new(dir.path(), "deployed_contracts");

        registry.save("CompFarmingMath", addr(1), "CompFarmingMath.sol", "CompFarmingMath").await.unwrap();
        registry.save("UserProxy", addr(2), "UserProxy.sol", "UserProxy").await.unwrap();
        registry.save("CompFarmingMath", addr(3), "CompFarmingMath.sol", "CompFarmingMath").await.unwrap();

        let contracts = registry.load().await.unwrap();
        assert_eq!(contracts.len(), 2);
        assert_eq!(registry.address_of("CompFarmingMath").await.unwrap(), addr(3));
        assert_eq!(registry.address_of("UserProxy").await.unwrap(), addr(2));
        // 최신 항목은 끝에 추가된다
        assert_eq!(contracts[1].deployed_contract_name, "CompFarmingMath");
    }

    #[tokio::test]
    async fn test_json_field_names() {
        let dir = tempdir().unwrap();
        let registry = ContractRegistry::new(dir.path(), "deployed_contracts");
        registry.save("UserProxy", addr(2), "UserProxy.sol", "UserProxy").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("deployed_contracts.json")).unwrap();
        assert!(raw.contains("\"deployedContractName\": \"UserProxy\""));
        assert!(raw.contains("\"contractName\": \"UserProxy\""));
        assert!(raw.contains("\"folder\": \"UserProxy.sol\""));
    }

    #[tokio::test]
    async fn test_clear_and_missing() {
        let dir = tempdir().unwrap();
        let registry = ContractRegistry::new(dir.path(), "deployed_contracts");
        registry.save("UserProxy", addr(2), "UserProxy.sol", "UserProxy").await.unwrap();
        registry.clear().await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("deployed_contracts.json")).unwrap();
        assert_eq!(raw, "[]");
        let err = registry.address_of("UserProxy").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::ContractNotDeployed(name)) if name == "UserProxy"
        ));
    }
}
