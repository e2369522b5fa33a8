use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::{abi::Token, providers::Middleware, types::Address};
use serde_json::Value;
use tracing::{info, warn};

use crate::blockchain::{ArtifactStore, NodeClient};
use crate::config::Config;
use crate::constants::SETUP_EOA_FARMING;
use crate::fixtures::{SignerBook, TestDataLoader};
use crate::protocols::{CompConstants, Compound, Dydx, Erc20};
use crate::storage::{ContractRegistry, SnapshotStore};
use crate::types::NamedAccount;

/// 시나리오 공용 환경: 노드, 상수, 서명자, 배포 기록
pub struct TestEnv<M> {
    pub config: Config,
    pub client: Arc<M>,
    pub node: NodeClient<M>,
    pub registry: ContractRegistry,
    pub artifacts: ArtifactStore,
    pub compound: Compound<M>,
    pub erc20: Erc20<M>,
    pub signers: SignerBook,
}

impl<M: Middleware + 'static> TestEnv<M> {
    pub async fn new(config: Config, client: Arc<M>) -> Result<Self> {
        let paths = &config.paths;
        let node = NodeClient::new(
            Arc::clone(&client),
            SnapshotStore::new(&paths.root_dir, &paths.snapshot_file),
        );

        let accounts = node.accounts().await.context("노드 계정 조회 실패")?;
        let signers = SignerBook::from_accounts(&config.signers, &accounts)?;

        let mut constants = CompConstants::load(&paths.data_dir, &paths.comp_constant_file).await?;
        if constants.comptroller().is_err() {
            warn!("⚠️ comp_constant에 Comptroller 없음, 설정값 사용: {:?}", config.addresses.comptroller);
            constants
                .0
                .insert("Comptroller".to_string(), Value::String(format!("{:?}", config.addresses.comptroller)));
        }

        Ok(Self {
            registry: ContractRegistry::new(&paths.data_dir, &paths.deployed_file),
            artifacts: ArtifactStore::new(&paths.artifacts_dir),
            compound: Compound::new(Arc::clone(&client), constants),
            erc20: Erc20::new(Arc::clone(&client)),
            node,
            signers,
            client,
            config,
        })
    }

    pub fn loader(&self) -> TestDataLoader {
        TestDataLoader::new(
            &self.config.paths.csv_dir,
            &self.config.paths.json_mirror_dir,
            self.compound.constants().clone(),
            self.signers.clone(),
        )
    }

    pub fn deployer(&self) -> Result<NamedAccount> {
        Ok(self.signers.deployer()?)
    }

    /// 배포자 계정으로 배포하고 `<Name>.sol` 폴더로 기록
    pub async fn deploy(&self, contract_name: &str, args: Vec<Token>) -> Result<Address> {
        let deployer = self.deployer()?;
        self.artifacts
            .deploy_and_register(Arc::clone(&self.client), &self.registry, contract_name, deployer.address, args)
            .await
    }

    /// dydx_constant의 SoloMargin. 파일이 없으면 설정값
    pub async fn solo_margin(&self) -> Address {
        let paths = &self.config.paths;
        match Dydx::load(Arc::clone(&self.client), &paths.data_dir, &paths.dydx_constant_file).await {
            Ok(dydx) => dydx.constants().solo_margin,
            Err(e) => {
                warn!("⚠️ dydx_constant 로드 실패, 설정값 사용: {}", e);
                self.config.addresses.solo_margin
            }
        }
    }

    /// `setup.eoaFarming` 행마다 supply 후 borrow. 실행한 행 수를 돌려준다
    pub async fn setup_eoa_farming(&self) -> Result<usize> {
        let rows = self.loader().get_test_data(SETUP_EOA_FARMING).await?;
        let mut executed = 0;

        for row in rows.iter().filter(|row| row.is_on()) {
            let signer = row.signer("signer")?;
            let underlying = row.address("underlying")?;
            let ctoken = row.address("cToken")?;

            self.compound
                .supply(underlying, ctoken, row.u256("supply_amount")?, signer.address)
                .await?;
            self.compound
                .borrow(ctoken, row.u256("borrow_amount")?, signer.address)
                .await?;
            executed += 1;
        }

        info!("🌾 EOA farming setup: {}/{}행 실행", executed, rows.len());
        Ok(executed)
    }
}
