use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    abi::Token,
    providers::Middleware,
    types::{Address, U256},
};
use tracing::{debug, info};

use super::env::TestEnv;
use super::{RowOutcome, Scenario, ScenarioReport};
use crate::blockchain::abi::send_call;
use crate::constants::{
    COMP_FARMING_CONTRACT, COMP_FARMING_MATH, FLASHLOAN_APPROVE_BUFFER, PREVIEW_AND_FLASHLOAN,
    USER_PROXY, USER_PROXY_FACTORY,
};
use crate::fixtures::TestRow;
use crate::protocols::{CompFarmingMath, PreviewRequest, UserProxy};
use crate::types::HarnessError;

pub const NAME: &str = "compFarmingContract";

/// 레버리지 파밍 컨트랙트 시나리오 (미리보기 → 플래시론 → 하베스트)
pub struct CompFarmingContractScenario<M> {
    env: TestEnv<M>,
    math: Option<CompFarmingMath<M>>,
    proxy: Option<UserProxy<M>>,
}

impl<M: Middleware + 'static> CompFarmingContractScenario<M> {
    pub fn new(env: TestEnv<M>) -> Self {
        Self { env, math: None, proxy: None }
    }

    /// CompFarmingMath, CompFarmingContract, UserProxyFactory 배포
    async fn migrate_contracts(&self) -> Result<Address> {
        self.env.deploy(COMP_FARMING_MATH, vec![]).await?;
        let farming_contract = self.env.deploy(COMP_FARMING_CONTRACT, vec![]).await?;

        let solo_margin = self.env.solo_margin().await;
        self.env
            .deploy(
                USER_PROXY_FACTORY,
                vec![Token::Address(farming_contract), Token::Address(solo_margin)],
            )
            .await
    }

    /// 배포자의 사용자 프록시 생성 후 `UserProxy`로 기록
    async fn create_user_proxy(&self, owner: Address) -> Result<Address> {
        let factory = self
            .env
            .artifacts
            .load_contract(Arc::clone(&self.env.client), &self.env.registry, USER_PROXY_FACTORY)
            .await?;

        let create = factory.contract.method::<_, ()>("createUserProxy", ())?.from(owner);
        let receipt = send_call(create, "createUserProxy").await?;
        info!("👤 createUserProxy done! {:?}", receipt.transaction_hash);

        let proxy: Address = factory
            .contract
            .method::<_, Address>("proxy_to_user", owner)?
            .call()
            .await?;
        self.env
            .registry
            .save(USER_PROXY, proxy, &format!("{}.sol", USER_PROXY), USER_PROXY)
            .await?;
        info!("👤 User proxy address {:?}", proxy);
        Ok(proxy)
    }

    async fn run_row(&self, row: &TestRow) -> Result<BTreeMap<String, String>> {
        let math = self
            .math
            .as_ref()
            .ok_or_else(|| HarnessError::ContractNotDeployed(COMP_FARMING_MATH.to_string()))?;
        let proxy = self
            .proxy
            .as_ref()
            .ok_or_else(|| HarnessError::ContractNotDeployed(USER_PROXY.to_string()))?;

        let underlying = row.address("underlying")?;
        let ctoken = row.address("cToken")?;
        let delta_principal = row.i256("deltaPrincipal")?;
        let signer = row.signer("signer")?;

        let preview = proxy
            .preview_account_profile(&PreviewRequest {
                comp_farming_math: math.address(),
                underlying,
                delta_principal,
                ctoken,
                delta_borrow_limit_pct: row.i256("deltaBorrowLimitPCT")?,
                close: row.flag("close")?,
            })
            .await?;
        info!("🔍 preview loan amount: {}", preview.flash_loan_params.loan_amount);
        debug!("previewResult: {}", serde_json::to_string(&preview)?);

        if delta_principal.is_positive() {
            let amount = delta_principal.into_raw() + U256::from(FLASHLOAN_APPROVE_BUFFER);
            let approve = self
                .env
                .erc20
                .approve(underlying, proxy.owner(), proxy.address(), amount)
                .await?;
            info!("✅ approveTx: {:?}", approve.transaction_hash);
        }

        let flash_loan = proxy.flash_loan(&preview.flash_loan_params).await?;

        let context = math.get_farming_context(ctoken).await?;
        debug!("farmingContext: {}", serde_json::to_string(&context)?);

        let block0 = self.env.node.block_number().await?;
        info!("⚡ flashLoanTx: {:?} - blockNumber: {}", flash_loan.transaction_hash, block0);

        let profile_after = math.get_asset_profile(proxy.address(), ctoken).await?;
        debug!("assetProfileAfter: {}", serde_json::to_string(&profile_after)?);
        let mut actual = profile_after.actual_values();

        self.env.compound.accrue_interest(ctoken, signer.address).await?;
        let profile_later = math.get_asset_profile(proxy.address(), ctoken).await?;
        let block1 = self.env.node.block_number().await?;
        info!(
            "⏱️ blockNumberDiff: {} / supply.amount: {} / borrow.amount: {} / borrowLimitPCT_: {}",
            block1.saturating_sub(block0),
            profile_later.supply.amount,
            profile_later.borrow.amount,
            profile_later.borrow_limit_pct
        );

        proxy.harvest().await?;
        let comp = self.env.compound.constants().comp_token()?;
        let comp_balance = self.env.erc20.balance_of(comp, signer.address).await?;
        info!("🪙 comp balance of {}: {}", signer, comp_balance);
        actual.insert("compBalance".to_string(), comp_balance.to_string());

        Ok(actual)
    }
}

#[async_trait]
impl<M: Middleware + 'static> Scenario for CompFarmingContractScenario<M> {
    fn name(&self) -> &str {
        NAME
    }

    fn default_fixture(&self) -> &str {
        PREVIEW_AND_FLASHLOAN
    }

    async fn initialize(&mut self) -> Result<()> {
        let deployer = self.env.deployer()?;
        self.migrate_contracts().await?;

        let math = self
            .env
            .artifacts
            .load_contract(Arc::clone(&self.env.client), &self.env.registry, COMP_FARMING_MATH)
            .await?;
        self.math = Some(CompFarmingMath::from_loaded(math));

        let proxy = self.create_user_proxy(deployer.address).await?;
        self.proxy = Some(UserProxy::new(proxy, deployer.address, Arc::clone(&self.env.client))?);

        info!("✅ {} 초기화 완료", NAME);
        Ok(())
    }

    async fn run(&mut self, csv_key: &str) -> Result<ScenarioReport> {
        let rows = self.env.loader().get_test_data(csv_key).await?;
        let mut report = ScenarioReport::new(NAME, csv_key);

        for row in &rows {
            info!("🧪 ==== test case row {} ====", row.row());
            if !row.is_on() {
                report.rows.push(RowOutcome::skipped(row.row()));
                continue;
            }
            let actual = self.run_row(row).await?;
            report.rows.push(RowOutcome::checked(row, actual));
        }

        Ok(report)
    }
}
