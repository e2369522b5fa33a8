use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::providers::Middleware;
use num_bigint::BigInt;
use tracing::info;

use super::env::TestEnv;
use super::{RowOutcome, Scenario, ScenarioReport};
use crate::constants::{COMP_FARMING_MATH, GET_COMP_PROFILE};
use crate::protocols::CompFarmingMath;
use crate::types::HarnessError;
use crate::utils::from_u256;

pub const NAME: &str = "compFarmingMath";

/// 블록당 COMP 적립량 시나리오
pub struct CompFarmingMathScenario<M> {
    env: TestEnv<M>,
    math: Option<CompFarmingMath<M>>,
}

impl<M: Middleware + 'static> CompFarmingMathScenario<M> {
    pub fn new(env: TestEnv<M>) -> Self {
        Self { env, math: None }
    }
}

/// 한 블록 사이 `yetToClaimed` 증가분
pub fn comp_per_block(before: BigInt, after: BigInt) -> BigInt {
    after - before
}

#[async_trait]
impl<M: Middleware + 'static> Scenario for CompFarmingMathScenario<M> {
    fn name(&self) -> &str {
        NAME
    }

    fn default_fixture(&self) -> &str {
        GET_COMP_PROFILE
    }

    async fn initialize(&mut self) -> Result<()> {
        self.env.deploy(COMP_FARMING_MATH, vec![]).await?;
        let loaded = self
            .env
            .artifacts
            .load_contract(Arc::clone(&self.env.client), &self.env.registry, COMP_FARMING_MATH)
            .await?;
        self.math = Some(CompFarmingMath::from_loaded(loaded));
        info!("✅ {} 초기화 완료", NAME);
        Ok(())
    }

    async fn run(&mut self, csv_key: &str) -> Result<ScenarioReport> {
        let math = self
            .math
            .as_ref()
            .ok_or_else(|| HarnessError::ContractNotDeployed(COMP_FARMING_MATH.to_string()))?;

        self.env.setup_eoa_farming().await?;

        let rows = self.env.loader().get_test_data(csv_key).await?;
        let mut report = ScenarioReport::new(NAME, csv_key);

        for row in &rows {
            info!("🧪 ==== test case row {} ====", row.row());
            if !row.is_on() {
                report.rows.push(RowOutcome::skipped(row.row()));
                continue;
            }

            let account = row.address("acc")?;
            let before = math.get_comp_profile(account).await?;
            self.env.node.mine_blocks(1).await?;
            let after = math.get_comp_profile(account).await?;

            let per_block = comp_per_block(from_u256(before.yet_to_claimed), from_u256(after.yet_to_claimed));
            info!("🪙 compPerBlock: {}", per_block);

            let mut actual = BTreeMap::new();
            actual.insert("compPerBlock".to_string(), per_block.to_string());
            report.rows.push(RowOutcome::checked(row, actual));
        }

        Ok(report)
    }
}
