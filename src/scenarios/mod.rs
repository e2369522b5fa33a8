//! 시나리오 스크립트: 컨트랙트 배포, 픽스처 행 실행, 기대값 비교

pub mod comp_farming_contract;
pub mod comp_farming_math;
pub mod env;
pub mod post_network;

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::providers::Middleware;
use serde::Serialize;
use tracing::{info, warn};

use crate::blockchain::NodeClient;
use crate::fixtures::TestRow;
use crate::types::{HarnessError, HarnessResult};

pub use comp_farming_contract::CompFarmingContractScenario;
pub use comp_farming_math::CompFarmingMathScenario;
pub use env::TestEnv;
pub use post_network::{post_network, PostNetworkReport};

#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// 인자 없이 실행할 때 쓰는 픽스처 키
    fn default_fixture(&self) -> &str;

    /// 컨트랙트 배포와 핸들 준비
    async fn initialize(&mut self) -> Result<()>;

    async fn run(&mut self, csv_key: &str) -> Result<ScenarioReport>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RowOutcome {
    pub row: usize,
    pub skipped: bool,
    pub actual: BTreeMap<String, String>,
    pub mismatches: Vec<Mismatch>,
}

impl RowOutcome {
    pub fn skipped(row: usize) -> Self {
        Self { row, skipped: true, ..Default::default() }
    }

    pub fn checked(row: &TestRow, actual: BTreeMap<String, String>) -> Self {
        let mismatches = compare_expectations(row, &actual);
        Self { row: row.row(), skipped: false, actual, mismatches }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub fixture: String,
    pub rows: Vec<RowOutcome>,
}

impl ScenarioReport {
    pub fn new(scenario: &str, fixture: &str) -> Self {
        Self { scenario: scenario.to_string(), fixture: fixture.to_string(), rows: Vec::new() }
    }

    pub fn executed(&self) -> usize {
        self.rows.iter().filter(|row| !row.skipped).count()
    }

    pub fn passed(&self) -> bool {
        self.rows.iter().all(|row| row.mismatches.is_empty())
    }

    /// 첫 번째 불일치를 에러로
    pub fn ensure_passed(&self) -> HarnessResult<()> {
        for outcome in &self.rows {
            if let Some(mismatch) = outcome.mismatches.first() {
                return Err(HarnessError::FixtureMismatch {
                    row: outcome.row,
                    field: mismatch.field.clone(),
                    expected: mismatch.expected.clone(),
                    actual: mismatch.actual.clone(),
                });
            }
        }
        Ok(())
    }
}

/// `expect_<field>` 컬럼과 실제 값 비교. 실제 값이 없는 필드는 건너뛴다
pub fn compare_expectations(row: &TestRow, actual: &BTreeMap<String, String>) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for (field, expected) in row.expectations() {
        match actual.get(&field) {
            Some(value) if *value == expected => {}
            Some(value) => mismatches.push(Mismatch { field, expected, actual: value.clone() }),
            None => warn!("⚠️ row {}: expect_{}에 해당하는 값 없음", row.row(), field),
        }
    }
    mismatches
}

pub const SCENARIO_NAMES: [&str; 2] = [comp_farming_contract::NAME, comp_farming_math::NAME];

/// 이름으로 시나리오 생성
pub fn build<M: Middleware + 'static>(name: &str, env: TestEnv<M>) -> Result<Box<dyn Scenario>> {
    match name {
        comp_farming_contract::NAME => Ok(Box::new(CompFarmingContractScenario::new(env))),
        comp_farming_math::NAME => Ok(Box::new(CompFarmingMathScenario::new(env))),
        other => Err(anyhow!("알 수 없는 시나리오: {} (가능: {})", other, SCENARIO_NAMES.join(", "))),
    }
}

/// 초기 스냅샷 복원 → 초기화 → 실행
pub async fn execute<M: Middleware + 'static>(
    scenario: &mut dyn Scenario,
    node: &NodeClient<M>,
    csv_key: Option<&str>,
) -> Result<ScenarioReport> {
    node.revert_to_initial_snapshot().await?;
    scenario.initialize().await?;

    let fixture = csv_key.unwrap_or(scenario.default_fixture()).to_string();
    info!("🎬 {} / {}", scenario.name(), fixture);
    let report = scenario.run(&fixture).await?;

    info!(
        "📊 {}: {}행 실행, {}",
        report.scenario,
        report.executed(),
        if report.passed() { "✅ 통과" } else { "❌ 불일치" }
    );
    Ok(report)
}
