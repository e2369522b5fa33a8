use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ethers::{
    abi::Token,
    contract::Contract,
    providers::Middleware,
    types::{Address, U256},
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::blockchain::abi::{
    json_abi, output_field_path, outputs_of, token_address, token_at, token_uint, tuple_items,
    uint_field,
};
use crate::blockchain::LoadedContract;

const COMP_FARMING_MATH_ABI: &str = include_str!("../../abi/comp_farming_math.json");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyProfile {
    pub c_token_amt: U256,
    #[serde(rename = "amount_")]
    pub amount: U256,
    #[serde(rename = "exchangeRate_")]
    pub exchange_rate: U256,
    #[serde(rename = "collateralFactor_")]
    pub collateral_factor: U256,
    #[serde(rename = "compSupplySpeed_")]
    pub comp_supply_speed: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BorrowProfile {
    pub amount: U256,
    #[serde(rename = "compBorrowSpeed_")]
    pub comp_borrow_speed: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    #[serde(rename = "cToken")]
    pub c_token: Address,
    #[serde(rename = "underlyingDecimals_")]
    pub underlying_decimals: U256,
}

/// `getAssetProfile` 결과 (`AccountProfileLib.AssetProfile`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetProfile {
    pub supply: SupplyProfile,
    pub borrow: BorrowProfile,
    pub asset: AssetInfo,
    #[serde(rename = "principal_")]
    pub principal: U256,
    #[serde(rename = "borrowLimitPCT_")]
    pub borrow_limit_pct: U256,
    #[serde(rename = "compRewardPerBlock_")]
    pub comp_reward_per_block: U256,
}

impl AssetProfile {
    pub fn from_token(token: &Token) -> Result<Self> {
        let items = tuple_items(token, "AssetProfile")?;
        let part = |index: usize, what: &str| -> Result<Vec<Token>> {
            let token = items.get(index).ok_or_else(|| anyhow!("AssetProfile: {} 없음", what))?;
            tuple_items(token, what)
        };

        let supply = part(0, "AssetProfile.supply")?;
        let borrow = part(1, "AssetProfile.borrow")?;
        let asset = part(2, "AssetProfile.asset")?;
        let c_token = asset
            .first()
            .ok_or_else(|| anyhow!("AssetProfile.asset.cToken 없음"))
            .and_then(|t| token_address(t, "AssetProfile.asset.cToken"))?;

        Ok(Self {
            supply: SupplyProfile {
                c_token_amt: uint_field(&supply, 0, "supply.cTokenAmt")?,
                amount: uint_field(&supply, 1, "supply.amount_")?,
                exchange_rate: uint_field(&supply, 2, "supply.exchangeRate_")?,
                collateral_factor: uint_field(&supply, 3, "supply.collateralFactor_")?,
                comp_supply_speed: uint_field(&supply, 4, "supply.compSupplySpeed_")?,
            },
            borrow: BorrowProfile {
                amount: uint_field(&borrow, 0, "borrow.amount")?,
                comp_borrow_speed: uint_field(&borrow, 1, "borrow.compBorrowSpeed_")?,
            },
            asset: AssetInfo {
                c_token,
                underlying_decimals: uint_field(&asset, 1, "asset.underlyingDecimals_")?,
            },
            principal: uint_field(&items, 3, "principal_")?,
            borrow_limit_pct: uint_field(&items, 4, "borrowLimitPCT_")?,
            comp_reward_per_block: uint_field(&items, 5, "compRewardPerBlock_")?,
        })
    }

    /// 시나리오 비교용 값 (`expect_<field>` 컬럼 이름 기준)
    pub fn actual_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert("borrowLimitPCT_".to_string(), self.borrow_limit_pct.to_string());
        values.insert("supplyAmt".to_string(), self.supply.amount.to_string());
        values.insert("borrowAmt".to_string(), self.borrow.amount.to_string());
        values.insert("principal".to_string(), self.principal.to_string());
        values.insert("compRewardPerBlock".to_string(), self.comp_reward_per_block.to_string());
        values
    }
}

/// `getFarmingContext` 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingContext {
    pub block_number: U256,
    #[serde(rename = "rate_u")]
    pub rate_u: U256,
    pub k: U256,
    #[serde(rename = "rate_mul")]
    pub rate_mul: U256,
    #[serde(rename = "rate_base")]
    pub rate_base: U256,
    #[serde(rename = "f_reserve")]
    pub f_reserve: U256,
    #[serde(rename = "f_c")]
    pub f_c: U256,
    #[serde(rename = "rate_jump")]
    pub rate_jump: U256,
    pub comp_supply_speed: U256,
    pub comp_borrow_speed: U256,
}

impl FarmingContext {
    pub fn from_outputs(outputs: &[Token]) -> Result<Self> {
        let field = |index: usize, what: &str| uint_field(outputs, index, what);
        Ok(Self {
            block_number: field(0, "blockNumber")?,
            rate_u: field(1, "rate_u")?,
            k: field(2, "k")?,
            rate_mul: field(3, "rate_mul")?,
            rate_base: field(4, "rate_base")?,
            f_reserve: field(5, "f_reserve")?,
            f_c: field(6, "f_c")?,
            rate_jump: field(7, "rate_jump")?,
            comp_supply_speed: field(8, "compSupplySpeed")?,
            comp_borrow_speed: field(9, "compBorrowSpeed")?,
        })
    }
}

/// `getCompProfile` 결과. 구조체 전체는 원본 토큰으로 보관한다
#[derive(Debug, Clone, PartialEq)]
pub struct CompProfile {
    pub yet_to_claimed: U256,
    pub outputs: Vec<Token>,
}

/// CompFarmingMath 조회 래퍼
pub struct CompFarmingMath<M> {
    contract: Contract<M>,
    raw_abi: Value,
}

impl<M: Middleware + 'static> CompFarmingMath<M> {
    /// 내장 ABI로 바인딩
    pub fn new(address: Address, client: Arc<M>) -> Result<Self> {
        let (abi, raw_abi) = json_abi(COMP_FARMING_MATH_ABI)?;
        Ok(Self { contract: Contract::new(address, abi, client), raw_abi })
    }

    /// 배포 아티팩트 ABI로 바인딩 (`getCompProfile` 포함)
    pub fn from_loaded(loaded: LoadedContract<M>) -> Self {
        Self { contract: loaded.contract, raw_abi: loaded.raw_abi }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    pub async fn get_asset_profile(&self, account: Address, ctoken: Address) -> Result<AssetProfile> {
        let token = self
            .contract
            .method::<_, Token>("getAssetProfile", (account, ctoken))?
            .call()
            .await?;
        AssetProfile::from_token(&token)
    }

    pub async fn get_farming_context(&self, ctoken: Address) -> Result<FarmingContext> {
        let token = self
            .contract
            .method::<_, Token>("getFarmingContext", ctoken)?
            .call()
            .await?;
        FarmingContext::from_outputs(&outputs_of(token, 10))
    }

    pub async fn get_comp_profile(&self, account: Address) -> Result<CompProfile> {
        let function = self
            .contract
            .abi()
            .function("getCompProfile")
            .map_err(|e| anyhow!("getCompProfile 없음 (아티팩트 ABI 필요): {}", e))?;
        let output_count = function.outputs.len();
        let path = output_field_path(&self.raw_abi, "getCompProfile", "yetToClaimed")
            .ok_or_else(|| anyhow!("getCompProfile 출력에 yetToClaimed 없음"))?;

        let token = self
            .contract
            .method::<_, Token>("getCompProfile", account)?
            .call()
            .await?;
        let outputs = outputs_of(token, output_count);
        let yet_to_claimed = token_at(&outputs, &path)
            .ok_or_else(|| anyhow!("yetToClaimed 디코딩 실패 (path {:?})", path))
            .and_then(|t| token_uint(t, "yetToClaimed"))?;

        debug!("🪙 {:?} yetToClaimed = {}", account, yet_to_claimed);
        Ok(CompProfile { yet_to_claimed, outputs })
    }
}
