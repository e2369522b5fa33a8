use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use num_bigint::BigInt;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::Middleware,
    types::{Address, TransactionReceipt, U256},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::erc20::Erc20;
use crate::blockchain::abi::{human_abi, send_call};
use crate::storage::load_obj;
use crate::types::{HarnessError, HarnessResult};
use crate::utils::{from_u256, to_u256};

/// `comp_constant.json`
///
/// `Comptroller` 주소와 마켓별 그룹(`cDAI: { address, underlying, ... }`)으로 구성된다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompConstants(pub BTreeMap<String, Value>);

impl CompConstants {
    pub async fn load(data_dir: &Path, name: &str) -> Result<Self> {
        let constants: CompConstants = load_obj(data_dir, name).await?;
        info!("🏦 Compound 상수 로드: 항목 {}개", constants.0.len());
        Ok(constants)
    }

    /// `"group.field"` 또는 최상위 `"Comptroller"` 형태의 키로 조회
    pub fn value(&self, key: &str) -> HarnessResult<&Value> {
        let not_found = || HarnessError::ConstantNotFound(key.to_string());
        let mut parts = key.split('.');
        let head = parts.next().ok_or_else(not_found)?;
        let mut current = self.0.get(head).ok_or_else(not_found)?;
        for part in parts {
            current = current.get(part).ok_or_else(not_found)?;
        }
        Ok(current)
    }

    pub fn address(&self, key: &str) -> HarnessResult<Address> {
        self.value(key)?
            .as_str()
            .and_then(|s| Address::from_str(s).ok())
            .ok_or_else(|| HarnessError::ConstantNotFound(key.to_string()))
    }

    pub fn comptroller(&self) -> HarnessResult<Address> {
        self.address("Comptroller")
    }

    /// COMP 토큰 주소
    pub fn comp_token(&self) -> HarnessResult<Address> {
        self.address("Comp.address")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTotals {
    /// underlying 기준
    pub total_borrow: U256,
    /// cToken 기준
    pub total_supply: U256,
    pub cash: U256,
    pub total_reserves: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompSpeeds {
    pub comp_supply_speed: U256,
    pub comp_borrow_speed: U256,
}

fn ctoken_abi() -> Result<Abi> {
    human_abi(&[
        "function accrueInterest() returns (uint256)",
        "function exchangeRateCurrent() returns (uint256)",
        "function balanceOf(address acc) view returns (uint256)",
        "function totalBorrowsCurrent() returns (uint256)",
        "function totalSupply() view returns (uint256)",
        "function getCash() view returns (uint256)",
        "function totalReserves() view returns (uint256)",
        "function borrowBalanceCurrent(address account) returns (uint256)",
        "function mint(uint256 mintAmount) returns (uint256)",
        "function borrow(uint256 borrowAmount) returns (uint256)",
    ])
}

fn comptroller_abi() -> Result<Abi> {
    human_abi(&[
        "function compSupplySpeeds(address cToken) view returns (uint256)",
        "function compBorrowSpeeds(address cToken) view returns (uint256)",
        "function enterMarkets(address[] cTokens) returns (uint256[])",
    ])
}

/// Compound v2 cToken / Comptroller 래퍼
pub struct Compound<M> {
    client: Arc<M>,
    constants: CompConstants,
}

impl<M: Middleware + 'static> Compound<M> {
    pub fn new(client: Arc<M>, constants: CompConstants) -> Self {
        Self { client, constants }
    }

    pub fn constants(&self) -> &CompConstants {
        &self.constants
    }

    fn ctoken(&self, ctoken: Address) -> Result<Contract<M>> {
        Ok(Contract::new(ctoken, ctoken_abi()?, Arc::clone(&self.client)))
    }

    fn comptroller(&self) -> Result<Contract<M>> {
        Ok(Contract::new(self.constants.comptroller()?, comptroller_abi()?, Arc::clone(&self.client)))
    }

    pub async fn accrue_interest(&self, ctoken: Address, from: Address) -> Result<TransactionReceipt> {
        let call = self.ctoken(ctoken)?.method::<_, U256>("accrueInterest", ())?.from(from);
        send_call(call, "cToken.accrueInterest").await
    }

    pub async fn exchange_rate_current(&self, ctoken: Address) -> Result<U256> {
        Ok(self.ctoken(ctoken)?.method::<_, U256>("exchangeRateCurrent", ())?.call().await?)
    }

    pub async fn ctoken_balance(&self, ctoken: Address, account: Address) -> Result<U256> {
        Ok(self.ctoken(ctoken)?.method::<_, U256>("balanceOf", account)?.call().await?)
    }

    pub async fn total_supply_and_borrow(&self, ctoken: Address) -> Result<MarketTotals> {
        let contract = self.ctoken(ctoken)?;
        let total_borrow = contract.method::<_, U256>("totalBorrowsCurrent", ())?.call().await?;
        let cash = contract.method::<_, U256>("getCash", ())?.call().await?;
        let total_reserves = contract.method::<_, U256>("totalReserves", ())?.call().await?;
        let total_supply = contract.method::<_, U256>("totalSupply", ())?.call().await?;

        Ok(MarketTotals { total_borrow, total_supply, cash, total_reserves })
    }

    pub async fn comp_speeds(&self, ctoken: Address) -> Result<CompSpeeds> {
        let comptroller = self.comptroller()?;
        let comp_supply_speed = comptroller.method::<_, U256>("compSupplySpeeds", ctoken)?.call().await?;
        let comp_borrow_speed = comptroller.method::<_, U256>("compBorrowSpeeds", ctoken)?.call().await?;

        Ok(CompSpeeds { comp_supply_speed, comp_borrow_speed })
    }

    /// 공급 잔고 (underlying 단위) = cToken 잔고 × exchangeRate / 1e18
    pub async fn supply_balance_current(&self, ctoken: Address, account: Address) -> Result<U256> {
        let balance = self.ctoken_balance(ctoken, account).await?;
        let rate = self.exchange_rate_current(ctoken).await?;
        Ok(underlying_amount(balance, rate)?)
    }

    pub async fn borrow_balance_current(&self, ctoken: Address, account: Address) -> Result<U256> {
        Ok(self
            .ctoken(ctoken)?
            .method::<_, U256>("borrowBalanceCurrent", account)?
            .call()
            .await?)
    }

    /// approve → mint → enterMarkets
    pub async fn supply(&self, underlying: Address, ctoken: Address, amount: U256, from: Address) -> Result<()> {
        Erc20::new(Arc::clone(&self.client)).approve(underlying, from, ctoken, amount).await?;

        let mint = self.ctoken(ctoken)?.method::<_, U256>("mint", amount)?.from(from);
        send_call(mint, "cToken.mint").await?;

        let enter = self
            .comptroller()?
            .method::<_, Vec<U256>>("enterMarkets", vec![ctoken])?
            .from(from);
        send_call(enter, "comptroller.enterMarkets").await?;

        info!("🏦 supply {} → {:?} from {:?}", amount, ctoken, from);
        Ok(())
    }

    pub async fn borrow(&self, ctoken: Address, amount: U256, from: Address) -> Result<()> {
        let call = self.ctoken(ctoken)?.method::<_, U256>("borrow", amount)?.from(from);
        send_call(call, "cToken.borrow").await?;
        debug!("💸 borrow {} from {:?} by {:?}", amount, ctoken, from);
        Ok(())
    }
}

/// cToken 수량 → underlying 수량 (exchangeRate는 1e18 스케일)
pub fn underlying_amount(ctoken_amount: U256, exchange_rate: U256) -> HarnessResult<U256> {
    let scaled = from_u256(ctoken_amount) * from_u256(exchange_rate) / BigInt::from(10u32).pow(18);
    to_u256(&scaled)
}
