use std::sync::Arc;

use anyhow::Result;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::Middleware,
    types::{Address, BlockId, TransactionReceipt, I256, U256},
};
use tracing::debug;

use crate::blockchain::abi::{human_abi, send_call};
use crate::utils::{from_u256, to_i256};

pub fn erc20_abi() -> Result<Abi> {
    human_abi(&[
        "function approve(address spender, uint256 amount)",
        "function balanceOf(address acc) view returns (uint256)",
        "function decimals() view returns (uint256)",
        "function symbol() view returns (string)",
        "function transfer(address to, uint256 amount)",
    ])
}

/// ERC-20 호출 래퍼. 호출마다 토큰 핸들을 새로 만든다
pub struct Erc20<M> {
    client: Arc<M>,
}

impl<M> Clone for Erc20<M> {
    fn clone(&self) -> Self {
        Self { client: Arc::clone(&self.client) }
    }
}

impl<M: Middleware + 'static> Erc20<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    fn token(&self, token: Address) -> Result<Contract<M>> {
        Ok(Contract::new(token, erc20_abi()?, Arc::clone(&self.client)))
    }

    pub async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<TransactionReceipt> {
        let call = self.token(token)?.method::<_, ()>("approve", (spender, amount))?.from(owner);
        let receipt = send_call(call, "erc20.approve").await?;
        debug!("✅ approve {:?} → {:?}: {}", token, spender, amount);
        Ok(receipt)
    }

    pub async fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> Result<TransactionReceipt> {
        let call = self.token(token)?.method::<_, ()>("transfer", (to, amount))?.from(from);
        send_call(call, "erc20.transfer").await
    }

    pub async fn balance_of(&self, token: Address, account: Address) -> Result<U256> {
        Ok(self.token(token)?.method::<_, U256>("balanceOf", account)?.call().await?)
    }

    /// 특정 블록 시점 잔고
    pub async fn balance_of_at(&self, token: Address, account: Address, block: u64) -> Result<U256> {
        Ok(self
            .token(token)?
            .method::<_, U256>("balanceOf", account)?
            .block(BlockId::from(block))
            .call()
            .await?)
    }

    /// 두 블록 사이 잔고 변화 (음수 가능)
    pub async fn delta_balance(&self, token: Address, account: Address, block0: u64, block1: u64) -> Result<I256> {
        let balance0 = self.balance_of_at(token, account, block0).await?;
        let balance1 = self.balance_of_at(token, account, block1).await?;
        Ok(to_i256(&(from_u256(balance1) - from_u256(balance0)))?)
    }

    pub async fn decimals(&self, token: Address) -> Result<u32> {
        let decimals = self.token(token)?.method::<_, U256>("decimals", ())?.call().await?;
        Ok(decimals.low_u32())
    }

    pub async fn symbol(&self, token: Address) -> Result<String> {
        Ok(self.token(token)?.method::<_, String>("symbol", ())?.call().await?)
    }
}
