use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use ethers::types::Address;

use crate::types::{HarnessError, HarnessResult, NamedAccount};

/// 이름 → 노드 계정 매핑 (`deployer`, `vaultUser1`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerBook {
    accounts: BTreeMap<String, Address>,
}

impl SignerBook {
    /// 설정의 이름 → 계정 인덱스를 `eth_accounts` 결과로 해석
    pub fn from_accounts(indices: &BTreeMap<String, usize>, accounts: &[Address]) -> Result<Self> {
        let mut book = Self::default();
        for (name, index) in indices {
            let address = accounts.get(*index).ok_or_else(|| {
                anyhow!("signer {}: 계정 인덱스 {} 없음 (노드 계정 {}개)", name, index, accounts.len())
            })?;
            book.insert(name.clone(), *address);
        }
        Ok(book)
    }

    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.accounts.insert(name.into(), address);
    }

    pub fn resolve(&self, name: &str) -> HarnessResult<NamedAccount> {
        self.accounts
            .get(name)
            .map(|address| NamedAccount::new(name, *address))
            .ok_or_else(|| HarnessError::UnknownSigner(name.to_string()))
    }

    pub fn address(&self, name: &str) -> HarnessResult<Address> {
        Ok(self.resolve(name)?.address)
    }

    pub fn deployer(&self) -> HarnessResult<NamedAccount> {
        self.resolve("deployer")
    }
}
