use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use ethers::{
    contract::Contract,
    providers::Middleware,
    types::{Address, U256},
    utils::to_checksum,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::erc20::Erc20;
use crate::blockchain::abi::human_abi;
use crate::constants;
use crate::storage::{load_obj, save_obj};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DydxMarket {
    pub market_id: u64,
    pub address: Address,
}

/// `dydx_constant.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DydxConstants {
    #[serde(rename = "SoloMargin")]
    pub solo_margin: Address,
    /// 토큰 주소(checksum) → 마켓
    #[serde(rename = "marketIds", default)]
    pub market_ids: BTreeMap<String, DydxMarket>,
    #[serde(rename = "marketIdsBySymbol", default)]
    pub market_ids_by_symbol: BTreeMap<String, DydxMarket>,
}

impl Default for DydxConstants {
    fn default() -> Self {
        Self {
            solo_margin: constants::address(constants::DYDX_SOLO_MARGIN).unwrap_or_default(),
            market_ids: BTreeMap::new(),
            market_ids_by_symbol: BTreeMap::new(),
        }
    }
}

impl DydxConstants {
    pub fn insert_market(&mut self, market_id: u64, address: Address, symbol: Option<String>) {
        let market = DydxMarket { market_id, address };
        self.market_ids.insert(to_checksum(&address, None), market.clone());
        if let Some(symbol) = symbol {
            self.market_ids_by_symbol.insert(symbol, market);
        }
    }
}

/// 은퇴한 SAI 마켓인지
pub fn is_retired_market(address: Address) -> bool {
    constants::address(constants::DYDX_RETIRED_SAI) == Some(address)
}

/// dYdX SoloMargin 상수 관리
pub struct Dydx<M> {
    client: Arc<M>,
    data_dir: PathBuf,
    file_name: String,
    constants: DydxConstants,
}

impl<M: Middleware + 'static> Dydx<M> {
    pub async fn load(client: Arc<M>, data_dir: &Path, file_name: &str) -> Result<Self> {
        let constants: DydxConstants = load_obj(data_dir, file_name).await?;
        info!("🏛️ dYdX 상수 로드: SoloMargin {:?}, 마켓 {}개", constants.solo_margin, constants.market_ids.len());
        Ok(Self {
            client,
            data_dir: data_dir.to_path_buf(),
            file_name: file_name.to_string(),
            constants,
        })
    }

    pub fn constants(&self) -> &DydxConstants {
        &self.constants
    }

    /// SoloMargin에서 마켓 목록을 다시 읽어 저장
    pub async fn refresh_markets(&mut self) -> Result<&DydxConstants> {
        let abi = human_abi(&[
            "function getNumMarkets() view returns (uint256)",
            "function getMarketTokenAddress(uint256 marketId) view returns (address)",
        ])?;
        let solo = Contract::new(self.constants.solo_margin, abi, Arc::clone(&self.client));
        let erc20 = Erc20::new(Arc::clone(&self.client));

        let count = solo.method::<_, U256>("getNumMarkets", ())?.call().await?.as_u64();
        info!("🔍 dYdX 마켓 {}개 조회", count);

        for market_id in 0..count {
            let address: Address = solo
                .method::<_, Address>("getMarketTokenAddress", U256::from(market_id))?
                .call()
                .await?;
            if is_retired_market(address) {
                continue;
            }

            let symbol = match erc20.symbol(address).await {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("⚠️ market {} ({:?}) symbol 조회 실패: {}", market_id, address, e);
                    None
                }
            };
            self.constants.insert_market(market_id, address, symbol);
        }

        save_obj(&self.data_dir, &self.file_name, &self.constants).await?;
        info!("💾 dYdX 마켓 저장 완료: {}개", self.constants.market_ids.len());
        Ok(&self.constants)
    }
}
