use ethers::types::Address;
use std::str::FromStr;

// Mainnet addresses (fork)
pub const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
pub const DAI: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";
pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

pub const UNISWAP_V2_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
pub const COMPOUND_COMPTROLLER: &str = "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b";
pub const DYDX_SOLO_MARGIN: &str = "0x1E0447b19BB6EcFdAe1e4AE1694b0C3659614e4e";

/// dYdX에서 은퇴한 SAI 마켓 (심볼 조회가 실패하므로 건너뜀)
pub const DYDX_RETIRED_SAI: &str = "0x89d24A6b4CcB1B6fAA2625fE562bDD9a23260359";

/// hardhat 기본 계정 #0
pub const HARDHAT_ACCOUNT_0: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

// Deployed contract names
pub const COMP_FARMING_MATH: &str = "CompFarmingMath";
pub const COMP_FARMING_CONTRACT: &str = "CompFarmingContract";
pub const USER_PROXY_FACTORY: &str = "UserProxyFactory";
pub const USER_PROXY: &str = "UserProxy";

// Fixture keys
pub const SETUP_EOA_FARMING: &str = "setup.eoaFarming";
pub const PREVIEW_AND_FLASHLOAN: &str = "success.previewAndFlashloan";
pub const GET_COMP_PROFILE: &str = "success.getCompProfile";

/// Uniswap 스왑 최소 수령 비율 (95%)
pub const SLIPPAGE_FLOOR_BPS: u64 = 9_500;

/// 플래시론 전 approve 여유분 (wei)
pub const FLASHLOAN_APPROVE_BUFFER: u64 = 2;

pub fn address(value: &str) -> Option<Address> {
    Address::from_str(value).ok()
}
