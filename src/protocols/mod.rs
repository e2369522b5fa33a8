//! 프로토콜별 컨트랙트 래퍼 (ERC-20, Compound, dYdX, 사용자 프록시, CompFarmingMath)

pub mod comp_farming_math;
pub mod compound;
pub mod dydx;
pub mod erc20;
pub mod user_proxy;

pub use comp_farming_math::{AssetProfile, CompFarmingMath, CompProfile, FarmingContext};
pub use compound::{CompConstants, CompSpeeds, Compound, MarketTotals};
pub use dydx::{Dydx, DydxConstants, DydxMarket};
pub use erc20::Erc20;
pub use user_proxy::{FlashLoanParams, PreviewAccountProfile, PreviewRequest, UserProxy};
