pub mod uniswap;

pub use uniswap::{min_amount_out, swap_deadline, UniswapV2};
