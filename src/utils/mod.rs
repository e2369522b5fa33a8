pub mod e_notation;

pub use e_notation::{bn_from_e_notation, from_u256, to_i256, to_u256, u256_from_e_notation};
