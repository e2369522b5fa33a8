//! 지수 표기 정수 파서
//!
//! 테스트 픽스처는 `1.5e18`, `-2e6` 같은 지수 표기로 금액을 적는다.
//! 결과는 항상 정수여야 하며, 소수부가 남으면 실패한다.

use std::str::FromStr;

use ethers::types::{I256, U256};
use num_bigint::BigInt;
use num_traits::Signed;

use crate::types::{HarnessError, HarnessResult};

/// 허용하는 최대 10의 거듭제곱 (1e1000 이상의 입력은 픽스처 오류로 본다)
const MAX_SHIFT: u32 = 1000;

/// 지수 표기 문자열을 정수로 변환
///
/// - `e`가 없으면 문자열 전체를 부호 있는 정수로 파싱한다.
/// - 가수에 `.`이 있으면 양쪽 모두 비어 있으면 안 되고, 소수부 길이만큼 스케일이 생긴다.
/// - 지수가 스케일보다 작으면 정수가 아니므로 [`HarnessError::IntegerOnly`].
pub fn bn_from_e_notation(input: &str) -> HarnessResult<BigInt> {
    let s = input.trim();

    if !s.contains('e') {
        return parse_integer(s, input);
    }

    let parts: Vec<&str> = s.split('e').collect();
    if parts.len() != 2 {
        return Err(bad_number(input));
    }
    let (mantissa, exponent) = (parts[0], parts[1]);

    let mantissa_parts: Vec<&str> = mantissa.split('.').collect();
    let (digits, decimals) = match mantissa_parts.as_slice() {
        [whole] => (parse_integer(whole, input)?, 0usize),
        [whole, fraction] => {
            if whole.is_empty() || fraction.is_empty() {
                return Err(bad_number(input));
            }
            let joined = format!("{}{}", whole, fraction);
            (parse_integer(&joined, input)?, fraction.len())
        }
        _ => return Err(bad_number(input)),
    };

    let exponent: i64 = exponent.parse().map_err(|_| bad_number(input))?;

    if exponent < decimals as i64 {
        return Err(HarnessError::IntegerOnly {
            input: input.to_string(),
            exponent,
            decimals,
        });
    }

    let shift = u32::try_from(exponent - decimals as i64)
        .ok()
        .filter(|shift| *shift <= MAX_SHIFT)
        .ok_or_else(|| HarnessError::NumberOutOfRange {
            value: input.to_string(),
            target: "e-notation exponent",
        })?;

    Ok(digits * BigInt::from(10u8).pow(shift))
}

/// `[+-]?[0-9]+` 만 허용 (`BigInt::from_str`는 `_` 구분자를 받아들인다)
fn parse_integer(s: &str, original: &str) -> HarnessResult<BigInt> {
    let digits = s.strip_prefix(|c| c == '+' || c == '-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_number(original));
    }
    BigInt::from_str(s).map_err(|_| bad_number(original))
}

fn bad_number(input: &str) -> HarnessError {
    HarnessError::BadNumber { input: input.to_string() }
}

/// uint256 인자로 변환 (음수 또는 256비트 초과는 에러)
pub fn to_u256(value: &BigInt) -> HarnessResult<U256> {
    if value.is_negative() {
        return Err(HarnessError::NumberOutOfRange {
            value: value.to_string(),
            target: "uint256",
        });
    }
    U256::from_dec_str(&value.to_string()).map_err(|_| HarnessError::NumberOutOfRange {
        value: value.to_string(),
        target: "uint256",
    })
}

/// int256 인자로 변환
pub fn to_i256(value: &BigInt) -> HarnessResult<I256> {
    I256::from_dec_str(&value.to_string()).map_err(|_| HarnessError::NumberOutOfRange {
        value: value.to_string(),
        target: "int256",
    })
}

/// 온체인 uint256 값을 비교용 정수로 변환
pub fn from_u256(value: U256) -> BigInt {
    // U256의 Display는 10진수
    BigInt::from_str(&value.to_string()).unwrap_or_default()
}

/// 편의 함수: 지수 표기 문자열을 곧바로 uint256으로
pub fn u256_from_e_notation(input: &str) -> HarnessResult<U256> {
    to_u256(&bn_from_e_notation(input)?)
}
