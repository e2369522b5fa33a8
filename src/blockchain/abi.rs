use anyhow::{anyhow, Result};
use ethers::{
    abi::{parse_abi, Abi, Detokenize, Token},
    contract::ContractCall,
    providers::Middleware,
    types::{Address, Bytes, TransactionReceipt, U256, U64},
};
use serde_json::Value;
use tracing::debug;

use crate::types::HarnessError;

/// 사람이 읽을 수 있는 ABI 조각 파싱
pub fn human_abi(signatures: &[&str]) -> Result<Abi> {
    parse_abi(signatures).map_err(|e| anyhow!("ABI 파싱 실패: {}", e))
}

/// JSON ABI 파싱. `Abi`와 필드 이름 조회용 원본 JSON을 같이 돌려준다
pub fn json_abi(raw: &str) -> Result<(Abi, Value)> {
    let value: Value = serde_json::from_str(raw)?;
    let abi: Abi = serde_json::from_value(value.clone())?;
    Ok((abi, value))
}

/// 함수 호출 calldata 인코딩 (튜플 인자도 그대로 유지)
pub fn encode_call(abi: &Abi, function: &str, args: &[Token]) -> Result<Bytes> {
    let function = abi
        .function(function)
        .map_err(|e| anyhow!("함수 없음 {}: {}", function, e))?;
    let data = function.encode_input(args)?;
    Ok(Bytes::from(data))
}

/// 트랜잭션 전송 후 영수증 대기. status 0이면 실패 처리
pub async fn send_call<M, D>(call: ContractCall<M, D>, label: &str) -> Result<TransactionReceipt>
where
    M: Middleware + 'static,
    D: Detokenize,
{
    let pending = call
        .send()
        .await
        .map_err(|e| anyhow!("{} 전송 실패: {}", label, e))?;
    let tx_hash = *pending;
    let receipt = pending
        .await?
        .ok_or_else(|| HarnessError::Reverted(format!("{} ({:?}): receipt 없음", label, tx_hash)))?;

    if receipt.status == Some(U64::zero()) {
        return Err(HarnessError::Reverted(format!("{} ({:?})", label, tx_hash)).into());
    }

    debug!("📨 {} 완료: {:?} (block {:?})", label, tx_hash, receipt.block_number);
    Ok(receipt)
}

/// 출력 파라미터 중 `field` 이름을 가진 항목의 인덱스 경로 (깊이 우선)
///
/// `ethers::abi::Param`은 튜플 컴포넌트 이름을 버리므로 원본 JSON ABI에서 찾는다.
pub fn output_field_path(raw_abi: &Value, function: &str, field: &str) -> Option<Vec<usize>> {
    let entry = raw_abi.as_array()?.iter().find(|item| {
        item.get("type").and_then(Value::as_str) == Some("function")
            && item.get("name").and_then(Value::as_str) == Some(function)
    })?;
    let outputs = entry.get("outputs")?.as_array()?;
    find_component(outputs, field)
}

fn find_component(params: &[Value], field: &str) -> Option<Vec<usize>> {
    for (index, param) in params.iter().enumerate() {
        if param.get("name").and_then(Value::as_str) == Some(field) {
            return Some(vec![index]);
        }
        if let Some(components) = param.get("components").and_then(Value::as_array) {
            if let Some(mut rest) = find_component(components, field) {
                rest.insert(0, index);
                return Some(rest);
            }
        }
    }
    None
}

/// `Detokenize for Token` 결과를 출력 파라미터 목록으로 펼친다
pub fn outputs_of(token: Token, output_count: usize) -> Vec<Token> {
    match token {
        Token::Tuple(tokens) if output_count != 1 => tokens,
        other => vec![other],
    }
}

/// 인덱스 경로를 따라 토큰 조회
pub fn token_at<'a>(outputs: &'a [Token], path: &[usize]) -> Option<&'a Token> {
    let (first, rest) = path.split_first()?;
    let mut current = outputs.get(*first)?;
    for index in rest {
        current = match current {
            Token::Tuple(items) | Token::FixedArray(items) | Token::Array(items) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn tuple_items(token: &Token, what: &str) -> Result<Vec<Token>> {
    match token {
        Token::Tuple(items) => Ok(items.clone()),
        other => Err(HarnessError::Decode(format!("{}: tuple 기대, {:?}", what, other)).into()),
    }
}

pub fn token_uint(token: &Token, what: &str) -> Result<U256> {
    match token {
        Token::Uint(value) => Ok(*value),
        other => Err(HarnessError::Decode(format!("{}: uint 기대, {:?}", what, other)).into()),
    }
}

pub fn token_address(token: &Token, what: &str) -> Result<Address> {
    match token {
        Token::Address(value) => Ok(*value),
        other => Err(HarnessError::Decode(format!("{}: address 기대, {:?}", what, other)).into()),
    }
}

pub fn token_bytes(token: &Token, what: &str) -> Result<Bytes> {
    match token {
        Token::Bytes(value) => Ok(Bytes::from(value.clone())),
        other => Err(HarnessError::Decode(format!("{}: bytes 기대, {:?}", what, other)).into()),
    }
}

/// 튜플의 `index`번째 uint
pub fn uint_field(items: &[Token], index: usize, what: &str) -> Result<U256> {
    let token = items
        .get(index)
        .ok_or_else(|| HarnessError::Decode(format!("{}: {}번째 항목 없음", what, index)))?;
    token_uint(token, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"[
        {"type":"function","name":"getCompProfile","stateMutability":"view",
         "inputs":[{"name":"acc","type":"address","internalType":"address"}],
         "outputs":[{"name":"","type":"tuple","internalType":"struct CompProfile",
            "components":[
                {"name":"balance","type":"uint256","internalType":"uint256"},
                {"name":"yetToClaimed","type":"uint256","internalType":"uint256"}
            ]}]},
        {"type":"function","name":"pair","stateMutability":"view",
         "inputs":[],
         "outputs":[{"name":"a","type":"uint256","internalType":"uint256"},
                    {"name":"b","type":"uint256","internalType":"uint256"}]}
    ]"#;

    #[test]
    fn test_encode_call_selector() {
        let abi = human_abi(&["function approve(address spender, uint256 amount)"]).unwrap();
        let data = encode_call(&abi, "approve", &[Token::Address(Address::zero()), Token::Uint(U256::from(1))]).unwrap();

        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(data.len(), 4 + 32 * 2);
        assert!(encode_call(&abi, "transfer", &[]).is_err());
    }

    #[test]
    fn test_output_field_path() {
        let (_, raw) = json_abi(RAW).unwrap();

        assert_eq!(output_field_path(&raw, "getCompProfile", "yetToClaimed"), Some(vec![0, 1]));
        assert_eq!(output_field_path(&raw, "pair", "b"), Some(vec![1]));
        assert_eq!(output_field_path(&raw, "getCompProfile", "missing"), None);
        assert_eq!(output_field_path(&raw, "nope", "b"), None);
    }

    #[test]
    fn test_token_at_single_tuple_output() {
        // 출력이 튜플 하나면 Detokenize가 그 튜플 자체를 돌려준다
        let decoded = Token::Tuple(vec![Token::Uint(U256::from(7)), Token::Uint(U256::from(42))]);
        let outputs = outputs_of(decoded, 1);

        let token = token_at(&outputs, &[0, 1]).unwrap();
        assert_eq!(token_uint(token, "yetToClaimed").unwrap(), U256::from(42));
        assert!(token_at(&outputs, &[0, 5]).is_none());
    }

    #[test]
    fn test_token_at_multiple_outputs() {
        let decoded = Token::Tuple(vec![Token::Uint(U256::from(1)), Token::Uint(U256::from(2))]);
        let outputs = outputs_of(decoded, 2);

        assert_eq!(outputs.len(), 2);
        assert_eq!(token_uint(token_at(&outputs, &[1]).unwrap(), "b").unwrap(), U256::from(2));
    }

    #[test]
    fn test_token_type_mismatch() {
        let err = token_uint(&Token::Bool(true), "flag").unwrap_err();
        assert!(matches!(err.downcast_ref::<HarnessError>(), Some(HarnessError::Decode(_))));

        let err = token_address(&Token::Uint(U256::one()), "cToken").unwrap_err();
        assert!(err.to_string().contains("cToken"));
    }
}
