use std::collections::BTreeMap;

use ethers::types::{Address, I256, U256};
use num_bigint::BigInt;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::types::{HarnessError, HarnessResult, NamedAccount};
use crate::utils::{to_i256, to_u256};

/// 디코딩된 CSV 셀 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
    Address(Address),
    Number(BigInt),
    Bool(bool),
    Signer(NamedAccount),
    NumberList(Vec<BigInt>),
    StringList(Vec<String>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// 기대값 비교용 문자열 표현
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(value) => Some(value.clone()),
            FieldValue::Address(value) => Some(format!("{:?}", value)),
            FieldValue::Number(value) => Some(value.to_string()),
            FieldValue::Bool(value) => Some(value.to_string()),
            FieldValue::Signer(account) => Some(format!("{:?}", account.address)),
            FieldValue::NumberList(values) => {
                Some(values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(";"))
            }
            FieldValue::StringList(values) => Some(values.join(";")),
        }
    }
}

/// 숫자는 10진 문자열로 기록한다
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Text(value) => serializer.serialize_str(value),
            FieldValue::Address(value) => value.serialize(serializer),
            FieldValue::Number(value) => serializer.serialize_str(&value.to_string()),
            FieldValue::Bool(value) => serializer.serialize_bool(*value),
            FieldValue::Signer(account) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("name", &account.name)?;
                map.serialize_entry("address", &account.address)?;
                map.end()
            }
            FieldValue::NumberList(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(&value.to_string())?;
                }
                seq.end()
            }
            FieldValue::StringList(values) => values.serialize(serializer),
        }
    }
}

/// 픽스처 한 행. 키는 타입 접미사를 뗀 헤더 이름
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TestRow {
    #[serde(skip)]
    row: usize,
    fields: BTreeMap<String, FieldValue>,
}

impl TestRow {
    pub fn new(row: usize) -> Self {
        Self { row, fields: BTreeMap::new() }
    }

    /// 1부터 시작하는 행 번호
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// `_on` 플래그가 true인 행만 실행 대상
    pub fn is_on(&self) -> bool {
        matches!(self.get("_on"), Some(FieldValue::Bool(true)))
    }

    fn required(&self, key: &str) -> HarnessResult<&FieldValue> {
        match self.get(key) {
            None | Some(FieldValue::Null) => Err(self.decode_error(key, "값 없음")),
            Some(value) => Ok(value),
        }
    }

    fn decode_error(&self, key: &str, reason: &str) -> HarnessError {
        HarnessError::Decode(format!("row {} `{}`: {}", self.row, key, reason))
    }

    pub fn address(&self, key: &str) -> HarnessResult<Address> {
        match self.required(key)? {
            FieldValue::Address(value) => Ok(*value),
            FieldValue::Signer(account) => Ok(account.address),
            _ => Err(self.decode_error(key, "address 아님")),
        }
    }

    pub fn number(&self, key: &str) -> HarnessResult<BigInt> {
        match self.required(key)? {
            FieldValue::Number(value) => Ok(value.clone()),
            _ => Err(self.decode_error(key, "숫자 아님")),
        }
    }

    pub fn u256(&self, key: &str) -> HarnessResult<U256> {
        to_u256(&self.number(key)?)
    }

    pub fn i256(&self, key: &str) -> HarnessResult<I256> {
        to_i256(&self.number(key)?)
    }

    /// 빈 셀은 false
    pub fn flag(&self, key: &str) -> HarnessResult<bool> {
        match self.get(key) {
            Some(FieldValue::Bool(value)) => Ok(*value),
            Some(FieldValue::Null) => Ok(false),
            None => Err(self.decode_error(key, "값 없음")),
            Some(_) => Err(self.decode_error(key, "bool 아님")),
        }
    }

    pub fn signer(&self, key: &str) -> HarnessResult<NamedAccount> {
        match self.required(key)? {
            FieldValue::Signer(account) => Ok(account.clone()),
            _ => Err(self.decode_error(key, "signer 아님")),
        }
    }

    pub fn number_list(&self, key: &str) -> HarnessResult<Vec<BigInt>> {
        match self.required(key)? {
            FieldValue::NumberList(values) => Ok(values.clone()),
            _ => Err(self.decode_error(key, "숫자 목록 아님")),
        }
    }

    pub fn string_list(&self, key: &str) -> HarnessResult<Vec<String>> {
        match self.required(key)? {
            FieldValue::StringList(values) => Ok(values.clone()),
            _ => Err(self.decode_error(key, "문자열 목록 아님")),
        }
    }

    pub fn text(&self, key: &str) -> HarnessResult<String> {
        match self.required(key)? {
            FieldValue::Text(value) => Ok(value.clone()),
            _ => Err(self.decode_error(key, "문자열 아님")),
        }
    }

    /// `expect_<field>` 컬럼들 (null 제외)
    pub fn expectations(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|(key, value)| {
                let field = key.strip_prefix("expect_")?;
                Some((field.to_string(), value.render()?))
            })
            .collect()
    }
}
