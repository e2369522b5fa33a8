use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::row::{FieldValue, TestRow};
use super::signers::SignerBook;
use crate::protocols::CompConstants;
use crate::storage::save_obj;
use crate::types::{HarnessError, HarnessResult};
use crate::utils::bn_from_e_notation;

/// `name.suffix` 헤더 분해. 빈 헤더(끝의 쉼표)는 `None`
pub fn parse_header(header: &str) -> HarnessResult<Option<(String, String)>> {
    let header = header.trim();
    if header.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = header.split('.').collect();
    match parts.as_slice() {
        [key, suffix] if !key.is_empty() && !suffix.is_empty() => {
            Ok(Some((key.to_string(), suffix.to_string())))
        }
        _ => Err(HarnessError::CsvHeader { header: header.to_string() }),
    }
}

/// `*v1;v2*` 형태의 목록 셀 분해
fn split_list(raw: &str) -> Vec<String> {
    let inner = raw.trim();
    let inner = inner.strip_prefix('*').unwrap_or(inner);
    let inner = inner.strip_suffix('*').unwrap_or(inner);
    inner
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// CSV 픽스처 로더
///
/// `<csv_dir>/<key>.csv`를 읽어 헤더 접미사대로 셀을 해석하고,
/// 결과를 `<json_mirror_dir>/<key>.json`에 한 번 기록한 뒤 돌려준다.
pub struct TestDataLoader {
    csv_dir: PathBuf,
    json_mirror_dir: PathBuf,
    constants: CompConstants,
    signers: SignerBook,
}

impl TestDataLoader {
    pub fn new(
        csv_dir: impl Into<PathBuf>,
        json_mirror_dir: impl Into<PathBuf>,
        constants: CompConstants,
        signers: SignerBook,
    ) -> Self {
        Self {
            csv_dir: csv_dir.into(),
            json_mirror_dir: json_mirror_dir.into(),
            constants,
            signers,
        }
    }

    pub fn csv_path(&self, key: &str) -> PathBuf {
        self.csv_dir.join(format!("{}.csv", key))
    }

    pub fn json_mirror_dir(&self) -> &Path {
        &self.json_mirror_dir
    }

    pub async fn get_test_data(&self, key: &str) -> Result<Vec<TestRow>> {
        let path = self.csv_path(key);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("CSV 읽기 실패: {}", path.display()))?;

        let rows = self.parse(key, &content)?;
        save_obj(&self.json_mirror_dir, key, &rows).await?;
        info!("📄 픽스처 {}: {}행", key, rows.len());
        Ok(rows)
    }

    /// CSV 본문 해석 (파일 입출력 없음)
    pub fn parse(&self, key: &str, content: &str) -> Result<Vec<TestRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns = reader
            .headers()
            .with_context(|| format!("CSV 헤더 읽기 실패: {}", key))?
            .iter()
            .map(parse_header)
            .collect::<HarnessResult<Vec<_>>>()?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("{} {}행 읽기 실패", key, index + 1))?;
            let mut row = TestRow::new(index + 1);

            for (column, cell) in columns.iter().zip(record.iter()) {
                let Some((name, suffix)) = column else { continue };
                let value = self
                    .decode_cell(suffix, cell)
                    .with_context(|| format!("{} {}행 `{}.{}` 해석 실패", key, index + 1, name, suffix))?;
                row.insert(name.clone(), value);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(HarnessError::EmptyCsv { key: key.to_string() }.into());
        }
        debug!("🧾 {} 헤더 {}개 해석", key, columns.iter().flatten().count());
        Ok(rows)
    }

    /// 접미사별 셀 해석. 빈 셀은 항상 null
    pub fn decode_cell(&self, suffix: &str, raw: &str) -> HarnessResult<FieldValue> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(FieldValue::Null);
        }

        let decoded = match suffix {
            "a" => FieldValue::Address(self.constants.address(value)?),
            "n" => FieldValue::Number(bn_from_e_notation(value)?),
            "b" => FieldValue::Bool(value == "true"),
            "ua" => FieldValue::Address(self.signers.address(value)?),
            "sr" => FieldValue::Signer(self.signers.resolve(value)?),
            "l<n>" => FieldValue::NumberList(
                split_list(value)
                    .iter()
                    .map(|item| bn_from_e_notation(item))
                    .collect::<HarnessResult<Vec<_>>>()?,
            ),
            "l<s>" => FieldValue::StringList(split_list(value)),
            _ => FieldValue::Text(raw.to_string()),
        };
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use num_bigint::BigInt;
    use std::str::FromStr;
    use tempfile::tempdir;

    const COMP_CONSTANT: &str = r#"{
        "Comptroller": "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b",
        "cDAI": {
            "address": "0x5d3a536e4d6dbd6114cc1ead35777bab948e3643",
            "underlying": "0x6B175474E89094C44Da98b954EedeAC495271d0F"
        }
    }"#;

    const PREVIEW_CSV: &str = "\
_on.b,underlying.a,cToken.a,deltaPrincipal.n,deltaBorrowLimitPCT.n,close.b,signer.sr,user.ua,note,
true,cDAI.underlying,cDAI.address,1000e18,-0.5e2,false,deployer,vaultUser1,first,
false,cDAI.underlying,cDAI.address,-1.25e18,,,,,,
";

    fn loader(dir: &Path) -> TestDataLoader {
        let constants: CompConstants = serde_json::from_str(COMP_CONSTANT).unwrap();
        let mut signers = SignerBook::default();
        signers.insert("deployer", Address::from([1; 20]));
        signers.insert("vaultUser1", Address::from([2; 20]));
        TestDataLoader::new(dir.join("csv"), dir.join("testdatajson"), constants, signers)
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("deltaPrincipal.n").unwrap(),
            Some(("deltaPrincipal".to_string(), "n".to_string()))
        );
        assert_eq!(parse_header("amounts.l<n>").unwrap().unwrap().1, "l<n>");
        assert_eq!(parse_header("").unwrap(), None);
        assert_eq!(
            parse_header("note"),
            Err(HarnessError::CsvHeader { header: "note".to_string() })
        );
        assert!(parse_header("a.b.c").is_err());
        assert!(parse_header(".n").is_err());
    }

    #[test]
    fn test_decode_cells() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());

        assert_eq!(
            loader.decode_cell("a", "cDAI.underlying").unwrap(),
            FieldValue::Address(Address::from_str("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap())
        );
        assert_eq!(loader.decode_cell("n", "1.5e3").unwrap(), FieldValue::Number(BigInt::from(1_500)));
        assert_eq!(loader.decode_cell("b", "TRUE").unwrap(), FieldValue::Bool(false));
        assert_eq!(loader.decode_cell("ua", "vaultUser1").unwrap(), FieldValue::Address(Address::from([2; 20])));
        assert_eq!(
            loader.decode_cell("l<n>", "*1e2; 2;3e1*").unwrap(),
            FieldValue::NumberList(vec![BigInt::from(100), BigInt::from(2), BigInt::from(30)])
        );
        assert_eq!(
            loader.decode_cell("l<s>", "a ; b").unwrap(),
            FieldValue::StringList(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(loader.decode_cell("x", "raw text").unwrap(), FieldValue::Text("raw text".to_string()));
        for suffix in ["a", "n", "b", "ua", "sr", "l<n>", "l<s>", "x"] {
            assert_eq!(loader.decode_cell(suffix, "").unwrap(), FieldValue::Null);
        }
    }

    #[test]
    fn test_decode_errors() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());

        assert_eq!(
            loader.decode_cell("sr", "ghost"),
            Err(HarnessError::UnknownSigner("ghost".to_string()))
        );
        assert_eq!(
            loader.decode_cell("a", "cUSDT.address"),
            Err(HarnessError::ConstantNotFound("cUSDT.address".to_string()))
        );
        assert!(loader.decode_cell("n", "1.5e0").is_err());
    }

    #[test]
    fn test_bad_header_rejects_file() {
        let dir = tempdir().unwrap();
        let err = loader(dir.path()).parse("bad", PREVIEW_CSV).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HarnessError>(),
            Some(&HarnessError::CsvHeader { header: "note".to_string() })
        );
    }

    #[tokio::test]
    async fn test_get_test_data_writes_mirror() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        let csv = PREVIEW_CSV.replace(",note,", ",note.txt,");
        tokio::fs::create_dir_all(dir.path().join("csv")).await.unwrap();
        tokio::fs::write(loader.csv_path("success.previewAndFlashloan"), csv).await.unwrap();

        let rows = loader.get_test_data("success.previewAndFlashloan").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_on());
        assert!(!rows[1].is_on());
        assert_eq!(rows[0].number("deltaBorrowLimitPCT").unwrap(), BigInt::from(-50));
        assert_eq!(rows[0].signer("signer").unwrap().address, Address::from([1; 20]));
        assert_eq!(rows[0].text("note").unwrap(), "first");
        assert_eq!(rows[1].get("close"), Some(&FieldValue::Null));
        assert_eq!(rows[1].row(), 2);

        let mirror = tokio::fs::read_to_string(dir.path().join("testdatajson/success.previewAndFlashloan.json"))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&mirror).unwrap();
        assert_eq!(json[0]["deltaPrincipal"], "1000000000000000000000");
        assert_eq!(json[1]["deltaPrincipal"], "-1250000000000000000");
        assert!(mirror.contains("\n    {"));
    }

    #[tokio::test]
    async fn test_empty_csv() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        tokio::fs::create_dir_all(dir.path().join("csv")).await.unwrap();
        tokio::fs::write(loader.csv_path("empty"), "_on.b,amount.n\n").await.unwrap();

        let err = loader.get_test_data("empty").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<HarnessError>(),
            Some(&HarnessError::EmptyCsv { key: "empty".to_string() })
        );
        assert!(loader.get_test_data("missing").await.is_err());
    }
}
