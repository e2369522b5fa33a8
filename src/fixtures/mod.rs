//! CSV 테스트 픽스처 (헤더 접미사 타입 규칙)

pub mod loader;
pub mod row;
pub mod signers;

pub use loader::{parse_header, TestDataLoader};
pub use row::{FieldValue, TestRow};
pub use signers::SignerBook;
