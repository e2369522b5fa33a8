use std::sync::Arc;

use anyhow::Result;
use ethers::{
    abi::{Abi, Token},
    contract::Contract,
    providers::Middleware,
    types::{Address, Bytes, TransactionReceipt, I256, U256},
};
use serde::Serialize;
use tracing::{debug, info};

use super::erc20::Erc20;
use crate::blockchain::abi::{
    encode_call, human_abi, json_abi, send_call, token_bytes, tuple_items, uint_field,
};

const USER_PROXY_ABI: &str = include_str!("../../abi/user_proxy.json");
const COMP_FARMING_CONTRACT_ABI: &str = include_str!("../../abi/comp_farming_contract.json");

/// 프록시가 `write(bytes[])`로 실행할 구현 컨트랙트 함수들
fn action_abi() -> Result<Abi> {
    human_abi(&[
        "function deposit(address underlying, uint256 amount)",
        "function mint(address comptroller, address underlying, uint256 amount, address cToken)",
        "function redeem(uint256 amount, address cToken)",
        "function withdraw(address underlying, uint256 amount)",
        "function borrow(uint256 amount, address cToken)",
        "function repayBorrow(address underlying, uint256 amount, address cToken)",
    ])
}

/// dYdX 플래시론 파라미터
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashLoanParams {
    pub market_id: U256,
    pub loan_amount: U256,
    pub loan_fees: U256,
    pub action_data: Bytes,
}

impl FlashLoanParams {
    pub fn from_token(token: &Token) -> Result<Self> {
        let items = tuple_items(token, "FlashLoanParams")?;
        let action_data = items
            .get(3)
            .map(|t| token_bytes(t, "FlashLoanParams.actionData"))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            market_id: uint_field(&items, 0, "FlashLoanParams.marketId")?,
            loan_amount: uint_field(&items, 1, "FlashLoanParams.loanAmount")?,
            loan_fees: uint_field(&items, 2, "FlashLoanParams.loanFees")?,
            action_data,
        })
    }

    pub fn into_token(self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.market_id),
            Token::Uint(self.loan_amount),
            Token::Uint(self.loan_fees),
            Token::Bytes(self.action_data.to_vec()),
        ])
    }
}

/// `previewAccountProfile` 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewAccountProfile {
    pub flash_loan_params: FlashLoanParams,
}

impl PreviewAccountProfile {
    pub fn from_token(token: &Token) -> Result<Self> {
        let items = tuple_items(token, "PreviewAccountProfileReturn")?;
        let params = items
            .first()
            .ok_or_else(|| anyhow::anyhow!("PreviewAccountProfileReturn: flashLoanParams 없음"))?;
        Ok(Self { flash_loan_params: FlashLoanParams::from_token(params)? })
    }
}

/// `previewAccountProfile` 인자
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub comp_farming_math: Address,
    pub underlying: Address,
    pub delta_principal: I256,
    pub ctoken: Address,
    pub delta_borrow_limit_pct: I256,
    pub close: bool,
}

/// 사용자 프록시 (UserProxy) + 구현 컨트랙트 (CompFarmingContract) 래퍼
///
/// 같은 주소를 두 ABI로 바라본다: 프록시의 `write(bytes[])`로 구현 함수를
/// delegatecall 하고, 조회/하베스트는 구현 ABI로 직접 호출한다.
pub struct UserProxy<M> {
    client: Arc<M>,
    proxy: Contract<M>,
    implementation: Contract<M>,
    implementation_abi: Abi,
    owner: Address,
}

impl<M: Middleware + 'static> UserProxy<M> {
    pub fn new(address: Address, owner: Address, client: Arc<M>) -> Result<Self> {
        let (proxy_abi, _) = json_abi(USER_PROXY_ABI)?;
        let (implementation_abi, _) = json_abi(COMP_FARMING_CONTRACT_ABI)?;

        Ok(Self {
            proxy: Contract::new(address, proxy_abi, Arc::clone(&client)),
            implementation: Contract::new(address, implementation_abi.clone(), Arc::clone(&client)),
            implementation_abi,
            client,
            owner,
        })
    }

    pub fn address(&self) -> Address {
        self.proxy.address()
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// 프록시 배치 실행
    pub async fn write(&self, calls: Vec<Bytes>, label: &str) -> Result<TransactionReceipt> {
        debug!("📦 proxy.write {} ({} calls)", label, calls.len());
        let call = self
            .proxy
            .method::<_, Vec<Bytes>>("write", calls)?
            .from(self.owner);
        send_call(call, label).await
    }

    /// underlying approve → deposit + mint
    pub async fn deposit_and_mint(
        &self,
        comptroller: Address,
        underlying: Address,
        ctoken: Address,
        amount: U256,
        spender: Address,
    ) -> Result<TransactionReceipt> {
        let approve = Erc20::new(Arc::clone(&self.client))
            .approve(underlying, self.owner, spender, amount)
            .await?;
        info!("✅ approved! {:?}", approve.transaction_hash);

        let calls = deposit_and_mint_calls(comptroller, underlying, ctoken, amount)?;
        self.write(calls, "proxy.depositAndMint").await
    }

    pub async fn redeem_and_withdraw(&self, underlying: Address, ctoken: Address, amount: U256) -> Result<TransactionReceipt> {
        let calls = redeem_and_withdraw_calls(underlying, ctoken, amount)?;
        self.write(calls, "proxy.redeemAndWithdraw").await
    }

    pub async fn borrow_and_repay_borrow(&self, underlying: Address, ctoken: Address, amount: U256) -> Result<TransactionReceipt> {
        let calls = borrow_and_repay_borrow_calls(underlying, ctoken, amount)?;
        self.write(calls, "proxy.borrowAndRepayBorrow").await
    }

    pub async fn preview_account_profile(&self, request: &PreviewRequest) -> Result<PreviewAccountProfile> {
        let token: Token = self
            .implementation
            .method::<_, Token>(
                "previewAccountProfile",
                (
                    request.comp_farming_math,
                    request.underlying,
                    request.delta_principal,
                    request.ctoken,
                    request.delta_borrow_limit_pct,
                    request.close,
                ),
            )?
            .from(self.owner)
            .call()
            .await?;
        PreviewAccountProfile::from_token(&token)
    }

    /// 플래시론 실행 (`flashLoan(tuple)`을 프록시로 전달)
    pub async fn flash_loan(&self, params: &FlashLoanParams) -> Result<TransactionReceipt> {
        let data = encode_call(&self.implementation_abi, "flashLoan", &[params.clone().into_token()])?;
        let receipt = self.write(vec![data], "proxy.flashLoan").await?;
        info!("⚡ flashLoan tx {:?} (block {:?})", receipt.transaction_hash, receipt.block_number);
        Ok(receipt)
    }

    pub async fn harvest(&self) -> Result<TransactionReceipt> {
        let call = self.implementation.method::<_, ()>("harvest", ())?.from(self.owner);
        send_call(call, "harvest").await
    }
}

pub fn deposit_and_mint_calls(comptroller: Address, underlying: Address, ctoken: Address, amount: U256) -> Result<Vec<Bytes>> {
    let abi = action_abi()?;
    Ok(vec![
        encode_call(&abi, "deposit", &[Token::Address(underlying), Token::Uint(amount)])?,
        encode_call(
            &abi,
            "mint",
            &[
                Token::Address(comptroller),
                Token::Address(underlying),
                Token::Uint(amount),
                Token::Address(ctoken),
            ],
        )?,
    ])
}

pub fn redeem_and_withdraw_calls(underlying: Address, ctoken: Address, amount: U256) -> Result<Vec<Bytes>> {
    let abi = action_abi()?;
    Ok(vec![
        encode_call(&abi, "redeem", &[Token::Uint(amount), Token::Address(ctoken)])?,
        encode_call(&abi, "withdraw", &[Token::Address(underlying), Token::Uint(amount)])?,
    ])
}

pub fn borrow_and_repay_borrow_calls(underlying: Address, ctoken: Address, amount: U256) -> Result<Vec<Bytes>> {
    let abi = action_abi()?;
    Ok(vec![
        encode_call(&abi, "borrow", &[Token::Uint(amount), Token::Address(ctoken)])?,
        encode_call(
            &abi,
            "repayBorrow",
            &[Token::Address(underlying), Token::Uint(amount), Token::Address(ctoken)],
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{MockProvider, Provider};

    fn params() -> FlashLoanParams {
        FlashLoanParams {
            market_id: U256::from(3),
            loan_amount: U256::exp10(21),
            loan_fees: U256::from(2),
            action_data: Bytes::from(vec![0xde, 0xad]),
        }
    }

    #[test]
    fn test_flash_loan_params_token() {
        let token = params().into_token();
        assert_eq!(FlashLoanParams::from_token(&token).unwrap(), params());

        let err = FlashLoanParams::from_token(&Token::Uint(U256::one())).unwrap_err();
        assert!(err.to_string().contains("FlashLoanParams"));
    }

    #[test]
    fn test_flash_loan_calldata_keeps_tuple() {
        let (abi, _) = json_abi(COMP_FARMING_CONTRACT_ABI).unwrap();
        let data = encode_call(&abi, "flashLoan", &[params().into_token()]).unwrap();

        let function = abi.function("flashLoan").unwrap();
        assert_eq!(&data[..4], &function.short_signature());
        let decoded = function.decode_input(&data[4..]).unwrap();
        assert_eq!(decoded, vec![params().into_token()]);
    }

    #[test]
    fn test_deposit_and_mint_calls() {
        let comptroller = Address::from([1; 20]);
        let underlying = Address::from([2; 20]);
        let ctoken = Address::from([3; 20]);
        let calls = deposit_and_mint_calls(comptroller, underlying, ctoken, U256::from(500)).unwrap();

        assert_eq!(calls.len(), 2);
        let abi = action_abi().unwrap();
        assert_eq!(&calls[0][..4], &abi.function("deposit").unwrap().short_signature());
        let mint = abi.function("mint").unwrap();
        assert_eq!(&calls[1][..4], &mint.short_signature());
        assert_eq!(
            mint.decode_input(&calls[1][4..]).unwrap(),
            vec![
                Token::Address(comptroller),
                Token::Address(underlying),
                Token::Uint(U256::from(500)),
                Token::Address(ctoken),
            ]
        );
    }

    /// 배치 calldata를 (함수 이름, 디코딩된 인자)로 풀어낸다
    fn decode_batch(calls: &[Bytes]) -> Vec<(String, Vec<Token>)> {
        let abi = action_abi().unwrap();
        calls
            .iter()
            .map(|call| {
                let function = abi
                    .functions()
                    .find(|f| f.short_signature() == call[..4])
                    .unwrap();
                (function.name.clone(), function.decode_input(&call[4..]).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_redeem_and_withdraw_calls() {
        let underlying = Address::from([2; 20]);
        let ctoken = Address::from([3; 20]);
        let calls = redeem_and_withdraw_calls(underlying, ctoken, U256::from(77)).unwrap();

        assert_eq!(
            decode_batch(&calls),
            vec![
                ("redeem".to_string(), vec![Token::Uint(U256::from(77)), Token::Address(ctoken)]),
                ("withdraw".to_string(), vec![Token::Address(underlying), Token::Uint(U256::from(77))]),
            ]
        );
    }

    #[test]
    fn test_borrow_and_repay_borrow_calls() {
        let underlying = Address::from([2; 20]);
        let ctoken = Address::from([3; 20]);
        let calls = borrow_and_repay_borrow_calls(underlying, ctoken, U256::exp10(18)).unwrap();

        assert_eq!(
            decode_batch(&calls),
            vec![
                ("borrow".to_string(), vec![Token::Uint(U256::exp10(18)), Token::Address(ctoken)]),
                (
                    "repayBorrow".to_string(),
                    vec![Token::Address(underlying), Token::Uint(U256::exp10(18)), Token::Address(ctoken)]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_preview_account_profile_decodes_return() {
        let (provider, mock) = Provider::mocked();
        let proxy: UserProxy<Provider<MockProvider>> =
            UserProxy::new(Address::from([7; 20]), Address::from([8; 20]), Arc::new(provider)).unwrap();

        let ret = Token::Tuple(vec![params().into_token()]);
        let encoded = ethers::abi::encode(&[ret]);
        mock.push::<Bytes, _>(Bytes::from(encoded)).unwrap();

        let preview = proxy
            .preview_account_profile(&PreviewRequest {
                comp_farming_math: Address::from([9; 20]),
                underlying: Address::from([2; 20]),
                delta_principal: I256::from(100),
                ctoken: Address::from([3; 20]),
                delta_borrow_limit_pct: I256::from(-5),
                close: false,
            })
            .await
            .unwrap();

        assert_eq!(preview.flash_loan_params, params());
    }
}
