use std::sync::Arc;

use anyhow::{anyhow, Result};
use ethers::{
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Eip1559TransactionRequest, Eip2930TransactionRequest,
        Transaction, TransactionRequest, H256, U64,
    },
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rpc::NodeClient;

/// 블록 재현 옵션
#[derive(Debug, Clone, Default)]
pub struct BlockReplayOptions {
    /// 이 인덱스부터 재현
    pub offset: usize,
    /// 메인넷에서 실패한 트랜잭션 건너뛰기 (타깃 제외)
    pub skip_failed: bool,
    /// 이 트랜잭션까지 재현하고 중단
    pub target_tx: Option<H256>,
    /// 건너뛸 트랜잭션 인덱스
    pub skip_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayDecision {
    Replay,
    SkipListed,
    SkipFailed,
    SkipNoCalldata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockReplayReport {
    pub block: u64,
    pub replayed: Vec<H256>,
    pub skipped: Vec<H256>,
    pub reached_target: bool,
}

/// 메인넷 트랜잭션을 로컬 포크에 재전송
pub struct Replayer<M> {
    node: NodeClient<M>,
    archive: Arc<M>,
}

impl<M: Middleware + 'static> Replayer<M> {
    pub fn new(node: NodeClient<M>, archive: Arc<M>) -> Self {
        Self { node, archive }
    }

    /// 메인넷 트랜잭션 하나를 발신자로 가장해 재전송. 로컬 트랜잭션 해시 반환
    pub async fn replicate_tx(&self, tx_hash: H256) -> Result<H256> {
        let mainnet_tx = self
            .archive
            .get_transaction(tx_hash)
            .await?
            .ok_or_else(|| anyhow!("메인넷 트랜잭션 없음: {:?}", tx_hash))?;
        self.resend(&mainnet_tx).await
    }

    async fn resend(&self, mainnet_tx: &Transaction) -> Result<H256> {
        info!("🔁 mainnet tx {:?} (index {:?})", mainnet_tx.hash, mainnet_tx.transaction_index);
        self.node.impersonate(mainnet_tx.from).await?;

        // 가스 가격은 impersonate 된 노드가 채운다.
        // automine이 꺼져 있을 수 있으므로 영수증은 기다리지 않는다
        let request = replay_request(mainnet_tx);
        let provider = self.node.provider();
        let local_hash: H256 = provider
            .provider()
            .request("eth_sendTransaction", [request])
            .await
            .map_err(|e| anyhow!("재전송 실패 {:?}: {}", mainnet_tx.hash, e))?;
        info!("✅ replayed tx {:?}", local_hash);
        Ok(local_hash)
    }

    /// 블록의 트랜잭션을 순서대로 재현하고 한 블록에 담아 채굴
    pub async fn replicate_block(&self, block_number: u64, options: &BlockReplayOptions) -> Result<BlockReplayReport> {
        let block = self
            .archive
            .get_block_with_txs(block_number)
            .await?
            .ok_or_else(|| anyhow!("메인넷 블록 없음: {}", block_number))?;
        info!("📦 block {} : 트랜잭션 {}개", block_number, block.transactions.len());

        if let Some(target) = options.target_tx {
            match block.transactions.iter().find(|tx| tx.hash == target) {
                Some(tx) => info!("🎯 target tx index {:?}", tx.transaction_index),
                None => warn!("⚠️ target tx {:?}가 block {}에 없음", target, block_number),
            }
        }

        self.node.set_automine(false).await?;

        let mut report = BlockReplayReport { block: block_number, ..Default::default() };
        let result = self.replay_transactions(&block.transactions, options, &mut report).await;

        // 실패해도 쌓인 트랜잭션은 채굴하고 automine을 복구한다
        let mined = self.node.mine_blocks(1).await;
        let restored = self.node.set_automine(true).await;
        result?;
        mined?;
        restored?;

        info!(
            "⛏️ block {} 재현 완료: replayed {}, skipped {}",
            block_number,
            report.replayed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn replay_transactions(
        &self,
        transactions: &[Transaction],
        options: &BlockReplayOptions,
        report: &mut BlockReplayReport,
    ) -> Result<()> {
        for tx in transactions.iter().skip(options.offset) {
            let status = self
                .archive
                .get_transaction_receipt(tx.hash)
                .await?
                .and_then(|receipt| receipt.status);

            let decision = replay_decision(tx, status, options);
            if decision != ReplayDecision::Replay {
                debug!("⏭️ skip {:?}: {:?}", tx.hash, decision);
                report.skipped.push(tx.hash);
                continue;
            }

            self.resend(tx).await?;
            report.replayed.push(tx.hash);

            if options.target_tx == Some(tx.hash) {
                report.reached_target = true;
                break;
            }
        }
        Ok(())
    }
}

/// 재현 여부 판단 (목록 → 실패 → calldata 순)
pub fn replay_decision(tx: &Transaction, status: Option<U64>, options: &BlockReplayOptions) -> ReplayDecision {
    let index = tx.transaction_index.map(|i| i.as_u64());
    if index.map_or(false, |i| options.skip_indices.contains(&i)) {
        return ReplayDecision::SkipListed;
    }

    let is_target = options.target_tx == Some(tx.hash);
    if options.skip_failed && status == Some(U64::zero()) && !is_target {
        return ReplayDecision::SkipFailed;
    }

    if tx.input.is_empty() {
        return ReplayDecision::SkipNoCalldata;
    }

    ReplayDecision::Replay
}

/// 메인넷 트랜잭션을 같은 타입의 요청으로 변환
///
/// 가스 가격과 chain id는 로컬 노드가 채운다.
pub fn replay_request(tx: &Transaction) -> TypedTransaction {
    match tx.transaction_type.map(|t| t.as_u64()) {
        Some(2) => {
            let mut request = Eip1559TransactionRequest::new()
                .from(tx.from)
                .data(tx.input.clone())
                .value(tx.value)
                .nonce(tx.nonce)
                .gas(tx.gas)
                .access_list(tx.access_list.clone().unwrap_or_default());
            if let Some(to) = tx.to {
                request = request.to(to);
            }
            request.into()
        }
        Some(1) => {
            let mut inner = TransactionRequest::new()
                .from(tx.from)
                .data(tx.input.clone())
                .value(tx.value)
                .nonce(tx.nonce)
                .gas(tx.gas);
            if let Some(to) = tx.to {
                inner = inner.to(to);
            }
            Eip2930TransactionRequest::new(inner, tx.access_list.clone().unwrap_or_default()).into()
        }
        _ => {
            let mut request = TransactionRequest::new()
                .from(tx.from)
                .data(tx.input.clone())
                .value(tx.value)
                .nonce(tx.nonce)
                .gas(tx.gas);
            if let Some(to) = tx.to {
                request = request.to(to);
            }
            request.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SnapshotStore;
    use ethers::providers::{MockProvider, Provider};
    use ethers::types::{Address, Block, BlockNumber, Bytes, TransactionReceipt, U256};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn mainnet_tx(index: u64, input: &[u8], tx_type: Option<u64>) -> Transaction {
        Transaction {
            hash: H256::from_low_u64_be(index + 1),
            transaction_index: Some(U64::from(index)),
            from: Address::from([0xaa; 20]),
            to: Some(Address::from([0xbb; 20])),
            input: Bytes::from(input.to_vec()),
            nonce: U256::from(7),
            gas: U256::from(210_000),
            value: U256::from(5),
            transaction_type: tx_type.map(U64::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_replay_decision_order() {
        let tx = mainnet_tx(3, &[0x01], None);
        let mut options = BlockReplayOptions { skip_failed: true, ..Default::default() };

        assert_eq!(replay_decision(&tx, Some(U64::one()), &options), ReplayDecision::Replay);
        assert_eq!(replay_decision(&tx, Some(U64::zero()), &options), ReplayDecision::SkipFailed);

        options.skip_indices = vec![3];
        assert_eq!(replay_decision(&tx, Some(U64::one()), &options), ReplayDecision::SkipListed);
    }

    #[test]
    fn test_failed_target_is_replayed() {
        let tx = mainnet_tx(0, &[0x01], None);
        let options = BlockReplayOptions { skip_failed: true, target_tx: Some(tx.hash), ..Default::default() };

        assert_eq!(replay_decision(&tx, Some(U64::zero()), &options), ReplayDecision::Replay);
    }

    #[test]
    fn test_plain_transfer_skipped() {
        let tx = mainnet_tx(0, &[], None);
        assert_eq!(
            replay_decision(&tx, Some(U64::one()), &BlockReplayOptions::default()),
            ReplayDecision::SkipNoCalldata
        );
    }

    #[test]
    fn test_replay_request_keeps_type() {
        let tx = mainnet_tx(0, &[0x12, 0x34], Some(2));
        let request = replay_request(&tx);

        assert!(matches!(request, TypedTransaction::Eip1559(_)));
        assert_eq!(request.from(), Some(&tx.from));
        assert_eq!(request.nonce(), Some(&U256::from(7)));
        assert_eq!(request.gas(), Some(&U256::from(210_000)));
        assert_eq!(request.data().map(|d| d.to_vec()), Some(vec![0x12, 0x34]));
        assert_eq!(request.chain_id(), None);

        assert!(matches!(replay_request(&mainnet_tx(0, &[1], Some(1))), TypedTransaction::Eip2930(_)));
        assert!(matches!(replay_request(&mainnet_tx(0, &[1], None)), TypedTransaction::Legacy(_)));
    }

    fn replayer(dir: &std::path::Path) -> (Replayer<Provider<MockProvider>>, MockProvider, MockProvider) {
        let (local, local_mock) = Provider::mocked();
        let (archive, archive_mock) = Provider::mocked();
        let node = NodeClient::new(Arc::new(local), SnapshotStore::new(dir, "snapshotIds"));
        (Replayer::new(node, Arc::new(archive)), local_mock, archive_mock)
    }

    fn block_with(transactions: Vec<Transaction>) -> Block<Transaction> {
        Block { number: Some(U64::from(100)), transactions, ..Default::default() }
    }

    #[tokio::test]
    async fn test_replicate_tx_impersonates_then_resends() {
        let dir = tempdir().unwrap();
        let (replayer, local, archive) = replayer(dir.path());
        let tx = mainnet_tx(4, &[0xab], None);
        let local_hash = H256::from_low_u64_be(0xbeef);

        archive.push::<Transaction, _>(tx.clone()).unwrap();
        local.push::<H256, _>(local_hash).unwrap();
        local.push(true).unwrap();

        assert_eq!(replayer.replicate_tx(tx.hash).await.unwrap(), local_hash);

        archive.assert_request("eth_getTransactionByHash", [tx.hash]).unwrap();
        local.assert_request("hardhat_impersonateAccount", [tx.from]).unwrap();
        local.assert_request("eth_sendTransaction", [replay_request(&tx)]).unwrap();
    }

    #[tokio::test]
    async fn test_replicate_block_sequence() {
        let dir = tempdir().unwrap();
        let (replayer, local, archive) = replayer(dir.path());

        // 0: offset 이전, 1: 메인넷 실패, 2: 재현, 3: 타깃, 4: 타깃 이후
        let txs: Vec<Transaction> = (0..5).map(|i| mainnet_tx(i, &[0x01], None)).collect();
        let options = BlockReplayOptions {
            offset: 1,
            skip_failed: true,
            target_tx: Some(txs[3].hash),
            skip_indices: vec![],
        };

        let failed = TransactionReceipt { status: Some(U64::zero()), ..Default::default() };
        archive.push::<Value, _>(Value::Null).unwrap();
        archive.push::<Value, _>(Value::Null).unwrap();
        archive.push::<TransactionReceipt, _>(failed).unwrap();
        archive.push::<Block<Transaction>, _>(block_with(txs.clone())).unwrap();

        local.push(true).unwrap(); // evm_setAutomine(true)
        local.push::<String, _>("0x0".to_string()).unwrap(); // evm_mine
        local.push::<H256, _>(H256::from_low_u64_be(0x22)).unwrap();
        local.push(true).unwrap();
        local.push::<H256, _>(H256::from_low_u64_be(0x11)).unwrap();
        local.push(true).unwrap();
        local.push(true).unwrap(); // evm_setAutomine(false)

        let report = replayer.replicate_block(100, &options).await.unwrap();

        assert_eq!(report.block, 100);
        assert_eq!(report.replayed, vec![txs[2].hash, txs[3].hash]);
        assert_eq!(report.skipped, vec![txs[1].hash]);
        assert!(report.reached_target);

        archive
            .assert_request("eth_getBlockByNumber", [json!(BlockNumber::Number(U64::from(100))), json!(true)])
            .unwrap();
        for tx in &txs[1..4] {
            archive.assert_request("eth_getTransactionReceipt", [tx.hash]).unwrap();
        }
        assert!(archive.assert_request("eth_getTransactionReceipt", [txs[4].hash]).is_err());

        local.assert_request("evm_setAutomine", [false]).unwrap();
        for tx in &txs[2..4] {
            local.assert_request("hardhat_impersonateAccount", [tx.from]).unwrap();
            local.assert_request("eth_sendTransaction", [replay_request(tx)]).unwrap();
        }
        local.assert_request("evm_mine", ()).unwrap();
        local.assert_request("evm_setAutomine", [true]).unwrap();
        assert!(local.assert_request("evm_mine", ()).is_err());
    }

    #[tokio::test]
    async fn test_failed_resend_still_mines_and_restores_automine() {
        let dir = tempdir().unwrap();
        let (replayer, local, archive) = replayer(dir.path());
        let tx = mainnet_tx(0, &[0x01], None);

        archive.push::<Value, _>(Value::Null).unwrap();
        archive.push::<Block<Transaction>, _>(block_with(vec![tx.clone()])).unwrap();

        // eth_sendTransaction 이후로는 응답이 없다
        local.push(true).unwrap();
        local.push(true).unwrap();

        let err = replayer.replicate_block(100, &BlockReplayOptions::default()).await.unwrap_err();

        assert!(err.to_string().contains("재전송 실패"), "{}", err);
        local.assert_request("evm_setAutomine", [false]).unwrap();
        local.assert_request("hardhat_impersonateAccount", [tx.from]).unwrap();
        local.assert_request("eth_sendTransaction", [replay_request(&tx)]).unwrap();
        local.assert_request("evm_mine", ()).unwrap();
        local.assert_request("evm_setAutomine", [true]).unwrap();
    }
}
