use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ethers::{
    providers::{Http, Middleware, Provider},
    types::Address,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::{SnapshotStore, INITIAL_SNAPSHOT};
use crate::types::HarnessError;

/// 로컬 테스트 노드 (hardhat fork) 제어 클라이언트
///
/// 스냅샷 ID는 `SnapshotStore`에 이름으로 보관된다. 노드 메서드는
/// `evm_snapshot` / `evm_revert` / `evm_mine` / `evm_setAutomine` /
/// `hardhat_impersonateAccount` 만 사용한다.
pub struct NodeClient<M> {
    provider: Arc<M>,
    snapshots: SnapshotStore,
}

impl<M> Clone for NodeClient<M> {
    fn clone(&self) -> Self {
        Self { provider: Arc::clone(&self.provider), snapshots: self.snapshots.clone() }
    }
}

/// HTTP 프로바이더 생성 (영수증 폴링 간격 지정)
pub fn http_provider(rpc_url: &str, poll_interval: Duration) -> Result<Arc<Provider<Http>>> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| anyhow!("RPC URL 파싱 실패 {}: {}", rpc_url, e))?
        .interval(poll_interval);
    Ok(Arc::new(provider))
}

impl<M: Middleware + 'static> NodeClient<M> {
    pub fn new(provider: Arc<M>, snapshots: SnapshotStore) -> Self {
        Self { provider, snapshots }
    }

    pub fn provider(&self) -> Arc<M> {
        Arc::clone(&self.provider)
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// 노드 unlocked 계정 목록
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.provider.get_accounts().await?)
    }

    /// `eth_accounts`가 응답할 때까지 고정 간격으로 재시도
    ///
    /// `max_attempts`가 `None`이면 무한 대기.
    pub async fn wait_until_up(&self, delay: Duration, max_attempts: Option<u32>) -> Result<Vec<Address>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!("🔌 노드 상태 확인 중... (#{})", attempt);
            match self.provider.get_accounts().await {
                Ok(accounts) => {
                    info!("✅ 노드 응답: 계정 {}개", accounts.len());
                    return Ok(accounts);
                }
                Err(e) => {
                    if max_attempts.map_or(false, |max| attempt >= max) {
                        return Err(anyhow!("노드 연결 실패 ({}회 시도): {}", attempt, e));
                    }
                    warn!("⏳ 노드 미응답, {:?} 후 재시도: {}", delay, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// `evm_snapshot` 원시 호출
    pub async fn snapshot_id(&self) -> Result<String> {
        let id: String = self.provider.provider().request("evm_snapshot", ()).await?;
        Ok(id)
    }

    /// 스냅샷을 찍고 `name`으로 저장
    pub async fn take_snapshot(&self, name: &str) -> Result<String> {
        let id = self.snapshot_id().await?;
        self.snapshots.set(name, &id).await?;
        info!("📸 snapshot {} = {}", name, id);
        Ok(id)
    }

    /// `name` 스냅샷으로 되돌린 뒤 같은 이름으로 다시 찍는다
    ///
    /// 스냅샷은 한 번 revert 하면 소모되므로 재사용하려면 다시 찍어야 한다.
    pub async fn revert_to_snapshot(&self, name: &str) -> Result<String> {
        let id = self.snapshots.get(name).await?;
        let reverted: bool = self
            .provider
            .provider()
            .request("evm_revert", [id.as_str()])
            .await
            .map_err(|e| {
                debug!("evm_revert 오류: {}", e);
                HarnessError::SnapshotNotFound(id.clone())
            })?;

        if !reverted {
            return Err(HarnessError::SnapshotNotFound(id).into());
        }

        info!("⏪ revert to snapshot {} ({})", name, id);
        self.take_snapshot(name).await
    }

    pub async fn revert_to_initial_snapshot(&self) -> Result<String> {
        self.revert_to_snapshot(INITIAL_SNAPSHOT).await
    }

    pub async fn mine_blocks(&self, count: u64) -> Result<()> {
        for _ in 0..count {
            let _: Value = self.provider.provider().request("evm_mine", ()).await?;
        }
        debug!("⛏️ {} block(s) mined", count);
        Ok(())
    }

    pub async fn impersonate(&self, account: Address) -> Result<()> {
        let _: Value = self
            .provider
            .provider()
            .request("hardhat_impersonateAccount", [account])
            .await?;
        debug!("🎭 impersonating {:?}", account);
        Ok(())
    }

    pub async fn set_automine(&self, enabled: bool) -> Result<()> {
        let _: Value = self.provider.provider().request("evm_setAutomine", [enabled]).await?;
        debug!("⚙️ automine = {}", enabled);
        Ok(())
    }

    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::MockProvider;
    use tempfile::tempdir;

    fn node(dir: &std::path::Path) -> (NodeClient<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let store = SnapshotStore::new(dir, "snapshotIds");
        (NodeClient::new(Arc::new(provider), store), mock)
    }

    #[tokio::test]
    async fn test_take_snapshot_persists_id() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        mock.push::<String, _>("0x1".to_string()).unwrap();

        let id = node.take_snapshot("beforeTesting").await.unwrap();

        assert_eq!(id, "0x1");
        mock.assert_request("evm_snapshot", ()).unwrap();
        assert_eq!(node.snapshots().get("beforeTesting").await.unwrap(), "0x1");
    }

    #[tokio::test]
    async fn test_revert_retakes_snapshot() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        node.snapshots().set(INITIAL_SNAPSHOT, "0x1").await.unwrap();

        // MockProvider 응답은 나중에 넣은 것부터 꺼내진다
        mock.push::<String, _>("0x2".to_string()).unwrap();
        mock.push(true).unwrap();

        let id = node.revert_to_initial_snapshot().await.unwrap();

        assert_eq!(id, "0x2");
        mock.assert_request("evm_revert", ["0x1"]).unwrap();
        mock.assert_request("evm_snapshot", ()).unwrap();
        assert_eq!(node.snapshots().get(INITIAL_SNAPSHOT).await.unwrap(), "0x2");
    }

    #[tokio::test]
    async fn test_revert_false_is_snapshot_not_found() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        node.snapshots().set("case", "0x7").await.unwrap();
        mock.push(false).unwrap();

        let err = node.revert_to_snapshot("case").await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<HarnessError>(),
            Some(&HarnessError::SnapshotNotFound("0x7".to_string()))
        );
        // 실패하면 스냅샷을 다시 찍지 않는다
        assert_eq!(node.snapshots().get("case").await.unwrap(), "0x7");
    }

    #[tokio::test]
    async fn test_revert_rpc_error_is_snapshot_not_found() {
        let dir = tempdir().unwrap();
        let (node, _mock) = node(dir.path());
        node.snapshots().set("case", "0x9").await.unwrap();

        // 응답이 없으면 MockProvider가 에러를 돌려준다
        let err = node.revert_to_snapshot("case").await.unwrap_err();
        assert_eq!(err.to_string(), "no evm snapshot found! #0x9");
    }

    #[tokio::test]
    async fn test_revert_unknown_name() {
        let dir = tempdir().unwrap();
        let (node, _mock) = node(dir.path());

        let err = node.revert_to_snapshot("never-taken").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HarnessError>(), Some(HarnessError::SnapshotNotFound(_))));
    }

    #[tokio::test]
    async fn test_mine_blocks_sends_one_request_per_block() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        for _ in 0..3 {
            mock.push::<String, _>("0x0".to_string()).unwrap();
        }

        node.mine_blocks(3).await.unwrap();

        for _ in 0..3 {
            mock.assert_request("evm_mine", ()).unwrap();
        }
        assert!(mock.assert_request("evm_mine", ()).is_err());
    }

    #[tokio::test]
    async fn test_impersonate_and_automine_params() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        let account = Address::from([0x11; 20]);
        mock.push(true).unwrap();
        mock.push(true).unwrap();

        node.impersonate(account).await.unwrap();
        node.set_automine(false).await.unwrap();

        mock.assert_request("hardhat_impersonateAccount", [account]).unwrap();
        mock.assert_request("evm_setAutomine", [false]).unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_up_gives_up_after_max_attempts() {
        let dir = tempdir().unwrap();
        let (node, _mock) = node(dir.path());

        let result = node.wait_until_up(Duration::from_millis(1), Some(2)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wait_until_up_returns_accounts() {
        let dir = tempdir().unwrap();
        let (node, mock) = node(dir.path());
        let accounts = vec![Address::from([0x01; 20]), Address::from([0x02; 20])];
        mock.push::<Vec<Address>, _>(accounts.clone()).unwrap();

        let up = node.wait_until_up(Duration::from_millis(1), Some(1)).await.unwrap();
        assert_eq!(up, accounts);
        mock.assert_request("eth_accounts", ()).unwrap();
    }
}
