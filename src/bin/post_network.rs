use std::env;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use compfarm_harness::blockchain::{http_provider, NodeClient};
use compfarm_harness::scenarios::post_network;
use compfarm_harness::storage::{to_pretty_json, ContractRegistry, SnapshotStore};
use compfarm_harness::Config;

/// 로컬 노드 기동 후 초기화 바이너리 (테스트 코인 → initial 스냅샷 → 배포 기록 초기화)
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compfarm_harness=info,post_network=info".into()),
        )
        .init();

    let config_path = env::var("HARNESS_CONFIG").unwrap_or_else(|_| "config/harness.toml".to_string());
    let mut config = Config::load_or_default(&config_path).await?;
    config.apply_environment();
    if let Err(e) = config.validate() {
        error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }
    info!("✅ Configuration loaded from: {}", config_path);

    let provider = http_provider(
        &config.network.rpc_url,
        Duration::from_millis(config.network.poll_interval_ms),
    )?;
    let node = NodeClient::new(
        provider,
        SnapshotStore::new(&config.paths.root_dir, &config.paths.snapshot_file),
    );
    let registry = ContractRegistry::new(&config.paths.data_dir, &config.paths.deployed_file);

    let report = post_network(&config, &node, &registry, None).await?;
    println!("{}", to_pretty_json(&report)?);
    Ok(())
}
