use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use ethers::providers::{Http, Provider};
use ethers::types::H256;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compfarm_harness::blockchain::{http_provider, BlockReplayOptions, NodeClient, Replayer};
use compfarm_harness::protocols::Dydx;
use compfarm_harness::scenarios::{self, TestEnv};
use compfarm_harness::storage::{to_pretty_json, ContractRegistry, SnapshotStore, INITIAL_SNAPSHOT};
use compfarm_harness::Config;

const DEFAULT_CONFIG: &str = "config/harness.toml";

fn cli() -> Command {
    Command::new("harness")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🌾 Compound 레버리지 파밍 컨트랙트 테스트 하네스")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value(DEFAULT_CONFIG)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("초기 스냅샷으로 되돌린 뒤 시나리오 실행")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(scenarios::SCENARIO_NAMES),
                )
                .arg(
                    Arg::new("fixture")
                        .short('f')
                        .long("fixture")
                        .value_name("KEY")
                        .help("CSV 픽스처 키 (기본: 시나리오 기본값)"),
                ),
        )
        .subcommand(
            Command::new("fixtures")
                .about("CSV 픽스처를 해석해 JSON 미러로 기록")
                .arg(Arg::new("key").required(true)),
        )
        .subcommand(
            Command::new("snapshot")
                .about("이름 붙은 evm 스냅샷 저장 / 복원")
                .arg(Arg::new("name").default_value(INITIAL_SNAPSHOT))
                .arg(
                    Arg::new("revert")
                        .long("revert")
                        .help("저장 대신 복원 (복원 후 다시 저장)")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("replay-tx")
                .about("메인넷 트랜잭션을 로컬 포크에 재전송")
                .arg(Arg::new("hash").required(true)),
        )
        .subcommand(
            Command::new("replay-block")
                .about("메인넷 블록의 트랜잭션을 순서대로 재전송")
                .arg(Arg::new("block").required(true).value_parser(value_parser!(u64)))
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .default_value("0")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("skip-failed")
                        .long("skip-failed")
                        .action(ArgAction::SetTrue),
                )
                .arg(Arg::new("target").long("target").value_name("TX_HASH"))
                .arg(
                    Arg::new("skip")
                        .long("skip")
                        .value_name("INDICES")
                        .value_delimiter(',')
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("dydx-markets")
                .about("dYdX 마켓 상수 출력")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .help("SoloMargin에서 다시 읽어 저장")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("market")
                .about("Compound 마켓 상태 조회 (comp_constant 그룹 이름)")
                .arg(Arg::new("market").required(true).help("예: cDAI"))
                .arg(
                    Arg::new("account")
                        .long("account")
                        .value_name("SIGNER")
                        .help("공급/차입 잔고를 볼 서명자 이름"),
                ),
        )
        .subcommand(Command::new("deployed").about("배포 기록 출력"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let matches = cli().get_matches();

    let log_level = matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = matches.get_one::<String>("config").map(String::as_str).unwrap_or(DEFAULT_CONFIG);
    info!("📋 설정 파일 로드 중: {}", config_path);
    let mut config = Config::load_or_default(config_path).await?;
    config.apply_environment();
    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {}", e);
        return Err(e);
    }

    let provider = http_provider(
        &config.network.rpc_url,
        Duration::from_millis(config.network.poll_interval_ms),
    )?;
    info!("🔌 노드: {}", config.network.rpc_url);

    match matches.subcommand() {
        Some(("run", sub)) => run_scenario(config, provider, sub).await,
        Some(("fixtures", sub)) => decode_fixture(config, provider, sub).await,
        Some(("snapshot", sub)) => snapshot(&config, provider, sub).await,
        Some(("replay-tx", sub)) => replay_tx(&config, provider, sub).await,
        Some(("replay-block", sub)) => replay_block(&config, provider, sub).await,
        Some(("dydx-markets", sub)) => dydx_markets(&config, provider, sub).await,
        Some(("market", sub)) => market(config, provider, sub).await,
        Some(("deployed", _)) => {
            let registry = ContractRegistry::new(&config.paths.data_dir, &config.paths.deployed_file);
            println!("{}", to_pretty_json(&registry.load().await?)?);
            Ok(())
        }
        _ => Err(anyhow!("알 수 없는 명령")),
    }
}

fn node_client(config: &Config, provider: Arc<Provider<Http>>) -> NodeClient<Provider<Http>> {
    NodeClient::new(
        provider,
        SnapshotStore::new(&config.paths.root_dir, &config.paths.snapshot_file),
    )
}

async fn run_scenario(config: Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let name = sub
        .get_one::<String>("scenario")
        .ok_or_else(|| anyhow!("시나리오 이름 필요"))?;
    let fixture = sub.get_one::<String>("fixture").map(String::as_str);

    let node = node_client(&config, Arc::clone(&provider));
    let env = TestEnv::new(config, provider).await.context("테스트 환경 초기화 실패")?;
    let mut scenario = scenarios::build(name, env)?;

    let report = scenarios::execute(scenario.as_mut(), &node, fixture).await?;
    println!("{}", to_pretty_json(&report)?);
    report.ensure_passed()?;
    Ok(())
}

async fn decode_fixture(config: Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let key = sub.get_one::<String>("key").ok_or_else(|| anyhow!("픽스처 키 필요"))?;
    let env = TestEnv::new(config, provider).await?;
    let loader = env.loader();

    let rows = loader.get_test_data(key).await?;
    info!("💾 {}행 → {}", rows.len(), loader.json_mirror_dir().display());
    println!("{}", to_pretty_json(&rows)?);
    Ok(())
}

async fn snapshot(config: &Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let name = sub
        .get_one::<String>("name")
        .map(String::as_str)
        .unwrap_or(INITIAL_SNAPSHOT);
    let node = node_client(config, provider);

    let id = if sub.get_flag("revert") {
        node.revert_to_snapshot(name).await?
    } else {
        node.take_snapshot(name).await?
    };
    println!("{} {}", name, id);
    Ok(())
}

fn archive_provider(config: &Config) -> Result<Arc<Provider<Http>>> {
    let url = config
        .network
        .archive_rpc_url
        .as_deref()
        .ok_or_else(|| anyhow!("아카이브 노드 URL 없음 (ARCHIVE_RPC_URL)"))?;
    http_provider(url, Duration::from_millis(config.network.poll_interval_ms))
}

async fn replay_tx(config: &Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let hash = sub.get_one::<String>("hash").ok_or_else(|| anyhow!("트랜잭션 해시 필요"))?;
    let hash = H256::from_str(hash).map_err(|e| anyhow!("잘못된 트랜잭션 해시 {}: {}", hash, e))?;

    let replayer = Replayer::new(node_client(config, provider), archive_provider(config)?);
    let local = replayer.replicate_tx(hash).await?;
    println!("{:?}", local);
    Ok(())
}

async fn replay_block(config: &Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let block = *sub.get_one::<u64>("block").ok_or_else(|| anyhow!("블록 번호 필요"))?;
    let target_tx = sub
        .get_one::<String>("target")
        .map(|hash| H256::from_str(hash).map_err(|e| anyhow!("잘못된 트랜잭션 해시 {}: {}", hash, e)))
        .transpose()?;

    let options = BlockReplayOptions {
        offset: sub.get_one::<usize>("offset").copied().unwrap_or(0),
        skip_failed: sub.get_flag("skip-failed"),
        target_tx,
        skip_indices: sub
            .get_many::<u64>("skip")
            .map(|indices| indices.copied().collect())
            .unwrap_or_default(),
    };

    let replayer = Replayer::new(node_client(config, provider), archive_provider(config)?);
    let report = replayer.replicate_block(block, &options).await?;
    println!("{}", to_pretty_json(&report)?);
    Ok(())
}

async fn dydx_markets(config: &Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let mut dydx = Dydx::load(provider, &config.paths.data_dir, &config.paths.dydx_constant_file).await?;
    if sub.get_flag("refresh") {
        dydx.refresh_markets().await?;
    }
    println!("{}", to_pretty_json(dydx.constants())?);
    Ok(())
}

async fn market(config: Config, provider: Arc<Provider<Http>>, sub: &ArgMatches) -> Result<()> {
    let market = sub.get_one::<String>("market").ok_or_else(|| anyhow!("마켓 이름 필요"))?;
    let env = TestEnv::new(config, provider).await?;
    let compound = &env.compound;
    let ctoken = compound.constants().address(&format!("{}.address", market))?;

    let mut summary = serde_json::json!({
        "cToken": ctoken,
        "exchangeRate": compound.exchange_rate_current(ctoken).await?.to_string(),
        "totals": compound.total_supply_and_borrow(ctoken).await?,
        "speeds": compound.comp_speeds(ctoken).await?,
    });

    if let Some(name) = sub.get_one::<String>("account") {
        let account = env.signers.resolve(name)?;
        summary["account"] = serde_json::json!({
            "name": account.name,
            "supplyBalance": compound.supply_balance_current(ctoken, account.address).await?.to_string(),
            "borrowBalance": compound.borrow_balance_current(ctoken, account.address).await?.to_string(),
        });
    }

    println!("{}", to_pretty_json(&summary)?);
    Ok(())
}
