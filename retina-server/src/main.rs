//! 视网膜检查分析服务主程序

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use retina_database::{DatabasePool, PgStore};
use retina_integration::{HttpImageStore, HttpInferenceClient, ImageStoreConfig, InferenceConfig};
use retina_web::WebServer;
use retina_workflow::{ExamAnalysisOrchestrator, ImageStaging};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// 服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "retina-server")]
#[command(about = "视网膜检查自动分析服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 服务器端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 启动前创建数据库表
    #[arg(long)]
    init_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // 初始化日志，RUST_LOG 优先
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting retina analysis server...");
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!("  Inference service: {}", config.inference.base_url);

    let pool = DatabasePool::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgStore::new(pool));
    if args.init_db {
        store.migrate().await.context("Failed to initialize database")?;
        info!("Database tables initialized");
    }

    let inference = HttpInferenceClient::new(InferenceConfig {
        base_url: config.inference.base_url.clone(),
        timeout: config.inference.timeout(),
    })?;
    let images = HttpImageStore::new(ImageStoreConfig {
        timeout: config.image_store.timeout(),
    })?;
    let staging = match &config.staging.dir {
        Some(dir) => ImageStaging::in_dir(dir),
        None => ImageStaging::new(),
    };

    let orchestrator = ExamAnalysisOrchestrator::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(images),
        Arc::new(inference),
    )
    .with_staging(staging);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    if let Err(e) = WebServer::new(addr, Arc::new(orchestrator)).run().await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
