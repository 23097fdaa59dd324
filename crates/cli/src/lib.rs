//! # NOFX CLI
//!
//! 交易代理主程序入口

pub mod app;

use anyhow::Result;
use dotenv::dotenv;
use tracing::info;

/// 应用初始化：环境变量 + 日志
pub async fn app_init() -> Result<()> {
    dotenv().ok();
    nofx_core::logger::setup_logging()?;
    info!("应用初始化完成");
    Ok(())
}

/// 运行主程序 - 委托给 app::bootstrap
pub async fn run() -> Result<()> {
    app::bootstrap::run().await
}
