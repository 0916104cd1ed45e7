use anyhow::{Context, Result};
use job_snapshot::{utils, App, Config, RunOutcome};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    utils::init();

    // 加载配置
    let config = Config::from_env().context("加载配置失败")?;

    let mut app = App::initialize(config)?;

    tokio::select! {
        outcome = app.run() => {
            match outcome? {
                RunOutcome::Published(artifact) => info!("数据文件地址: {}", artifact.url),
                RunOutcome::NoResults => warn!("没有数据，已跳过上传"),
            }
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("收到中断信号，正在退出...");
            anyhow::bail!("运行被中断");
        }
    }

    Ok(())
}
