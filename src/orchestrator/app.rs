//! 应用入口 - 编排层
//!
//! 把真实的浏览器驱动和七牛云客户端装配进流水线

use crate::browser::ChromeDriver;
use crate::clients::QiniuClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::pipeline::Pipeline;
use crate::services::Publisher;
use crate::utils::{log_outcome, log_startup};
use crate::workflow::RunOutcome;

/// 应用主结构
pub struct App {
    pipeline: Pipeline<ChromeDriver, QiniuClient>,
}

impl App {
    /// 初始化应用，不启动浏览器也不访问网络
    pub fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config.run);

        let staging_dir = config.storage.staging_dir.clone();
        let mut publisher = Publisher::new(QiniuClient::new(config.storage));
        if let Some(dir) = staging_dir {
            publisher = publisher.with_staging_dir(dir);
        }

        Ok(Self {
            pipeline: Pipeline::new(config.run, ChromeDriver, publisher)?,
        })
    }

    /// 运行一次抓取
    pub async fn run(&mut self) -> AppResult<RunOutcome> {
        let outcome = self.pipeline.run().await?;
        log_outcome(&outcome);
        Ok(outcome)
    }
}
