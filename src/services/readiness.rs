//! 页面就绪检测 - 业务能力层
//!
//! 页面 load 事件对客户端渲染的内容并不可靠，这里按固定顺序逐步确认：
//!
//! 1. DOM 解析完成（导航时已保证）
//! 2. 网络空闲，尽力而为：超时只记录警告
//! 3. 结果容器挂载到文档：超时即失败
//! 4. 固定的稳定等待，让列表项完成渲染

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{AppResult, BrowserError};
use crate::infrastructure::PageSession;

/// 就绪检测参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub container_selector: String,
    pub network_idle_quiet: Duration,
    pub network_idle_timeout: Duration,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl ReadinessSettings {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            container_selector: config.selectors.container.clone(),
            network_idle_quiet: config.network_idle_quiet,
            network_idle_timeout: config.network_idle_timeout,
            readiness_timeout: config.readiness_timeout,
            poll_interval: config.selector_poll_interval,
            settle_delay: config.settle_delay,
        }
    }
}

/// 网络空闲这一步的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkIdle {
    Reached,
    /// 等待超时，按设计继续后续步骤
    TimedOut,
}

/// 就绪检测报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessReport {
    pub network_idle: NetworkIdle,
    /// 容器出现所用的时间
    pub container_wait: Duration,
}

/// 页面就绪检测器
pub struct ReadinessDetector {
    settings: ReadinessSettings,
}

impl ReadinessDetector {
    pub fn new(settings: ReadinessSettings) -> Self {
        Self { settings }
    }

    /// 依次执行就绪检测步骤
    pub async fn await_ready<S: PageSession>(&self, session: &S) -> AppResult<ReadinessReport> {
        debug!("DOM 解析已完成");

        let network_idle = self.wait_network_idle(session).await?;
        let container_wait = self.wait_container(session).await?;

        if !self.settings.settle_delay.is_zero() {
            debug!("稳定等待 {} ms", self.settings.settle_delay.as_millis());
            sleep(self.settings.settle_delay).await;
        }

        info!("搜索结果加载完成");
        Ok(ReadinessReport {
            network_idle,
            container_wait,
        })
    }

    /// 第 2 步：网络空闲。只有超时被视为非致命，会话错误照常返回
    async fn wait_network_idle<S: PageSession>(&self, session: &S) -> AppResult<NetworkIdle> {
        let limit = self.settings.network_idle_timeout;
        match timeout(limit, session.wait_for_network_idle(self.settings.network_idle_quiet)).await {
            Ok(Ok(())) => {
                debug!("网络已空闲");
                Ok(NetworkIdle::Reached)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("等待网络空闲超时 ({} ms)，继续执行...", limit.as_millis());
                Ok(NetworkIdle::TimedOut)
            }
        }
    }

    /// 第 3 步：容器挂载。超时即失败
    async fn wait_container<S: PageSession>(&self, session: &S) -> AppResult<Duration> {
        let selector = &self.settings.container_selector;
        let limit = self.settings.readiness_timeout;
        let started = Instant::now();

        let poll = async {
            loop {
                if session.is_attached(selector).await? {
                    return AppResult::Ok(started.elapsed());
                }
                sleep(self.settings.poll_interval).await;
            }
        };

        match timeout(limit, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!("等待元素 {} 超时", selector);
                Err(BrowserError::ReadinessTimeout {
                    selector: selector.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }
                .into())
            }
        }
    }
}
