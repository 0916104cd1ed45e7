//! 浏览器会话抽象 - 基础设施层
//!
//! 编排层只依赖这里的两个 trait：
//! - `SessionDriver` 负责创建会话（启动浏览器）
//! - `PageSession` 是会话持有的页面能力：导航、探测、取文档、释放
//!
//! 真实实现见 `browser::headless`，测试中使用内存实现替代

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BrowserSettings, RunConfig};
use crate::error::AppResult;

/// 创建会话所需的参数
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub browser: BrowserSettings,
    /// 随每个请求发送的请求头
    pub headers: BTreeMap<String, String>,
    pub navigation_timeout: Duration,
}

impl SessionOptions {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            headers: config.headers.clone(),
            navigation_timeout: config.navigation_timeout,
        }
    }
}

/// 会话驱动：启动浏览器进程并打开页面
#[async_trait]
pub trait SessionDriver: Send + Sync {
    type Session: PageSession;

    /// 启动浏览器并返回会话，进程无法启动时返回 `LaunchFailed`
    async fn acquire(&self, options: &SessionOptions) -> AppResult<Self::Session>;
}

/// 一个浏览器会话（进程 + 上下文 + 页面）
#[async_trait]
pub trait PageSession: Send + Sync {
    /// 导航到 `url`，只等待 DOM 解析完成
    async fn navigate(&self, url: &str, timeout: Duration) -> AppResult<()>;

    /// 等待页面没有进行中的请求并持续 `quiet_window`
    ///
    /// 不自带超时，由调用方决定最长等待时间
    async fn wait_for_network_idle(&self, quiet_window: Duration) -> AppResult<()>;

    /// 选择器对应的元素当前是否已挂载到文档（不要求可见）
    async fn is_attached(&self, selector: &str) -> AppResult<bool>;

    /// 渲染后的完整 HTML
    async fn html(&self) -> AppResult<String>;

    /// 当前页面地址
    async fn current_url(&self) -> AppResult<Option<String>>;

    /// 关闭页面、上下文和浏览器进程，重复调用无副作用
    async fn release(&mut self) -> AppResult<()>;
}
