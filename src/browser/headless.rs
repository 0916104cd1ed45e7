use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{self, Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, NavigateParams, SetBypassCspParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::browser::interceptor;
use crate::browser::network::NetworkTracker;
use crate::config::BrowserSettings;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{JsExecutor, PageSession, SessionDriver, SessionOptions};

/// 无人值守运行需要的稳定性参数
pub const STABILITY_ARGS: [&str; 3] = [
    "--disable-gpu",           // 禁用 GPU 加速
    "--disable-dev-shm-usage", // 防止共享内存不足
    "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
];

/// CDP 命令的最短超时，与 chromiumoxide 的默认值一致
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 导航失败时 Chrome 会落到内置错误页
const CHROME_ERROR_PREFIX: &str = "chrome-error://";

/// 基于 chromiumoxide 的会话驱动
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeDriver;

#[async_trait]
impl SessionDriver for ChromeDriver {
    type Session = ChromeSession;

    async fn acquire(&self, options: &SessionOptions) -> AppResult<ChromeSession> {
        launch_headless_browser(options).await
    }
}

/// 构造浏览器启动配置
fn build_browser_config(settings: &BrowserSettings, navigation_timeout: Duration) -> AppResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(request_timeout_for(navigation_timeout))
        .viewport(Viewport {
            width: settings.viewport_width,
            height: settings.viewport_height,
            ..Default::default()
        })
        .window_size(settings.viewport_width, settings.viewport_height)
        .args(STABILITY_ARGS.to_vec());

    builder = if settings.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };

    if let Some(path) = &settings.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        AppError::launch_failed(std::io::Error::other(e))
    })
}

/// 启动无头浏览器并打开一个已配置好的空白页面
pub async fn launch_headless_browser(options: &SessionOptions) -> AppResult<ChromeSession> {
    info!("🚀 启动无头浏览器...");
    let config = build_browser_config(&options.browser, options.navigation_timeout)?;

    let (mut browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        AppError::launch_failed(e)
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    match open_configured_page(&browser, options).await {
        Ok((page, network, interceptor_task)) => {
            info!("✅ 浏览器会话已就绪");
            Ok(ChromeSession {
                browser: Some(browser),
                executor: JsExecutor::new(page),
                network,
                handler_task,
                interceptor_task,
            })
        }
        Err(e) => {
            // 页面没配置好，浏览器进程不能留下
            if let Err(close_err) = browser.close().await {
                warn!("关闭浏览器失败: {}", close_err);
            }
            if let Err(wait_err) = browser.wait().await {
                warn!("等待浏览器进程退出失败: {}", wait_err);
            }
            handler_task.abort();
            Err(e)
        }
    }
}

async fn open_configured_page(
    browser: &Browser,
    options: &SessionOptions,
) -> AppResult<(Page, NetworkTracker, JoinHandle<()>)> {
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::launch_failed(e)
    })?;

    page.execute(network::EnableParams::default())
        .await
        .map_err(|e| AppError::session_failed("network.enable", e))?;

    let headers: serde_json::Map<String, JsonValue> = options
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), JsonValue::String(value.clone())))
        .collect();
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(JsonValue::Object(headers))))
        .await
        .map_err(|e| AppError::session_failed("network.setExtraHTTPHeaders", e))?;
    debug!("已设置 {} 个请求头", options.headers.len());

    if options.browser.ignore_https_errors {
        page.execute(SetIgnoreCertificateErrorsParams::new(true))
            .await
            .map_err(|e| AppError::session_failed("security.setIgnoreCertificateErrors", e))?;
    }
    if options.browser.bypass_csp {
        page.execute(SetBypassCspParams::new(true))
            .await
            .map_err(|e| AppError::session_failed("page.setBypassCSP", e))?;
    }

    let network = NetworkTracker::attach(&page).await?;
    let interceptor_task = interceptor::install(&page).await?;

    Ok((page, network, interceptor_task))
}

/// 一次运行独占的浏览器会话
pub struct ChromeSession {
    browser: Option<Browser>,
    executor: JsExecutor,
    network: NetworkTracker,
    handler_task: JoinHandle<()>,
    interceptor_task: JoinHandle<()>,
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&self, url: &str, limit: Duration) -> AppResult<()> {
        info!("正在访问: {}", url);

        // 先订阅再发起导航，避免错过事件
        let mut dom_ready = self
            .executor
            .page()
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| AppError::session_failed("page.domContentEventFired", e))?;

        // Page.navigate 要等到 load 才返回，放到后台执行
        let page = self.executor.page().clone();
        let params = NavigateParams::new(url);
        let mut command = tokio::spawn(async move { page.execute(params).await });

        let landed = async {
            tokio::select! {
                fired = dom_ready.next() => match fired {
                    Some(_) => Ok(()),
                    None => Err(AppError::navigation_failed(url, "页面事件流已关闭")),
                },
                joined = &mut command => match joined {
                    Ok(Ok(response)) => match &response.result.error_text {
                        Some(text) => Err(AppError::navigation_failed(url, text.clone())),
                        None => Ok(()),
                    },
                    Ok(Err(e)) => Err(AppError::navigation_failed(url, e.to_string())),
                    Err(e) => Err(AppError::navigation_failed(url, e.to_string())),
                },
            }
        };

        let result = match timeout(limit, landed).await {
            Ok(result) => result,
            Err(_) => Err(AppError::navigation_failed(
                url,
                format!("等待 DOM 解析超时 ({} ms)", limit.as_millis()),
            )),
        };
        // 页面里的导航照常继续，这里只是不再等待命令返回
        command.abort();
        result?;

        let href = self.executor.location_href().await?;
        check_landed_url(url, &href)?;
        debug!("DOM 解析完成: {}", href);
        Ok(())
    }

    async fn wait_for_network_idle(&self, quiet_window: Duration) -> AppResult<()> {
        self.network.wait_for_idle(quiet_window).await;
        Ok(())
    }

    async fn is_attached(&self, selector: &str) -> AppResult<bool> {
        self.executor.selector_attached(selector).await
    }

    async fn html(&self) -> AppResult<String> {
        self.executor
            .page()
            .content()
            .await
            .map_err(|e| AppError::session_failed("page.content", e))
    }

    async fn current_url(&self) -> AppResult<Option<String>> {
        self.executor
            .page()
            .url()
            .await
            .map_err(|e| AppError::session_failed("page.url", e))
    }

    async fn release(&mut self) -> AppResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        self.interceptor_task.abort();
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!("等待浏览器进程退出失败: {}", e);
        }
        self.handler_task.abort();

        match closed {
            Ok(_) => {
                info!("浏览器已关闭");
                Ok(())
            }
            Err(e) => Err(AppError::session_failed("browser.close", e)),
        }
    }
}

/// CDP 命令超时不短于导航超时
fn request_timeout_for(navigation_timeout: Duration) -> Duration {
    navigation_timeout.max(MIN_REQUEST_TIMEOUT)
}

/// 落到 Chrome 错误页说明导航失败
fn check_landed_url(requested: &str, href: &str) -> AppResult<()> {
    if href.starts_with(CHROME_ERROR_PREFIX) {
        return Err(AppError::navigation_failed(requested, format!("页面加载失败 ({})", href)));
    }
    Ok(())
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // 未经 release 就被丢弃（例如运行被取消）：Browser 自身的 Drop 会结束子进程
        if self.browser.is_some() {
            warn!("浏览器会话未正常释放，将强制结束浏览器进程");
        }
        self.interceptor_task.abort();
        self.handler_task.abort();
    }
}
