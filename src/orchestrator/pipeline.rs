//! 抓取流水线 - 编排层
//!
//! ## 职责
//!
//! 按固定顺序串起各个能力：
//!
//! 1. 检查存储后端（在启动浏览器之前）
//! 2. 启动浏览器会话
//! 3. 导航 + 就绪检测（作为一个整体重试）
//! 4. 抽取职位记录
//! 5. 上传结果（单独重试，每次使用同一个键）
//! 6. 关闭会话：只要会话已经启动，无论成功失败都会执行
//!
//! 流水线只做调度，不关心页面结构和存储协议。

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::RunConfig;
use crate::error::{AppResult, ConfigError};
use crate::infrastructure::{PageSession, SessionDriver, SessionOptions};
use crate::services::{
    ConstantDelay, DelayPolicy, Extractor, Publisher, ReadinessDetector, ReadinessSettings,
    RetryController, StorageBackend,
};
use crate::workflow::{PipelineState, RunCtx, RunOutcome};

/// 拼接搜索地址：`{base}?query=..&city=..&t=..`
pub fn build_search_url(
    base: &str,
    query: &str,
    location_code: &str,
    now_millis: i64,
) -> AppResult<String> {
    let t = now_millis.to_string();
    let url = Url::parse_with_params(base, &[("query", query), ("city", location_code), ("t", t.as_str())])
        .map_err(|e| ConfigError::Invalid {
            field: "target_url",
            reason: e.to_string(),
        })?;
    Ok(url.into())
}

/// 抓取流水线
pub struct Pipeline<D, B, P = ConstantDelay> {
    config: RunConfig,
    driver: D,
    publisher: Publisher<B>,
    retry: RetryController<P>,
    extractor: Extractor,
    readiness: ReadinessDetector,
    history: Vec<PipelineState>,
}

impl<D, B> Pipeline<D, B, ConstantDelay>
where
    D: SessionDriver,
    B: StorageBackend,
{
    /// 按运行配置创建流水线，重试使用固定间隔
    pub fn new(config: RunConfig, driver: D, publisher: Publisher<B>) -> AppResult<Self> {
        let retry = RetryController::from_settings(&config.retry);
        Self::with_retry(config, driver, publisher, retry)
    }
}

impl<D, B, P> Pipeline<D, B, P>
where
    D: SessionDriver,
    B: StorageBackend,
    P: DelayPolicy,
{
    pub fn with_retry(
        config: RunConfig,
        driver: D,
        publisher: Publisher<B>,
        retry: RetryController<P>,
    ) -> AppResult<Self> {
        Ok(Self {
            extractor: Extractor::new(&config.selectors)?,
            readiness: ReadinessDetector::new(ReadinessSettings::from_run_config(&config)),
            config,
            driver,
            publisher,
            retry,
            history: vec![PipelineState::Idle],
        })
    }

    /// 本次运行经过的所有状态
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn state(&self) -> PipelineState {
        self.history.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn publisher(&self) -> &Publisher<B> {
        &self.publisher
    }

    /// 执行一次完整的抓取
    pub async fn run(&mut self) -> AppResult<RunOutcome> {
        self.history = vec![PipelineState::Idle];
        let ctx = RunCtx {
            query: self.config.query.clone(),
            location_code: self.config.location_code.clone(),
        };
        info!("{} 开始抓取", ctx);

        let result = self.execute().await;
        match &result {
            Ok(_) => self.transition(PipelineState::Done),
            Err(e) => {
                error!("{} 抓取失败: {}", ctx, e);
                self.transition(PipelineState::Failed(e.kind()));
            }
        }
        result
    }

    async fn execute(&mut self) -> AppResult<RunOutcome> {
        self.publisher.check_backend().await?;
        self.transition(PipelineState::BackendChecked);

        info!("正在启动浏览器...");
        let options = SessionOptions::from_run_config(&self.config);
        let mut session = self.driver.acquire(&options).await?;
        self.transition(PipelineState::SessionAcquired);

        let result = self.drive(&session).await;

        if let Err(e) = session.release().await {
            warn!("关闭浏览器失败: {}", e);
        }
        result
    }

    async fn drive(&mut self, session: &D::Session) -> AppResult<RunOutcome> {
        let url = build_search_url(
            &self.config.target_url,
            &self.config.query,
            &self.config.location_code,
            Utc::now().timestamp_millis(),
        )?;
        info!("正在访问页面: {}", url);

        let navigated = AtomicBool::new(false);
        let loaded = {
            let flag = &navigated;
            let readiness = &self.readiness;
            let url = url.as_str();
            let nav_timeout = self.config.navigation_timeout;
            self.retry
                .run("加载搜索页", move || async move {
                    session.navigate(url, nav_timeout).await?;
                    flag.store(true, Ordering::SeqCst);
                    readiness.await_ready(session).await
                })
                .await
        };
        if navigated.load(Ordering::SeqCst) {
            self.transition(PipelineState::Navigated);
        }
        let report = loaded?;
        debug!("就绪检测: {:?}", report);
        self.transition(PipelineState::Ready);

        let html = session.html().await?;
        let page_url = session.current_url().await?;
        let result_set = self.extractor.extract(&html, page_url.as_deref());
        self.transition(PipelineState::Extracted);
        info!("抓取到 {} 条职位数据", result_set.len());

        if result_set.is_empty() {
            warn!("⚠️ 没有抓取到数据，跳过上传");
            return Ok(RunOutcome::NoResults);
        }

        let prepared = self.publisher.prepare(&result_set)?;
        let artifact = {
            let publisher = &self.publisher;
            let prepared = &prepared;
            self.retry
                .run("上传结果", move || publisher.upload(prepared))
                .await?
        };
        self.transition(PipelineState::Published);

        Ok(RunOutcome::Published(artifact))
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("状态: {} -> {}", self.state(), next);
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_parameters() {
        let url = build_search_url(
            "https://www.zhipin.com/web/geek/job",
            "前端 开发",
            "101270100",
            1_700_000_000_000,
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "前端 开发".to_string()),
                ("city".to_string(), "101270100".to_string()),
                ("t".to_string(), "1700000000000".to_string()),
            ]
        );
        assert!(url.starts_with("https://www.zhipin.com/web/geek/job?query="));
    }

    #[test]
    fn test_search_url_rejects_relative_base() {
        assert!(build_search_url("not a url", "q", "1", 0).is_err());
    }
}
