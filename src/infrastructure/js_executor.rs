//! JS 执行器 - 基础设施层
//!
//! 持有页面资源，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};

/// JS 执行器
///
/// 职责：
/// - 持有 Page 资源
/// - 暴露 eval() 能力
/// - 不认识职位记录，不处理流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| AppError::session_failed("evaluate", e))?;
        let json_value = result
            .into_value()
            .map_err(|e| AppError::session_failed("evaluate", e))?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| AppError::session_failed("evaluate", e))
    }

    /// 当前文档地址
    pub async fn location_href(&self) -> AppResult<String> {
        self.eval_as("location.href").await
    }

    /// 选择器是否命中已挂载的元素
    pub async fn selector_attached(&self, selector: &str) -> AppResult<bool> {
        let js_code = format!(
            "document.querySelector({}) !== null",
            JsonValue::String(selector.to_string())
        );
        self.eval_as(js_code).await
    }
}
