//! 请求拦截：强制给每个请求加上禁用缓存的请求头
//!
//! 通过 CDP 的 Fetch 域暂停所有请求，合并请求头后放行。
//! 调用方提供的同名请求头（不区分大小写）会被覆盖。

use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, HeaderEntry, RequestPattern,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// 每个请求都会被强制注入的防缓存头
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// 合并原始请求头与防缓存头
///
/// 原始头中与防缓存头同名的条目被丢弃，其余保持原顺序，防缓存头追加在最后
pub fn merge_no_cache_headers(original: &JsonValue) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = original
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter(|(name, _)| {
                    !NO_CACHE_HEADERS
                        .iter()
                        .any(|(forced, _)| forced.eq_ignore_ascii_case(name))
                })
                .map(|(name, value)| {
                    let value = match value {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    merged.extend(
        NO_CACHE_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );
    merged
}

/// 在页面上安装拦截器，返回后台任务句柄
pub async fn install(page: &Page) -> AppResult<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| AppError::session_failed("fetch.requestPaused", e))?;

    let params = fetch::EnableParams {
        patterns: Some(vec![RequestPattern {
            url_pattern: Some("*".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };
    page.execute(params)
        .await
        .map_err(|e| AppError::session_failed("fetch.enable", e))?;
    debug!("请求拦截器已启用");

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let headers = merge_no_cache_headers(event.request.headers.inner())
                .into_iter()
                .map(|(name, value)| HeaderEntry::new(name, value))
                .collect();

            let mut params = ContinueRequestParams::new(event.request_id.clone());
            params.headers = Some(headers);

            if let Err(e) = page.execute(params).await {
                // 页面关闭时未放行的请求会失败，属于正常现象
                warn!("放行请求失败 {}: {}", event.request.url, e);
            }
        }
        debug!("请求拦截器已退出");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forced_headers_override_caller_values() {
        let original = json!({
            "cache-control": "max-age=3600",
            "PRAGMA": "cache",
            "user-agent": "test-agent",
        });

        let merged = merge_no_cache_headers(&original);

        assert!(merged.contains(&("user-agent".to_string(), "test-agent".to_string())));
        assert!(merged.contains(&(
            "Cache-Control".to_string(),
            "no-cache, no-store, must-revalidate".to_string()
        )));
        assert!(merged.contains(&("Pragma".to_string(), "no-cache".to_string())));
        assert!(merged.contains(&("Expires".to_string(), "0".to_string())));
        assert!(!merged.iter().any(|(_, v)| v == "max-age=3600" || v == "cache"));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_non_object_headers() {
        let merged = merge_no_cache_headers(&JsonValue::Null);
        assert_eq!(merged.len(), NO_CACHE_HEADERS.len());
    }
}
