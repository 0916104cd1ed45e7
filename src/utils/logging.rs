/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;
use crate::workflow::RunOutcome;

/// 初始化日志
///
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖。重复调用不会报错
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &RunConfig) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 职位数据抓取");
    info!("🔍 搜索关键词: {}", config.query);
    info!("📍 城市代码: {}", config.location_code);
    info!(
        "⏱️ 导航超时: {} ms, 就绪超时: {} ms, 最多尝试 {} 次",
        config.navigation_timeout.as_millis(),
        config.readiness_timeout.as_millis(),
        config.retry.max_attempts
    );
    info!("{}", "=".repeat(60));
}

/// 记录运行结果
pub fn log_outcome(outcome: &RunOutcome) {
    info!("\n{}", "=".repeat(60));
    match outcome {
        RunOutcome::Published(artifact) => {
            info!("✅ 数据已上传: {}", artifact.url);
            info!("📦 文件大小: {} 字节", artifact.size_bytes);
        }
        RunOutcome::NoResults => warn!("⚠️ 没有抓取到任何职位，未上传"),
    }
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("前端开发工程师", 4), "前端开发...");
        assert_eq!(truncate_text("短", 4), "短");
    }
}
