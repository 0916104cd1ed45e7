//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `pipeline` - 抓取流水线
//! - 按顺序调度：检查存储 → 启动浏览器 → 加载页面 → 抽取 → 上传 → 关闭浏览器
//! - 记录状态变化
//! - 决定哪些步骤需要重试
//!
//! ### `app` - 应用入口
//! - 装配真实的 `ChromeDriver` 和 `QiniuClient`
//! - 输出启动和结果日志
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! pipeline (一次运行)
//!     ↓
//! services (能力层：readiness / extractor / retry / publisher)
//!     ↓
//! infrastructure + browser + clients (浏览器会话、存储后端)
//! ```

pub mod app;
pub mod pipeline;

pub use app::App;
pub use pipeline::{build_search_url, Pipeline};
