//! # Job Snapshot
//!
//! 用无头浏览器打开职位搜索页，等待客户端渲染完成后抽取职位列表，
//! 把结果作为一个 JSON 文件上传到对象存储并返回公开地址
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 浏览器会话的 trait 抽象，以及页面脚本执行能力 `JsExecutor`
//! - `browser/` - 基于 chromiumoxide 的会话实现：启动参数、请求头拦截、网络活动跟踪
//! - `clients/` - 七牛云存储客户端
//!
//! ### ② 业务能力层（Services）
//! - `ReadinessDetector` - 判断页面是否真正渲染完成
//! - `Extractor` - 按字段映射把文档转成职位记录
//! - `RetryController` - 有限次重试
//! - `Publisher` - 序列化、命名并上传结果
//!
//! ### ③ 流程层（Workflow）
//! - `PipelineState` / `RunOutcome` - 一次运行的状态与结果
//!
//! ### ④ 编排层（Orchestration）
//! - `Pipeline` - 串起所有步骤并保证浏览器被关闭
//! - `App` - 装配真实实现
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, RunConfig};
pub use error::{AppError, AppResult, ErrorKind};
pub use models::{JobRecord, PublishedArtifact, ResultSet};
pub use orchestrator::{App, Pipeline};
pub use workflow::{PipelineState, RunOutcome};
