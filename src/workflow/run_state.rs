//! 一次运行的状态与结果
//!
//! 状态只会按固定顺序前进，任何一步失败都直接进入 `Failed`

use std::fmt::Display;

use crate::error::ErrorKind;
use crate::models::PublishedArtifact;

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    BackendChecked,
    SessionAcquired,
    Navigated,
    Ready,
    Extracted,
    Published,
    Done,
    Failed(ErrorKind),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "空闲"),
            PipelineState::BackendChecked => write!(f, "存储已检查"),
            PipelineState::SessionAcquired => write!(f, "浏览器已启动"),
            PipelineState::Navigated => write!(f, "页面已打开"),
            PipelineState::Ready => write!(f, "页面已就绪"),
            PipelineState::Extracted => write!(f, "数据已抽取"),
            PipelineState::Published => write!(f, "数据已上传"),
            PipelineState::Done => write!(f, "完成"),
            PipelineState::Failed(kind) => write!(f, "失败 ({:?})", kind),
        }
    }
}

/// 一次运行的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 已上传，附带公开地址
    Published(PublishedArtifact),
    /// 页面上没有任何职位，跳过上传
    NoResults,
}

impl RunOutcome {
    pub fn artifact(&self) -> Option<&PublishedArtifact> {
        match self {
            RunOutcome::Published(artifact) => Some(artifact),
            RunOutcome::NoResults => None,
        }
    }
}

/// 运行上下文，仅用于日志
#[derive(Debug, Clone)]
pub struct RunCtx {
    pub query: String,
    pub location_code: String,
}

impl Display for RunCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[关键词 {} 城市 {}]", self.query, self.location_code)
    }
}
