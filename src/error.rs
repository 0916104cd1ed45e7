use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 存储后端错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 数据抽取错误
    #[error("抽取错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 浏览器进程无法启动
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        #[source]
        source: BoxError,
    },
    /// 导航超时或网络失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 结果容器在限定时间内没有出现
    #[error("等待元素 {selector} 超时 ({timeout_ms} ms)")]
    ReadinessTimeout { selector: String, timeout_ms: u64 },
    /// CDP 会话操作失败
    #[error("浏览器会话操作失败 ({action}): {source}")]
    SessionFailed {
        action: &'static str,
        #[source]
        source: BoxError,
    },
}

/// 存储后端错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 存储空间不可达或未授权
    #[error("存储空间 {bucket} 不可用: {reason}")]
    BackendUnavailable { bucket: String, reason: String },
    /// 没有数据需要上传
    #[error("没有数据需要上传")]
    EmptyResult,
    /// 上传被拒绝或失败
    #[error("上传失败 (状态码: {status:?}): {body}")]
    UploadFailed { status: Option<u16>, body: String },
    /// 序列化结果集失败
    #[error("序列化结果失败: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 暂存文件写入失败
    #[error("写入暂存文件 {path} 失败: {source}")]
    Staging {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 生成签名失败
    #[error("生成签名失败: {0}")]
    Signing(String),
}

/// 数据抽取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 选择器语法错误
    #[error("无效的选择器 {field} = '{selector}': {reason}")]
    InvalidSelector {
        field: &'static str,
        selector: String,
        reason: String,
    },
    /// 无法读取渲染后的文档
    #[error("读取页面文档失败: {0}")]
    DocumentUnavailable(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },
    /// 读取配置文件失败
    #[error("读取配置文件 {path} 失败: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 错误分类，供状态机记录失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Launch,
    Navigation,
    ReadinessTimeout,
    Session,
    BackendUnavailable,
    EmptyResult,
    Upload,
    Serialization,
    Extraction,
    Config,
}

impl AppError {
    /// 错误所属的分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Browser(e) => match e {
                BrowserError::LaunchFailed { .. } => ErrorKind::Launch,
                BrowserError::NavigationFailed { .. } => ErrorKind::Navigation,
                BrowserError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
                BrowserError::SessionFailed { .. } => ErrorKind::Session,
            },
            AppError::Storage(e) => match e {
                StorageError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
                StorageError::EmptyResult => ErrorKind::EmptyResult,
                StorageError::UploadFailed { .. } => ErrorKind::Upload,
                StorageError::Serialization(_)
                | StorageError::Staging { .. }
                | StorageError::Signing(_) => ErrorKind::Serialization,
            },
            AppError::Extraction(_) => ErrorKind::Extraction,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    // ========== 便捷构造函数 ==========

    /// 创建浏览器启动错误
    pub fn launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建导航错误
    pub fn navigation_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            reason: reason.into(),
        })
    }

    /// 创建会话操作错误
    pub fn session_failed(
        action: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::SessionFailed {
            action,
            source: Box::new(source),
        })
    }

    /// 创建存储空间不可用错误
    pub fn backend_unavailable(bucket: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Storage(StorageError::BackendUnavailable {
            bucket: bucket.into(),
            reason: reason.into(),
        })
    }

    /// 创建上传失败错误
    pub fn upload_failed(status: Option<u16>, body: impl Into<String>) -> Self {
        AppError::Storage(StorageError::UploadFailed {
            status,
            body: body.into(),
        })
    }
}

/// 可重试错误的判定
///
/// 重试控制器只依赖这个判定，不关心具体重试的是什么操作
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Navigation | ErrorKind::ReadinessTimeout | ErrorKind::Upload
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
