//! 程序配置
//!
//! - `StorageConfig`：存储后端凭证，只从环境变量读取
//! - `PartialRunConfig`：可选的运行参数，来源为 TOML 文件和环境变量
//! - `resolve_config`：把部分配置按固定的兜底规则补全为 `RunConfig`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::city;

/// 默认搜索关键词
pub const DEFAULT_QUERY: &str = "前端开发工程师";
/// 默认搜索页地址
pub const DEFAULT_TARGET_URL: &str = "https://www.zhipin.com/web/geek/job";
/// 默认桌面浏览器 UA
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 运行参数配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "JOB_SNAPSHOT_CONFIG";

/// 环境变量名与请求头名称的对应关系
const HEADER_ENV_VARS: &[(&str, &str)] = &[
    ("HTTP_HEADERS_ACCEPT", "accept"),
    ("HTTP_HEADERS_ACCEPT_LANGUAGE", "accept-language"),
    ("HTTP_HEADERS_CACHE_CONTROL", "cache-control"),
    ("HTTP_HEADERS_SEC_CH_UA", "sec-ch-ua"),
    ("HTTP_HEADERS_SEC_CH_UA_MOBILE", "sec-ch-ua-mobile"),
    ("HTTP_HEADERS_SEC_CH_UA_PLATFORM", "sec-ch-ua-platform"),
    ("HTTP_HEADERS_SEC_FETCH_DEST", "sec-fetch-dest"),
    ("HTTP_HEADERS_SEC_FETCH_MODE", "sec-fetch-mode"),
    ("HTTP_HEADERS_SEC_FETCH_SITE", "sec-fetch-site"),
    ("HTTP_HEADERS_SEC_FETCH_USER", "sec-fetch-user"),
    ("HTTP_HEADERS_UPGRADE_INSECURE_REQUESTS", "upgrade-insecure-requests"),
    ("HTTP_HEADERS_USER_AGENT", "user-agent"),
];

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 存储后端配置
    pub storage: StorageConfig,
    /// 本次运行的参数
    pub run: RunConfig,
}

impl Config {
    /// 从环境变量（以及可选的 TOML 文件）加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut partial = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => PartialRunConfig::from_toml_file(Path::new(&path))?,
            _ => PartialRunConfig::default(),
        };
        partial = partial.merge(PartialRunConfig::from_env()?);

        Ok(Self {
            storage: StorageConfig::from_env()?,
            run: resolve_config(partial)?,
        })
    }
}

/// 上传请求默认超时（秒）
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

/// 存储后端（七牛云 Kodo）配置
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// 公开访问域名，不含协议
    pub domain: String,
    /// 上传地址（华南区域）
    pub upload_host: String,
    /// 存储空间管理接口地址
    pub uc_host: String,
    /// 上传凭证有效期
    pub token_ttl: Duration,
    /// 单次上传请求的超时，超时按可重试的上传失败处理
    pub upload_timeout: Duration,
    /// 上传前的暂存目录，为空则直接从内存上传
    pub staging_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            access_key: require_env("QINIU_ACCESS_KEY")?,
            secret_key: require_env("QINIU_SECRET_KEY")?,
            bucket: require_env("QINIU_BUCKET")?,
            domain: require_env("QINIU_DOMAIN")?,
            upload_host: std::env::var("QINIU_UPLOAD_URL")
                .unwrap_or_else(|_| "https://up-z2.qiniup.com".to_string()),
            uc_host: std::env::var("QINIU_UC_HOST").unwrap_or_else(|_| "https://uc.qbox.me".to_string()),
            token_ttl: Duration::from_secs(env_parse::<u64>("QINIU_TOKEN_TTL_SECS")?.unwrap_or(3600)),
            upload_timeout: Duration::from_secs(
                env_parse::<u64>("QINIU_UPLOAD_TIMEOUT_SECS")?.unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ),
            staging_dir: std::env::var("STAGING_DIR").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
        })
    }
}

/// 抽取用的字段映射（CSS 选择器）
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// 结果列表容器，页面就绪的标志
    pub container: String,
    /// 重复的职位卡片
    pub item: String,
    pub title: String,
    pub organization: String,
    pub compensation: String,
    pub location: String,
    /// 卡片内的标签列表
    pub tags: String,
    /// 详情链接
    pub link: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            container: ".job-list-box".to_string(),
            item: ".job-card-wrapper".to_string(),
            title: ".job-name".to_string(),
            organization: ".company-name".to_string(),
            compensation: ".salary".to_string(),
            location: ".job-area".to_string(),
            tags: ".tag-list span".to_string(),
            link: "a".to_string(),
        }
    }
}

/// 重试参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        }
    }
}

/// 浏览器启动参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// 忽略证书错误
    pub ignore_https_errors: bool,
    /// 绕过页面的内容安全策略
    pub bypass_csp: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            viewport_width: 1920,
            viewport_height: 1080,
            ignore_https_errors: true,
            bypass_csp: true,
        }
    }
}

/// 部分运行参数，所有字段可选
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PartialRunConfig {
    pub query: Option<String>,
    /// 城市名称，例如 "成都"
    pub city: Option<String>,
    /// 已解析的城市代码，优先于 `city`
    pub city_code: Option<String>,
    pub target_url: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub navigation_timeout_ms: Option<u64>,
    pub readiness_timeout_ms: Option<u64>,
    pub network_idle_quiet_ms: Option<u64>,
    pub network_idle_timeout_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub selector_poll_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub headless: Option<bool>,
    pub chrome_executable: Option<PathBuf>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub ignore_https_errors: Option<bool>,
    pub bypass_csp: Option<bool>,
    pub selectors: Option<FieldMapping>,
}

impl PartialRunConfig {
    /// 从 TOML 文件读取
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 从环境变量读取
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut headers = BTreeMap::new();
        for (var, name) in HEADER_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    headers.insert(name.to_string(), value);
                }
            }
        }

        Ok(Self {
            query: env_string("SEARCH_QUERY").or_else(|| env_string("DEFAULT_SEARCH_QUERY")),
            city: env_string("SEARCH_CITY"),
            city_code: env_string("DEFAULT_CITY_CODE"),
            target_url: env_string("TARGET_URL"),
            headers: (!headers.is_empty()).then_some(headers),
            navigation_timeout_ms: env_parse("PAGE_TIMEOUT")?,
            readiness_timeout_ms: env_parse("READINESS_TIMEOUT")?,
            network_idle_quiet_ms: env_parse("NETWORK_IDLE_QUIET")?,
            network_idle_timeout_ms: env_parse("NETWORK_IDLE_TIMEOUT")?,
            settle_delay_ms: env_parse("SETTLE_DELAY")?,
            selector_poll_ms: env_parse("SELECTOR_POLL_INTERVAL")?,
            max_attempts: env_parse("MAX_RETRIES")?,
            backoff_base_ms: env_parse("RETRY_DELAY")?,
            headless: env_parse("HEADLESS")?,
            chrome_executable: env_string("BROWSER_PATH").map(PathBuf::from),
            viewport_width: env_parse("VIEWPORT_WIDTH")?,
            viewport_height: env_parse("VIEWPORT_HEIGHT")?,
            ignore_https_errors: env_parse("IGNORE_HTTPS_ERRORS")?,
            bypass_csp: env_parse("BYPASS_CSP")?,
            selectors: None,
        })
    }

    /// 合并两份部分配置，`other` 中已设置的字段覆盖当前值
    pub fn merge(self, other: Self) -> Self {
        Self {
            query: other.query.or(self.query),
            city: other.city.or(self.city),
            city_code: other.city_code.or(self.city_code),
            target_url: other.target_url.or(self.target_url),
            headers: match (self.headers, other.headers) {
                (Some(mut base), Some(over)) => {
                    base.extend(over);
                    Some(base)
                }
                (base, over) => over.or(base),
            },
            navigation_timeout_ms: other.navigation_timeout_ms.or(self.navigation_timeout_ms),
            readiness_timeout_ms: other.readiness_timeout_ms.or(self.readiness_timeout_ms),
            network_idle_quiet_ms: other.network_idle_quiet_ms.or(self.network_idle_quiet_ms),
            network_idle_timeout_ms: other.network_idle_timeout_ms.or(self.network_idle_timeout_ms),
            settle_delay_ms: other.settle_delay_ms.or(self.settle_delay_ms),
            selector_poll_ms: other.selector_poll_ms.or(self.selector_poll_ms),
            max_attempts: other.max_attempts.or(self.max_attempts),
            backoff_base_ms: other.backoff_base_ms.or(self.backoff_base_ms),
            headless: other.headless.or(self.headless),
            chrome_executable: other.chrome_executable.or(self.chrome_executable),
            viewport_width: other.viewport_width.or(self.viewport_width),
            viewport_height: other.viewport_height.or(self.viewport_height),
            ignore_https_errors: other.ignore_https_errors.or(self.ignore_https_errors),
            bypass_csp: other.bypass_csp.or(self.bypass_csp),
            selectors: other.selectors.or(self.selectors),
        }
    }
}

/// 一次运行的完整参数，构造后不再修改
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub query: String,
    pub location_code: String,
    pub target_url: String,
    pub headers: BTreeMap<String, String>,
    pub navigation_timeout: Duration,
    pub readiness_timeout: Duration,
    pub network_idle_quiet: Duration,
    pub network_idle_timeout: Duration,
    pub settle_delay: Duration,
    pub selector_poll_interval: Duration,
    pub retry: RetrySettings,
    pub browser: BrowserSettings,
    pub selectors: FieldMapping,
}

/// 把部分配置补全为 `RunConfig`
///
/// 兜底规则：
/// 1. 关键词缺失或为空白时使用 [`DEFAULT_QUERY`]
/// 2. 城市代码：`city_code` > `city` 查表 > `city` 本身是数字代码 > [`city::DEFAULT_CITY_CODE`]
/// 3. 请求头缺失时只带默认 UA
/// 4. 导航超时 30s，就绪超时 30s，网络空闲窗口 500ms，网络空闲最长等待与导航超时相同，
///    稳定等待 2s，选择器轮询 250ms
/// 5. 重试 3 次，间隔 5s
///
/// 超时为 0、重试次数为 0、选择器为空时返回错误
pub fn resolve_config(partial: PartialRunConfig) -> Result<RunConfig, ConfigError> {
    let query = partial
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let location_code = match (partial.city_code, partial.city) {
        (Some(code), _) if !code.trim().is_empty() => code.trim().to_string(),
        (_, Some(name)) => match city::code_for_name(&name) {
            Some(code) => code.to_string(),
            None if city::looks_like_code(name.trim()) => name.trim().to_string(),
            None => city::DEFAULT_CITY_CODE.to_string(),
        },
        _ => city::DEFAULT_CITY_CODE.to_string(),
    };

    let target_url = partial
        .target_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());
    url::Url::parse(&target_url).map_err(|e| ConfigError::Invalid {
        field: "target_url",
        reason: e.to_string(),
    })?;

    let headers = partial.headers.unwrap_or_else(|| {
        BTreeMap::from([("user-agent".to_string(), DEFAULT_USER_AGENT.to_string())])
    });

    let navigation_timeout = positive_ms("navigation_timeout_ms", partial.navigation_timeout_ms, 30_000)?;
    let readiness_timeout = positive_ms("readiness_timeout_ms", partial.readiness_timeout_ms, 30_000)?;
    let network_idle_quiet = positive_ms("network_idle_quiet_ms", partial.network_idle_quiet_ms, 500)?;
    let network_idle_timeout = match partial.network_idle_timeout_ms {
        Some(ms) => positive_ms("network_idle_timeout_ms", Some(ms), ms)?,
        None => navigation_timeout,
    };
    let settle_delay = Duration::from_millis(partial.settle_delay_ms.unwrap_or(2_000));
    let selector_poll_interval = positive_ms("selector_poll_ms", partial.selector_poll_ms, 250)?;

    let max_attempts = partial.max_attempts.unwrap_or(3);
    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            field: "max_attempts",
            reason: "至少需要尝试 1 次".to_string(),
        });
    }
    let retry = RetrySettings {
        max_attempts,
        backoff_base: Duration::from_millis(partial.backoff_base_ms.unwrap_or(5_000)),
    };

    let defaults = BrowserSettings::default();
    let browser = BrowserSettings {
        headless: partial.headless.unwrap_or(defaults.headless),
        chrome_executable: partial.chrome_executable,
        viewport_width: partial.viewport_width.unwrap_or(defaults.viewport_width),
        viewport_height: partial.viewport_height.unwrap_or(defaults.viewport_height),
        ignore_https_errors: partial.ignore_https_errors.unwrap_or(defaults.ignore_https_errors),
        bypass_csp: partial.bypass_csp.unwrap_or(defaults.bypass_csp),
    };

    let selectors = partial.selectors.unwrap_or_default();
    for (field, value) in [("selectors.container", &selectors.container), ("selectors.item", &selectors.item)] {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field,
                reason: "选择器不能为空".to_string(),
            });
        }
    }

    Ok(RunConfig {
        query,
        location_code,
        target_url,
        headers,
        navigation_timeout,
        readiness_timeout,
        network_idle_quiet,
        network_idle_timeout,
        settle_delay,
        selector_poll_interval,
        retry,
        browser,
        selectors,
    })
}

fn positive_ms(field: &'static str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::Invalid {
            field,
            reason: "超时时间必须大于 0".to_string(),
        }),
        ms => Ok(Duration::from_millis(ms)),
    }
}

fn require_env(var_name: &str) -> Result<String, ConfigError> {
    env_string(var_name).ok_or_else(|| ConfigError::EnvVarNotFound {
        var_name: var_name.to_string(),
    })
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value,
            expected_type: std::any::type_name::<T>().to_string(),
        }),
    }
}
