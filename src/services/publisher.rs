//! 结果发布服务 - 业务能力层
//!
//! 把结果集序列化为一个 JSON 文档，按时间戳命名后上传到存储后端，返回公开地址。
//! 上传本身由 `StorageBackend` 完成，这里只负责校验、命名、暂存和组装产物信息。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{AppResult, StorageError};
use crate::models::{PublishedArtifact, ResultSet};

/// 限定单个键、有时效的写入授权
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 后端确认写入的对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: Option<u64>,
}

/// 存储后端能力
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn bucket(&self) -> &str;

    /// 公开访问域名
    fn public_domain(&self) -> &str;

    /// 检查存储空间可达且凭证有效
    async fn check_bucket(&self) -> AppResult<()>;

    /// 为 `bucket:key` 申请写入授权
    async fn authorize_write(&self, key: &str) -> AppResult<WriteGrant>;

    /// 一次请求上传全部字节
    async fn put_object(&self, grant: &WriteGrant, key: &str, payload: Vec<u8>) -> AppResult<StoredObject>;
}

/// 已序列化、已命名、等待上传的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub key: String,
    pub payload: Vec<u8>,
    pub record_count: usize,
}

/// 按毫秒时间戳生成存储键，同一进程内保证递增
#[derive(Debug, Default)]
pub struct KeyNamer {
    last_millis: AtomicI64,
}

impl KeyNamer {
    pub fn next_key(&self, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis();
        let previous = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or(candidate - 1);
        format!("jobs_{}.json", candidate.max(previous + 1))
    }
}

/// 由域名和键拼出公开访问地址
pub fn public_url(domain: &str, key: &str) -> String {
    let domain = domain.trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        format!("{}/{}", domain, key)
    } else {
        format!("https://{}/{}", domain, key)
    }
}

/// 结果发布器
pub struct Publisher<B> {
    backend: B,
    staging_dir: Option<PathBuf>,
    namer: KeyNamer,
}

impl<B: StorageBackend> Publisher<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            staging_dir: None,
            namer: KeyNamer::default(),
        }
    }

    /// 上传前先把文件写入暂存目录，上传结束后删除
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 预检存储后端，应在打开浏览器之前调用
    pub async fn check_backend(&self) -> AppResult<()> {
        info!("正在检查存储空间 {} ...", self.backend.bucket());
        self.backend.check_bucket().await?;
        info!("存储空间配置检查通过");
        Ok(())
    }

    /// 校验、序列化并命名，不产生任何网络请求
    pub fn prepare(&self, result_set: &ResultSet) -> AppResult<PreparedUpload> {
        if result_set.is_empty() {
            return Err(StorageError::EmptyResult.into());
        }

        let payload = serde_json::to_vec_pretty(result_set).map_err(StorageError::from)?;
        let key = self.namer.next_key(Utc::now());
        debug!("准备上传数据文件: {} ({} 字节)", key, payload.len());

        Ok(PreparedUpload {
            key,
            payload,
            record_count: result_set.len(),
        })
    }

    /// 上传已准备好的结果，重复调用使用同一个键
    pub async fn upload(&self, prepared: &PreparedUpload) -> AppResult<PublishedArtifact> {
        let grant = self.backend.authorize_write(&prepared.key).await?;

        let stored = match &self.staging_dir {
            Some(dir) => {
                let staged = stage_payload(dir, &prepared.key, &prepared.payload).await?;
                let result = match tokio::fs::read(&staged).await {
                    Ok(bytes) => self.backend.put_object(&grant, &prepared.key, bytes).await,
                    Err(source) => Err(StorageError::Staging {
                        path: staged.display().to_string(),
                        source,
                    }
                    .into()),
                };
                remove_staged(&staged).await;
                result?
            }
            None => {
                self.backend
                    .put_object(&grant, &prepared.key, prepared.payload.clone())
                    .await?
            }
        };

        let artifact = PublishedArtifact {
            url: public_url(self.backend.public_domain(), &stored.key),
            name: stored.key,
            size_bytes: stored.size_bytes.unwrap_or(prepared.payload.len() as u64),
            created_at: Utc::now(),
        };
        info!("上传成功: {}", artifact.url);
        Ok(artifact)
    }

    /// 发布结果集：空结果直接拒绝
    pub async fn publish(&self, result_set: &ResultSet) -> AppResult<PublishedArtifact> {
        let prepared = self.prepare(result_set)?;
        self.upload(&prepared).await
    }
}

async fn stage_payload(dir: &Path, key: &str, payload: &[u8]) -> AppResult<PathBuf> {
    let path = dir.join(key);
    let staging_err = |source| StorageError::Staging {
        path: path.display().to_string(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(staging_err)?;
    if let Err(source) = tokio::fs::write(&path, payload).await {
        // 写了一半的文件不能留下
        remove_staged(&path).await;
        return Err(staging_err(source).into());
    }
    debug!("已写入暂存文件: {}", path.display());
    Ok(path)
}

/// 删除暂存文件，失败只记录
async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("清理暂存文件失败 {}: {}", path.display(), e);
    }
}
