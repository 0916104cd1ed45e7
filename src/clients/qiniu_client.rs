/// 七牛云对象存储客户端
///
/// 负责签发上传凭证、检查存储空间以及表单上传
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::{debug, warn};
use url::Url;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult, StorageError};
use crate::services::publisher::{StorageBackend, StoredObject, WriteGrant};
use crate::utils::truncate_text;

type HmacSha1 = Hmac<Sha1>;

/// 目标文件已存在
pub const STATUS_FILE_EXISTS: u16 = 614;

const RETURN_BODY: &str = r#"{"key":"$(key)","hash":"$(etag)","fsize":$(fsize),"bucket":"$(bucket)"}"#;

/// 上传策略
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutPolicy {
    pub scope: String,
    pub deadline: i64,
    pub return_body: String,
}

impl PutPolicy {
    pub fn for_key(bucket: &str, key: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            scope: format!("{}:{}", bucket, key),
            deadline: expires_at.timestamp(),
            return_body: RETURN_BODY.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    key: Option<String>,
    fsize: Option<u64>,
}

/// 七牛云客户端
pub struct QiniuClient {
    http: reqwest::Client,
    config: StorageConfig,
}

impl QiniuClient {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn bucket_info_url(&self) -> AppResult<Url> {
        let endpoint = format!("{}/v2/bucketInfo", self.config.uc_host.trim_end_matches('/'));
        Url::parse_with_params(&endpoint, &[("bucket", self.config.bucket.as_str())])
            .map_err(|e| AppError::backend_unavailable(&self.config.bucket, e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for QiniuClient {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn public_domain(&self) -> &str {
        &self.config.domain
    }

    async fn check_bucket(&self) -> AppResult<()> {
        let url = self.bucket_info_url()?;
        let signed_path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let token = management_token(&self.config.access_key, &self.config.secret_key, &signed_path)?;

        debug!("检查存储空间: {}", url);
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("QBox {}", token))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| AppError::backend_unavailable(&self.config.bucket, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(AppError::backend_unavailable(
            &self.config.bucket,
            format!("状态码 {}: {}", status.as_u16(), truncate_text(&body, 200)),
        ))
    }

    async fn authorize_write(&self, key: &str) -> AppResult<WriteGrant> {
        let ttl = chrono::Duration::from_std(self.config.token_ttl)
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        let expires_at = Utc::now() + ttl;
        let policy = PutPolicy::for_key(&self.config.bucket, key, expires_at);
        let token = upload_token(&self.config.access_key, &self.config.secret_key, &policy)?;
        Ok(WriteGrant { token, expires_at })
    }

    async fn put_object(&self, grant: &WriteGrant, key: &str, payload: Vec<u8>) -> AppResult<StoredObject> {
        let file_part = multipart::Part::bytes(payload)
            .file_name(key.to_string())
            .mime_str("application/json")
            .map_err(|e| AppError::upload_failed(None, format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("token", grant.token.clone())
            .text("key", key.to_string())
            .part("file", file_part);

        debug!("上传 {} 到 {}", key, self.config.upload_host);
        let response = self
            .http
            .post(&self.config.upload_host)
            .multipart(form)
            .timeout(self.config.upload_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::upload_failed(
                        None,
                        format!("上传超时 ({} ms)", self.config.upload_timeout.as_millis()),
                    )
                } else {
                    AppError::upload_failed(None, e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::upload_failed(Some(status), e.to_string()))?;

        interpret_upload_response(status, &body, key)
    }
}

/// 解释上传接口的响应
///
/// 614 表示同名文件已存在，按成功处理
pub fn interpret_upload_response(status: u16, body: &str, key: &str) -> AppResult<StoredObject> {
    match status {
        200 => {
            let reply: Option<UploadReply> = serde_json::from_str(body).ok();
            let (stored_key, size) = match reply {
                Some(r) => (r.key.unwrap_or_else(|| key.to_string()), r.fsize),
                None => (key.to_string(), None),
            };
            Ok(StoredObject {
                key: stored_key,
                size_bytes: size,
            })
        }
        STATUS_FILE_EXISTS => {
            warn!("文件 {} 已存在，视为上传成功", key);
            Ok(StoredObject {
                key: key.to_string(),
                size_bytes: None,
            })
        }
        _ => Err(AppError::upload_failed(Some(status), body)),
    }
}

fn sign(secret_key: &str, data: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
        .map_err(|e| StorageError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// 上传凭证：`ak:sign(encodedPolicy):encodedPolicy`
pub fn upload_token(access_key: &str, secret_key: &str, policy: &PutPolicy) -> AppResult<String> {
    let json = serde_json::to_vec(policy).map_err(StorageError::from)?;
    let encoded_policy = URL_SAFE.encode(json);
    let signature = sign(secret_key, encoded_policy.as_bytes())?;
    Ok(format!("{}:{}:{}", access_key, signature, encoded_policy))
}

/// 管理凭证：对 `path?query\n` 签名，请求体为空
pub fn management_token(access_key: &str, secret_key: &str, path_and_query: &str) -> AppResult<String> {
    let signing = format!("{}\n", path_and_query);
    let signature = sign(secret_key, signing.as_bytes())?;
    Ok(format!("{}:{}", access_key, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Retryable};
    use chrono::TimeZone;
    use tokio::net::TcpListener;

    fn storage_config(upload_host: String, upload_timeout: Duration) -> StorageConfig {
        StorageConfig {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            bucket: "jobs".to_string(),
            domain: "cdn.example.com".to_string(),
            upload_host,
            uc_host: "http://127.0.0.1:9".to_string(),
            token_ttl: Duration::from_secs(3600),
            upload_timeout,
            staging_dir: None,
        }
    }

    #[test]
    fn test_put_policy_scope_and_deadline() {
        let expires = Utc.timestamp_opt(1_700_003_600, 0).unwrap();
        let policy = PutPolicy::for_key("jobs", "jobs_1.json", expires);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["scope"], "jobs:jobs_1.json");
        assert_eq!(json["deadline"], 1_700_003_600);
        assert!(json["returnBody"].as_str().unwrap().contains("$(key)"));
    }

    #[test]
    fn test_upload_token_layout() {
        let expires = Utc.timestamp_opt(1_700_003_600, 0).unwrap();
        let policy = PutPolicy::for_key("jobs", "jobs_1.json", expires);

        let token = upload_token("ak", "sk", &policy).unwrap();
        let parts: Vec<&str> = token.split(':').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ak");
        // SHA1 摘要 20 字节，base64 后 28 个字符
        assert_eq!(parts[1].len(), 28);
        let decoded = URL_SAFE.decode(parts[2]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["scope"], "jobs:jobs_1.json");
    }

    #[test]
    fn test_management_token_is_deterministic() {
        let a = management_token("ak", "sk", "/v2/bucketInfo?bucket=jobs").unwrap();
        let b = management_token("ak", "sk", "/v2/bucketInfo?bucket=jobs").unwrap();
        let c = management_token("ak", "other", "/v2/bucketInfo?bucket=jobs").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("ak:"));
    }

    #[test]
    fn test_upload_success_reads_reply() {
        let body = r#"{"key":"jobs_1.json","hash":"Fh","fsize":42,"bucket":"jobs"}"#;
        let stored = interpret_upload_response(200, body, "jobs_1.json").unwrap();
        assert_eq!(stored.key, "jobs_1.json");
        assert_eq!(stored.size_bytes, Some(42));
    }

    #[test]
    fn test_file_exists_counts_as_success() {
        let stored = interpret_upload_response(614, r#"{"error":"file exists"}"#, "jobs_1.json").unwrap();
        assert_eq!(stored.key, "jobs_1.json");
        assert_eq!(stored.size_bytes, None);
    }

    #[test]
    fn test_rejected_upload_keeps_status_and_body() {
        let err = interpret_upload_response(401, "bad token", "jobs_1.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upload);
        match err {
            AppError::Storage(StorageError::UploadFailed { status, body }) => {
                assert_eq!(status, Some(401));
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_upload_times_out_as_retryable() {
        // 只接受连接，从不回应
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = QiniuClient::new(storage_config(
            format!("http://{}", addr),
            Duration::from_millis(200),
        ));
        let grant = client.authorize_write("jobs_1.json").await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.put_object(&grant, "jobs_1.json", b"[]".to_vec()),
        )
        .await
        .expect("上传应该在自身超时内返回");
        server.abort();

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert!(err.is_retryable());
        match err {
            AppError::Storage(StorageError::UploadFailed { status, .. }) => assert_eq!(status, None),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
