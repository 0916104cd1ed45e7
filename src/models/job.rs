use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条职位记录
///
/// 所有字段都可能缺失：页面没有对应元素时记为 `None`，不做任何补全
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub title: Option<String>,
    pub organization: Option<String>,
    pub compensation: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub detail_url: Option<String>,
}

/// 一次运行抽取出的有序结果集
///
/// 构造后不可变，只能以共享引用交给发布器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: Vec<JobRecord>,
}

impl ResultSet {
    pub fn new(records: Vec<JobRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<JobRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = JobRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// 上传成功后的产物信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    /// 存储键，例如 `jobs_1700000000000.json`
    pub name: String,
    /// 公开访问地址
    pub url: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_missing_fields_as_null() {
        let record = JobRecord {
            title: Some("前端开发工程师".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["title"], "前端开发工程师");
        assert!(json["organization"].is_null());
        assert!(json["detailUrl"].is_null());
        assert_eq!(json["tags"], serde_json::json!([]));
    }

    #[test]
    fn test_result_set_serializes_as_plain_array() {
        let set: ResultSet = vec![JobRecord::default(), JobRecord::default()]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&set).unwrap();

        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 2);
    }
}
