//! 职位抽取服务 - 业务能力层
//!
//! 按字段映射（CSS 选择器）把渲染后的文档转成职位记录，不关心页面如何加载

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::FieldMapping;
use crate::error::{AppResult, ExtractionError};
use crate::models::{JobRecord, ResultSet};

/// 职位抽取器
pub struct Extractor {
    item: Selector,
    title: Selector,
    organization: Selector,
    compensation: Selector,
    location: Selector,
    tags: Selector,
    link: Selector,
    whitespace: Regex,
}

impl Extractor {
    /// 解析字段映射，任何一个选择器不合法都会失败
    pub fn new(mapping: &FieldMapping) -> AppResult<Self> {
        Ok(Self {
            item: parse_selector("item", &mapping.item)?,
            title: parse_selector("title", &mapping.title)?,
            organization: parse_selector("organization", &mapping.organization)?,
            compensation: parse_selector("compensation", &mapping.compensation)?,
            location: parse_selector("location", &mapping.location)?,
            tags: parse_selector("tags", &mapping.tags)?,
            link: parse_selector("link", &mapping.link)?,
            whitespace: Regex::new(r"\s+").map_err(|e| ExtractionError::InvalidSelector {
                field: "whitespace",
                selector: r"\s+".to_string(),
                reason: e.to_string(),
            })?,
        })
    }

    /// 从 HTML 中抽取结果集
    ///
    /// 按文档顺序遍历每个卡片，各字段独立解析：某个字段没有匹配时只有该字段为 `None`。
    /// 没有任何卡片时返回空结果集
    pub fn extract(&self, html: &str, page_url: Option<&str>) -> ResultSet {
        let document = Html::parse_document(html);
        let base = page_url.and_then(|u| Url::parse(u).ok());

        let records: ResultSet = document
            .select(&self.item)
            .map(|item| self.extract_record(item, base.as_ref()))
            .collect();

        debug!("抽取到 {} 条职位记录", records.len());
        records
    }

    fn extract_record(&self, item: ElementRef<'_>, base: Option<&Url>) -> JobRecord {
        JobRecord {
            title: self.first_text(item, &self.title),
            organization: self.first_text(item, &self.organization),
            compensation: self.first_text(item, &self.compensation),
            location: self.first_text(item, &self.location),
            tags: item
                .select(&self.tags)
                .map(|tag| self.text_of(tag))
                .collect(),
            detail_url: item
                .select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| resolve_href(href, base)),
        }
    }

    fn first_text(&self, item: ElementRef<'_>, selector: &Selector) -> Option<String> {
        item.select(selector).next().map(|el| self.text_of(el))
    }

    fn text_of(&self, element: ElementRef<'_>) -> String {
        let raw: String = element.text().collect();
        self.whitespace.replace_all(raw.trim(), " ").into_owned()
    }
}

fn parse_selector(field: &'static str, selector: &str) -> AppResult<Selector> {
    Selector::parse(selector).map_err(|e| {
        ExtractionError::InvalidSelector {
            field,
            selector: selector.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// 相对链接按页面地址补全，无法补全时保留原值
fn resolve_href(href: &str, base: Option<&Url>) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://www.zhipin.com/web/geek/job?query=rust";

    fn card(title: Option<&str>, company: &str, tags: &[&str]) -> String {
        let title = title
            .map(|t| format!(r#"<span class="job-name">{}</span>"#, t))
            .unwrap_or_default();
        let tags: String = tags.iter().map(|t| format!("<span>{}</span>", t)).collect();
        format!(
            r#"<li class="job-card-wrapper">
                <a href="/job_detail/abc.html">{}</a>
                <h3 class="company-name"> {} </h3>
                <span class="salary">15-25K</span>
                <span class="job-area">成都·高新区</span>
                <ul class="tag-list">{}</ul>
            </li>"#,
            title, company, tags
        )
    }

    fn page(cards: &[String]) -> String {
        format!(
            r#"<html><body><ul class="job-list-box">{}</ul></body></html>"#,
            cards.concat()
        )
    }

    fn extractor() -> Extractor {
        Extractor::new(&FieldMapping::default()).unwrap()
    }

    #[test]
    fn test_extracts_all_fields_in_document_order() {
        let html = page(&[
            card(Some("前端开发工程师"), "甲公司", &["Vue", "3-5年"]),
            card(Some("Rust 工程师"), "乙公司", &["Rust"]),
        ]);

        let set = extractor().extract(&html, Some(PAGE_URL));

        assert_eq!(set.len(), 2);
        let first = &set.records()[0];
        assert_eq!(first.title.as_deref(), Some("前端开发工程师"));
        assert_eq!(first.organization.as_deref(), Some("甲公司"));
        assert_eq!(first.compensation.as_deref(), Some("15-25K"));
        assert_eq!(first.location.as_deref(), Some("成都·高新区"));
        assert_eq!(first.tags, vec!["Vue", "3-5年"]);
        assert_eq!(
            first.detail_url.as_deref(),
            Some("https://www.zhipin.com/job_detail/abc.html")
        );
        assert_eq!(set.records()[1].title.as_deref(), Some("Rust 工程师"));
    }

    #[test]
    fn test_missing_field_keeps_record() {
        let html = page(&[
            card(Some("A"), "甲", &["x"]),
            card(None, "乙", &["y"]),
            card(Some("C"), "丙", &["z"]),
        ]);

        let set = extractor().extract(&html, Some(PAGE_URL));

        assert_eq!(set.len(), 3);
        let missing = &set.records()[1];
        assert_eq!(missing.title, None);
        assert_eq!(missing.organization.as_deref(), Some("乙"));
        assert_eq!(missing.compensation.as_deref(), Some("15-25K"));
        assert_eq!(missing.tags, vec!["y"]);
        assert!(missing.detail_url.is_some());
    }

    #[test]
    fn test_no_tags_yields_empty_list() {
        let html = page(&[card(Some("A"), "甲", &[])]);

        let set = extractor().extract(&html, None);

        assert!(set.records()[0].tags.is_empty());
        // 没有页面地址时保留原始链接
        assert_eq!(
            set.records()[0].detail_url.as_deref(),
            Some("/job_detail/abc.html")
        );
    }

    #[test]
    fn test_no_items_is_empty_result() {
        let html = page(&[]);
        let set = extractor().extract(&html, Some(PAGE_URL));
        assert!(set.is_empty());
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        let html = page(&[card(Some("  高级\n   前端  "), "甲", &[])]);
        let set = extractor().extract(&html, None);
        assert_eq!(set.records()[0].title.as_deref(), Some("高级 前端"));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mapping = FieldMapping {
            title: "[[broken".to_string(),
            ..FieldMapping::default()
        };
        assert!(Extractor::new(&mapping).is_err());
    }
}
