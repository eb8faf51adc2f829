use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{RecordStatus, ResultRecord};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 500;

/// Server-side filters for `GET /results`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuery {
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
}

impl ResultQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let fields = [
            ("classId", self.class_id.as_deref()),
            ("subjectId", self.subject_id.as_deref()),
            ("term", self.term.as_deref()),
            ("examType", self.exam_type.as_deref()),
            ("status", self.status.map(RecordStatus::as_str)),
        ];
        for (key, value) in fields {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                out.push((key, v.to_string()));
            }
        }
        out
    }
}

/// Client-side paging and search over the last fetched list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            search: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<'a> {
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub matched: usize,
    pub records: Vec<&'a ResultRecord>,
}

impl Page<'_> {
    pub fn eligible_ids(&self) -> HashSet<String> {
        self.records
            .iter()
            .filter(|r| r.is_publishable())
            .map(|r| r.id.clone())
            .collect()
    }
}

fn matches_search(r: &ResultRecord, needle: &str) -> bool {
    if r.student_id.to_lowercase().contains(needle) {
        return true;
    }
    r.student_name
        .as_deref()
        .map(|n| n.to_lowercase().contains(needle))
        .unwrap_or(false)
}

pub fn paginate<'a>(records: &'a [ResultRecord], view: &ViewState) -> Page<'a> {
    let page_size = view.page_size.clamp(1, MAX_PAGE_SIZE);
    let needle = view
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let matched: Vec<&ResultRecord> = match needle.as_deref() {
        Some(n) => records.iter().filter(|r| matches_search(r, n)).collect(),
        None => records.iter().collect(),
    };

    let page_count = matched.len().div_ceil(page_size).max(1);
    let page = view.page.clamp(1, page_count);
    let start = (page - 1) * page_size;
    let records: Vec<&ResultRecord> = matched.iter().skip(start).take(page_size).copied().collect();

    Page {
        page,
        page_size,
        page_count,
        matched: matched.len(),
        records,
    }
}
