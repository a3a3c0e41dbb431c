use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

/// Title and author of one CMS post, keyed by slug in [`MetaMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMeta {
    pub title: String,
    pub author: String,
}

pub type MetaMap = HashMap<String, ContentMeta>;

/// Views of one page in one month, as reported by analytics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub year_month: String,
    pub slug: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogRow {
    pub slug: String,
    pub title: String,
    pub author: String,
    pub month: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRow {
    pub author: String,
    pub month: String,
    pub views: u64,
}

/// A row that can be rendered as one line of an output table.
pub trait TableRow {
    fn headers() -> &'static [&'static str];

    fn to_cells(&self) -> Vec<Value>;

    fn to_csv_row(&self) -> Vec<String> {
        self.to_cells()
            .into_iter()
            .map(|cell| match cell {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()
    }
}

impl TableRow for BlogRow {
    fn headers() -> &'static [&'static str] {
        &["slug", "title", "author", "month", "views"]
    }

    fn to_cells(&self) -> Vec<Value> {
        vec![
            Value::from(self.slug.as_str()),
            Value::from(self.title.as_str()),
            Value::from(self.author.as_str()),
            Value::from(self.month.as_str()),
            Value::from(self.views),
        ]
    }
}

impl TableRow for AuthorRow {
    fn headers() -> &'static [&'static str] {
        &["author", "month", "views"]
    }

    fn to_cells(&self) -> Vec<Value> {
        vec![
            Value::from(self.author.as_str()),
            Value::from(self.month.as_str()),
            Value::from(self.views),
        ]
    }
}

/// `"202501"` becomes `"2025-01"`. Anything that is not exactly six ASCII
/// digits is returned unchanged.
pub fn month_label(year_month: &str) -> String {
    if year_month.len() == 6 && year_month.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}", &year_month[..4], &year_month[4..])
    } else {
        year_month.to_string()
    }
}

/// One row per matched (slug, month), sorted by slug then month.
/// View rows whose slug has no metadata are dropped.
pub fn build_blog_rows(meta: &MetaMap, views: &[ViewRow]) -> Vec<BlogRow> {
    let mut rows: Vec<BlogRow> = views
        .iter()
        .filter_map(|v| {
            let m = meta.get(&v.slug)?;
            Some(BlogRow {
                slug: v.slug.clone(),
                title: m.title.clone(),
                author: m.author.clone(),
                month: month_label(&v.year_month),
                views: v.views,
            })
        })
        .collect();

    let dropped = views.len() - rows.len();
    if dropped > 0 {
        debug!("Dropped {} view rows without metadata", dropped);
    }

    rows.sort_by(|a, b| a.slug.cmp(&b.slug).then_with(|| a.month.cmp(&b.month)));
    rows
}

/// Views summed per (author, month) over matched slugs, sorted by author then
/// month. An empty author is reported as `"unknown"`.
pub fn build_author_rows(meta: &MetaMap, views: &[ViewRow]) -> Vec<AuthorRow> {
    let mut totals: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for v in views {
        let Some(m) = meta.get(&v.slug) else {
            continue;
        };
        let author = if m.author.is_empty() {
            "unknown"
        } else {
            m.author.as_str()
        };
        *totals.entry((author, v.year_month.as_str())).or_insert(0) += v.views;
    }

    let mut rows: Vec<AuthorRow> = totals
        .into_iter()
        .map(|((author, ym), views)| AuthorRow {
            author: author.to_string(),
            month: month_label(ym),
            views,
        })
        .collect();

    // Labels, not raw year-months, are the documented sort key.
    rows.sort_by(|a, b| a.author.cmp(&b.author).then_with(|| a.month.cmp(&b.month)));
    rows
}

/// Header followed by every row, ready for a spreadsheet write.
pub fn to_table<R: TableRow>(rows: &[R]) -> (Vec<Value>, Vec<Vec<Value>>) {
    let header = R::headers().iter().map(|h| Value::from(*h)).collect();
    let body = rows.iter().map(TableRow::to_cells).collect();
    (header, body)
}
