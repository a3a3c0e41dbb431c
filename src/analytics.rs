use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{JobError, Result};
use crate::transform::ViewRow;

const DATA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta/";
const END_DATE: &str = "yesterday";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub date_ranges: Vec<DateRange>,
    pub dimensions: Vec<Named>,
    pub metrics: Vec<Named>,
    pub dimension_filter: FilterExpression,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterExpression {
    pub filter: Filter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field_name: String,
    pub string_filter: StringFilter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    pub match_type: String,
    pub value: String,
}

impl ReportRequest {
    /// Monthly page views for every page under `path_prefix`, from `start`
    /// through yesterday.
    pub fn monthly_views(start: NaiveDate, path_prefix: &str, limit: u64) -> Self {
        Self {
            date_ranges: vec![DateRange {
                start_date: start.format("%Y-%m-%d").to_string(),
                end_date: END_DATE.to_string(),
            }],
            dimensions: vec![named("yearMonth"), named("pagePath")],
            metrics: vec![named("screenPageViews")],
            dimension_filter: FilterExpression {
                filter: Filter {
                    field_name: "pagePath".to_string(),
                    string_filter: StringFilter {
                        match_type: "BEGINS_WITH".to_string(),
                        value: path_prefix.to_string(),
                    },
                },
            },
            limit,
            offset: 0,
        }
    }
}

fn named(name: &str) -> Named {
    Named {
        name: name.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub row_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: Vec<CellValue>,
    #[serde(default)]
    pub metric_values: Vec<CellValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CellValue {
    #[serde(default)]
    pub value: Option<String>,
}

#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn run_report(&self, property: &str, request: &ReportRequest) -> Result<ReportResponse>;
}

/// GA4 Data API client authorised with a bearer token.
pub struct Ga4Client {
    client: Client,
    base: Url,
    token: String,
}

impl Ga4Client {
    pub fn new(token: String) -> Result<Self> {
        let base = Url::parse(DATA_API_BASE).map_err(|e| JobError::collaborator("analytics", e))?;
        let client = Client::builder()
            .user_agent(concat!("pageview_report/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JobError::collaborator("analytics", e))?;
        Ok(Self { client, base, token })
    }
}

#[async_trait]
impl ReportSource for Ga4Client {
    async fn run_report(&self, property: &str, request: &ReportRequest) -> Result<ReportResponse> {
        let url = self
            .base
            .join(&format!("properties/{property}:runReport"))
            .map_err(|e| JobError::collaborator("analytics", e))?;
        debug!("POST {} (offset {})", url, request.offset);

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| JobError::collaborator("analytics", e))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| JobError::collaborator("analytics", e))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(JobError::collaborator(
                "analytics",
                format!("status {status} body {text}"),
            ));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| JobError::collaborator("analytics", format!("failed to parse body: {e}")))
    }
}

/// Turns a page path such as `/articles/my-post/` into `my-post`.
pub struct SlugExtractor {
    prefix: Regex,
}

impl SlugExtractor {
    pub fn new(path_prefix: &str) -> Result<Self> {
        let prefix = Regex::new(&format!("^{}", regex::escape(path_prefix)))
            .map_err(|e| JobError::Config(format!("invalid path prefix {path_prefix:?}: {e}")))?;
        Ok(Self { prefix })
    }

    pub fn slug(&self, page_path: &str) -> String {
        let rest = self.prefix.replace(page_path, "");
        rest.strip_suffix('/').unwrap_or(&*rest).to_string()
    }
}

fn to_view_row(row: ReportRow, slugs: &SlugExtractor) -> ViewRow {
    let mut dims = row.dimension_values.into_iter().map(|c| c.value.unwrap_or_default());
    let year_month = dims.next().unwrap_or_default();
    let path = dims.next().unwrap_or_default();
    let views = row
        .metric_values
        .into_iter()
        .next()
        .and_then(|c| c.value)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    ViewRow {
        year_month,
        slug: slugs.slug(&path),
        views,
    }
}

/// Fetch every (month, page) view count under `path_prefix`. Normally one
/// request; further pages are requested with `offset` only when the reported
/// row count exceeds what has been received.
pub async fn fetch_monthly_views<S>(
    source: &S,
    property: &str,
    start: NaiveDate,
    path_prefix: &str,
    row_limit: u64,
) -> Result<Vec<ViewRow>>
where
    S: ReportSource + ?Sized,
{
    let slugs = SlugExtractor::new(path_prefix)?;
    let mut request = ReportRequest::monthly_views(start, path_prefix, row_limit);
    let mut rows = Vec::new();

    loop {
        let page = source.run_report(property, &request).await?;
        let received = page.rows.len() as u64;
        rows.extend(page.rows.into_iter().map(|r| to_view_row(r, &slugs)));
        request.offset += received;

        if received == 0 || request.offset >= page.row_count {
            break;
        }
        info!(
            "Report has {} rows, fetched {} so far; requesting next page",
            page.row_count, request.offset
        );
    }

    info!("Fetched {} monthly view rows", rows.len());
    Ok(rows)
}
