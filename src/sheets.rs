use async_trait::async_trait;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, ClearValuesRequest, Request, SheetProperties,
    ValueRange,
};
use google_sheets4::{hyper, hyper_rustls, Sheets};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{JobError, Result};

pub type HttpsConnector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

/// The four spreadsheet calls the report writer needs.
#[async_trait]
pub trait SpreadsheetApi: Send + Sync {
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>>;

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<()>;

    async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> Result<()>;

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<()>;
}

pub struct GoogleSheets {
    hub: Sheets<HttpsConnector>,
}

impl GoogleSheets {
    pub fn new(hub: Sheets<HttpsConnector>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl SpreadsheetApi for GoogleSheets {
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(spreadsheet_id)
            .doit()
            .await
            .map_err(|e| JobError::collaborator("sheets", e))?;

        Ok(spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.properties.and_then(|p| p.title))
            .collect())
    }

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let req = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                add_sheet: Some(AddSheetRequest {
                    properties: Some(SheetProperties {
                        title: Some(title.to_string()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .batch_update(req, spreadsheet_id)
            .doit()
            .await
            .map_err(|e| JobError::collaborator("sheets", e))?;
        Ok(())
    }

    async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> Result<()> {
        self.hub
            .spreadsheets()
            .values_clear(ClearValuesRequest::default(), spreadsheet_id, range)
            .doit()
            .await
            .map_err(|e| JobError::collaborator("sheets", e))?;
        Ok(())
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<()> {
        let body = ValueRange {
            values: Some(rows),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .values_update(body, spreadsheet_id, range)
            .value_input_option("RAW")
            .doit()
            .await
            .map_err(|e| JobError::collaborator("sheets", e))?;
        Ok(())
    }
}

/// Range covering every column a report may occupy.
pub fn clear_range_ref(sheet: &str) -> String {
    format!("{}!A:Z", quote_sheet_name(sheet))
}

pub fn anchor_range_ref(sheet: &str) -> String {
    format!("{}!A1", quote_sheet_name(sheet))
}

// A1 notation needs quotes around names that are not plain identifiers.
fn quote_sheet_name(sheet: &str) -> String {
    if !sheet.is_empty() && sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Make sure `sheet` exists, clear `A:Z`, then write the header followed by
/// `rows` starting at `A1`. Returns the number of body rows written.
pub async fn write_sheet<A>(
    api: &A,
    spreadsheet_id: &str,
    sheet: &str,
    header: Vec<Value>,
    rows: Vec<Vec<Value>>,
) -> Result<usize>
where
    A: SpreadsheetApi + ?Sized,
{
    let titles = api.sheet_titles(spreadsheet_id).await?;
    if titles.iter().any(|t| t == sheet) {
        debug!("Sheet {} already exists", sheet);
    } else {
        info!("Creating sheet {}", sheet);
        api.add_sheet(spreadsheet_id, sheet).await?;
    }

    api.clear_range(spreadsheet_id, &clear_range_ref(sheet)).await?;

    let count = rows.len();
    let mut values = Vec::with_capacity(count + 1);
    values.push(header);
    values.extend(rows);
    api.write_values(spreadsheet_id, &anchor_range_ref(sheet), values)
        .await?;

    debug!("Wrote {} rows to {}", count, sheet);
    Ok(count)
}
