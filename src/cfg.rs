use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::args::Args;
use crate::error::{JobError, Result};

const DEFAULT_ENDPOINT: &str = "articles";
const DEFAULT_BASE_URL: &str = "https://{service}.microcms.io/api/v1/";
const DEFAULT_START_DATE: &str = "2024-08-01";
const DEFAULT_ROW_LIMIT: u64 = 100_000;
const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_BLOGS_SHEET: &str = "blogs";
const DEFAULT_AUTHORS_SHEET: &str = "authors";

/// Settings as they come out of the file and environment layers, before
/// required keys are checked. Keys match the lowercased environment names.
#[derive(Debug, Deserialize, Default)]
pub struct RawSettings {
    pub ga_property_id: Option<String>,
    pub google_credentials: Option<String>,
    pub microcms_service: Option<String>,
    pub microcms_api_key: Option<String>,
    pub microcms_endpoint: Option<String>,
    pub microcms_base_url: Option<String>,
    pub sheets_id: Option<String>,
    pub start_date: Option<String>,
    pub row_limit: Option<u64>,
    pub page_size: Option<u32>,
    pub blogs_sheet: Option<String>,
    pub authors_sheet: Option<String>,
}

#[derive(Clone)]
pub struct CmsCfg {
    pub service: String,
    pub api_key: String,
    pub endpoint: String,
    pub base_url: Url,
    pub page_size: u32,
}

#[derive(Clone)]
pub struct Cfg {
    pub property_id: String,
    pub credentials: String,
    pub cms: CmsCfg,
    pub sheet_id: String,
    pub start_date: NaiveDate,
    pub row_limit: u64,
    pub blogs_sheet: String,
    pub authors_sheet: String,
    pub dry_run: bool,
    pub csv_dir: Option<PathBuf>,
}

impl Cfg {
    /// Read `.env`, the optional config file and the process environment, then
    /// apply command line overrides. Fails before any network traffic if a
    /// required value is missing.
    pub fn load(args: Args) -> Result<Self> {
        if let Some(path) = optional_env_file(dotenvy::dotenv())? {
            debug!("Loaded environment from {}", path.display());
        }

        info!("Loading configuration from: {}", args.config);
        let raw = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(Environment::default())
            .build()
            .and_then(|c| c.try_deserialize::<RawSettings>())
            .map_err(|e| JobError::Config(e.to_string()))?;

        Self::resolve(raw, args)
    }

    pub fn resolve(mut raw: RawSettings, args: Args) -> Result<Self> {
        if let Some(sheet_id) = args.sheet_id {
            debug!("Overriding sheet_id from command line");
            raw.sheets_id = Some(sheet_id);
        }
        if let Some(property_id) = args.property_id {
            debug!("Overriding property_id from command line");
            raw.ga_property_id = Some(property_id);
        }

        let mut missing = Vec::new();
        let property_id = required(raw.ga_property_id, "GA_PROPERTY_ID", &mut missing);
        let credentials = required(raw.google_credentials, "GOOGLE_CREDENTIALS", &mut missing);
        let service = required(raw.microcms_service, "MICROCMS_SERVICE", &mut missing);
        let sheet_id = required(raw.sheets_id, "SHEETS_ID", &mut missing);
        if !missing.is_empty() {
            return Err(JobError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let endpoint = non_empty(raw.microcms_endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if endpoint.contains('/') {
            return Err(JobError::Config(format!(
                "MICROCMS_ENDPOINT must be a single path segment, got {endpoint:?}"
            )));
        }

        let base_template =
            non_empty(raw.microcms_base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_template.replace("{service}", &service))?;

        let start_date = raw
            .start_date
            .as_deref()
            .unwrap_or(DEFAULT_START_DATE);
        let start_date = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").map_err(|e| {
            JobError::Config(format!("START_DATE must be YYYY-MM-DD, got {start_date:?}: {e}"))
        })?;

        let row_limit = raw.row_limit.unwrap_or(DEFAULT_ROW_LIMIT);
        if row_limit == 0 {
            return Err(JobError::Config("ROW_LIMIT must be greater than 0".to_string()));
        }

        let page_size = raw.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(JobError::Config(format!(
                "PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }

        let blogs_sheet =
            non_empty(raw.blogs_sheet).unwrap_or_else(|| DEFAULT_BLOGS_SHEET.to_string());
        let authors_sheet =
            non_empty(raw.authors_sheet).unwrap_or_else(|| DEFAULT_AUTHORS_SHEET.to_string());
        if blogs_sheet == authors_sheet {
            return Err(JobError::Config(format!(
                "BLOGS_SHEET and AUTHORS_SHEET must differ, both are {blogs_sheet:?}"
            )));
        }

        let cfg = Cfg {
            property_id,
            credentials,
            cms: CmsCfg {
                service,
                api_key: raw.microcms_api_key.unwrap_or_default(),
                endpoint,
                base_url,
                page_size,
            },
            sheet_id,
            start_date,
            row_limit,
            blogs_sheet,
            authors_sheet,
            dry_run: args.dry_run,
            csv_dir: args.csv_dir.map(PathBuf::from),
        };

        debug!("Final configuration: {:?}", cfg);
        Ok(cfg)
    }

    /// Page path prefix shared by every article URL, e.g. `/articles/`.
    pub fn path_prefix(&self) -> String {
        format!("/{}/", self.cms.endpoint)
    }
}

/// A missing `.env` is fine. A malformed one is an error, since dotenvy stops
/// at the first bad line and the keys after it would silently go missing.
fn optional_env_file<T>(loaded: std::result::Result<T, dotenvy::Error>) -> Result<Option<T>> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(JobError::Config(format!("failed to parse .env file: {e}"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, key: &'static str, missing: &mut Vec<&'static str>) -> String {
    match non_empty(value) {
        Some(v) => v,
        None => {
            missing.push(key);
            String::new()
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    // Url::join drops the last segment unless the base ends with a slash.
    let raw = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&raw).map_err(|e| JobError::Config(format!("invalid CMS base URL {raw:?}: {e}")))
}

impl fmt::Debug for CmsCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsCfg")
            .field("service", &self.service)
            .field("api_key", &redacted(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("base_url", &self.base_url.as_str())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl fmt::Debug for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cfg")
            .field("property_id", &self.property_id)
            .field("credentials", &redacted(&self.credentials))
            .field("cms", &self.cms)
            .field("sheet_id", &self.sheet_id)
            .field("start_date", &self.start_date)
            .field("row_limit", &self.row_limit)
            .field("blogs_sheet", &self.blogs_sheet)
            .field("authors_sheet", &self.authors_sheet)
            .field("dry_run", &self.dry_run)
            .field("csv_dir", &self.csv_dir)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
