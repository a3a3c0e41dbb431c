use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::cfg::CmsCfg;
use crate::error::{JobError, Result};
use crate::transform::{ContentMeta, MetaMap};

const API_KEY_HEADER: &str = "X-MICROCMS-API-KEY";
const LISTING_FIELDS: &str = "id,title,author";

/// One page of the content listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPage {
    pub contents: Vec<ContentItem>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<AuthorRef>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub name: Option<String>,
}

impl ContentItem {
    fn into_entry(self) -> (String, ContentMeta) {
        let author = self.author.and_then(|a| a.name).unwrap_or_default();
        (
            self.id,
            ContentMeta {
                title: self.title,
                author,
            },
        )
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<ContentPage>;
}

/// Listing client for a microCMS list API.
pub struct MicroCmsClient {
    client: Client,
    listing_url: Url,
    api_key: String,
}

impl MicroCmsClient {
    pub fn new(cfg: &CmsCfg) -> Result<Self> {
        let listing_url = cfg.base_url.join(&cfg.endpoint).map_err(|e| {
            JobError::Config(format!("invalid CMS endpoint {:?}: {e}", cfg.endpoint))
        })?;
        let client = Client::builder()
            .user_agent(concat!("pageview_report/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JobError::collaborator("cms", e))?;
        Ok(Self {
            client,
            listing_url,
            api_key: cfg.api_key.clone(),
        })
    }

    fn page_url(&self, offset: u64, limit: u32) -> Url {
        let mut url = self.listing_url.clone();
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("fields", LISTING_FIELDS);
        url
    }
}

#[async_trait]
impl ContentSource for MicroCmsClient {
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<ContentPage> {
        let url = self.page_url(offset, limit);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| JobError::collaborator("cms", e))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| JobError::collaborator("cms", e))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            error!("CMS fetch error: {}", status);
            return Err(JobError::MetadataFetch {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&bytes).map_err(JobError::MetadataSchema)
    }
}

/// Walk the listing page by page until the reported total is reached and
/// collect slug -> metadata. An empty result is an error.
pub async fn fetch_post_meta<S>(source: &S, page_size: u32) -> Result<MetaMap>
where
    S: ContentSource + ?Sized,
{
    let mut meta = MetaMap::new();
    let step = u64::from(page_size);
    let mut offset = 0u64;

    loop {
        let page = source.fetch_page(offset, page_size).await?;
        debug!(
            "Fetched {} items at offset {} (total {})",
            page.contents.len(),
            offset,
            page.total_count
        );
        meta.extend(page.contents.into_iter().map(ContentItem::into_entry));

        if offset + step >= page.total_count {
            break;
        }
        offset += step;
    }

    if meta.is_empty() {
        return Err(JobError::EmptyMetadata);
    }

    info!("Fetched metadata for {} posts", meta.len());
    Ok(meta)
}
