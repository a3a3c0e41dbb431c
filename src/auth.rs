use google_sheets4::{hyper, hyper_rustls, Sheets};
use tracing::{debug, info};

use crate::analytics::Ga4Client;
use crate::cfg::Cfg;
use crate::cms::MicroCmsClient;
use crate::error::{JobError, Result};
use crate::sheets::GoogleSheets;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const ANALYTICS_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// The three collaborators a run talks to, owned by the job.
pub struct Clients {
    pub sheets: GoogleSheets,
    pub analytics: Ga4Client,
    pub cms: MicroCmsClient,
}

/// Exchange the service account blob for one access token covering both
/// Google scopes and build every client from it.
pub async fn connect(cfg: &Cfg) -> Result<Clients> {
    info!("Initializing Google authentication");

    let token = service_account_token(&cfg.credentials).await?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| JobError::Credentials(format!("failed to load native TLS roots: {e}")))?
        .https_only()
        .enable_http1()
        .build();
    let hub = Sheets::new(hyper::Client::builder().build(https), token.clone());

    Ok(Clients {
        sheets: GoogleSheets::new(hub),
        analytics: Ga4Client::new(token)?,
        cms: MicroCmsClient::new(&cfg.cms)?,
    })
}

async fn service_account_token(credentials: &str) -> Result<String> {
    let key = yup_oauth2::parse_service_account_key(credentials).map_err(|e| {
        JobError::Credentials(format!("GOOGLE_CREDENTIALS is not a service account key: {e}"))
    })?;
    debug!("Using service account {}", key.client_email);

    let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| JobError::Credentials(format!("failed to build authenticator: {e}")))?;

    let token = auth
        .token(&[SHEETS_SCOPE, ANALYTICS_SCOPE])
        .await
        .map_err(|e| JobError::Credentials(format!("failed to obtain access token: {e}")))?;

    token
        .token()
        .map(str::to_string)
        .ok_or_else(|| JobError::Credentials("token endpoint returned no access token".to_string()))
}
