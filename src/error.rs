use thiserror::Error;

/// Every way a report run can fail. All of them abort the run.
#[derive(Debug, Error)]
pub enum JobError {
    /// A required setting is absent or a value is malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The credential blob could not be parsed or exchanged for a token.
    #[error("credential error: {0}")]
    Credentials(String),

    /// The CMS answered a page request with a non-success status.
    #[error("metadata fetch failed with status {status}: {body}")]
    MetadataFetch { status: u16, body: String },

    /// A CMS page did not match the expected listing schema.
    #[error("metadata response did not match the listing schema: {0}")]
    MetadataSchema(#[source] serde_json::Error),

    /// Pagination finished without yielding a single content item.
    #[error("no posts found in the content listing")]
    EmptyMetadata,

    /// A spreadsheet, analytics or transport call failed.
    #[error("{api} call failed: {message}")]
    Collaborator { api: &'static str, message: String },

    /// Writing a local CSV snapshot failed.
    #[error("csv export failed: {0}")]
    Export(String),
}

impl JobError {
    pub fn collaborator(api: &'static str, err: impl std::fmt::Display) -> Self {
        JobError::Collaborator {
            api,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_fetch_message_carries_status_and_body() {
        let err = JobError::MetadataFetch {
            status: 401,
            body: r#"{"message":"X-MICROCMS-API-KEY header is invalid."}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("header is invalid"));
    }

    #[test]
    fn collaborator_names_the_api() {
        let err = JobError::collaborator("sheets", "quota exceeded");
        assert_eq!(err.to_string(), "sheets call failed: quota exceeded");
    }
}
