use std::collections::HashSet;

use reqwest::StatusCode;
use tokio::sync::RwLock;
use url::Url;

use super::error::{Error, Result};

/// External object-store existence check: "has object X been fully
/// transferred". The HTTP variant consults the real storage service; the
/// in-memory variant backs dev mode and tests, where objects are marked
/// present explicitly.
pub enum ExistenceChecker {
    Http {
        client: reqwest::Client,
        base_url: Url,
        default_token: Option<String>,
    },
    Fixed {
        present: RwLock<HashSet<String>>,
    },
}

impl ExistenceChecker {
    #[must_use]
    pub fn http(base_url: Url, default_token: Option<String>) -> Self {
        Self::Http {
            client: reqwest::Client::new(),
            base_url,
            default_token,
        }
    }

    #[must_use]
    pub fn fixed() -> Self {
        Self::Fixed {
            present: RwLock::new(HashSet::new()),
        }
    }

    /// Whether `object_id` exists in the store. A per-request access token
    /// takes precedence over the configured one.
    pub async fn is_present(&self, access_token: Option<&str>, object_id: &str) -> Result<bool> {
        match self {
            Self::Fixed { present } => Ok(present.read().await.contains(object_id)),
            Self::Http {
                client,
                base_url,
                default_token,
            } => {
                let url = base_url
                    .join(&format!("object/{object_id}"))
                    .map_err(|err| Error::StorageUnavailable {
                        message: err.to_string(),
                    })?;

                let mut request = client.get(url);
                if let Some(token) = access_token.or(default_token.as_deref()) {
                    request = request.bearer_auth(token);
                }

                let response = request.send().await.map_err(|err| Error::StorageUnavailable {
                    message: err.to_string(),
                })?;

                match response.status() {
                    StatusCode::OK => Ok(true),
                    StatusCode::NOT_FOUND => Ok(false),
                    status => Err(Error::StorageUnavailable {
                        message: format!("storage returned {status} for object {object_id}"),
                    }),
                }
            }
        }
    }

    /// Marks an object present on the in-memory variant.
    pub async fn mark_present(&self, object_id: &str) -> Result<()> {
        match self {
            Self::Fixed { present } => {
                present.write().await.insert(object_id.to_string());
                Ok(())
            }
            Self::Http { .. } => Err(Error::StorageUnavailable {
                message: "objects can only be marked present on the in-memory checker".to_string(),
            }),
        }
    }
}
