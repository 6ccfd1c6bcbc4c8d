use thiserror::Error;

use kirana_core::domain::sync::TargetService;
use kirana_db::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0} is not connected; complete the OAuth flow first")]
    AuthUnavailable(TargetService),
    #[error("{service} API returned {status}: {message}")]
    Api { service: TargetService, status: u16, message: String },
    #[error("{entity} `{id}` was not found locally")]
    MissingRecord { entity: &'static str, id: String },
    #[error("{service} response was not in the expected shape: {detail}")]
    UnexpectedResponse { service: TargetService, detail: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
