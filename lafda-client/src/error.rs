use crate::api;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] api::Error),

    #[error("Could not reach the server: {0}")]
    Transport(String),

    #[error("Could not decode the server response: {0}")]
    Decode(String),
}

impl Error {
    pub fn permission_denied() -> Error {
        Error::Api(api::Error::PermissionDenied)
    }

    pub fn not_found(id: api::Uuid) -> Error {
        Error::Api(api::Error::NotFound(id))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        match err.is_decode() {
            true => Error::Decode(err.to_string()),
            false => Error::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Decode(err.to_string())
    }
}
