use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("prompt error: {0}")]
    Prompt(#[from] inquire::InquireError),

    /* a binary we shell out to is not installed */
    #[error("`{0}` was not found in PATH")]
    ToolMissing(String),

    /* the vault CLI or its daemon reported a failure */
    #[error("vault error: {0}")]
    Vault(String),

    /* more than one vault item matched and nobody picked one */
    #[error("{} vault items are named '{name}': {}", candidates.len(), candidates.join(", "))]
    Ambiguous { name: String, candidates: Vec<String> },

    /* a bounded wait ran out of attempts */
    #[error("gave up waiting for {0}")]
    Unavailable(String),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error("restore failed: {0}")]
    RestoreFailed(String),

    #[error("identity provider error: {0}")]
    Identity(String),

    #[error("`{0}`")]
    Other(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
	Error::Config(Box::new(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
