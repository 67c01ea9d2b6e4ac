use std::path::PathBuf;

/// Error kinds raised by snapjaw operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("addons directory not found")]
    AddonsDirNotFound,

    #[error("invalid directory path: {0}")]
    InvalidDirectory(PathBuf),

    #[error("unknown addon: {0}")]
    UnknownAddon(String),

    #[error("requested branch {requested}, but found branch {found} in repository URL")]
    BranchMismatch { requested: String, found: String },

    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Git(String),

    #[error("unable to guess encoding of {0}")]
    Encoding(PathBuf),

    #[error("invalid addon name: {0:?}")]
    InvalidAddonName(String),

    #[error("no vanilla addons found")]
    NoAddonsFound,

    #[error("directory \"{0}\" not found")]
    DirectoryNotFound(PathBuf),

    #[error("invalid signature version: {0}")]
    InvalidSignatureVersion(u32),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors reported to the user as `error: <message>` with exit code 1.
    /// Everything else is an internal failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::AddonsDirNotFound
                | Error::InvalidDirectory(_)
                | Error::UnknownAddon(_)
                | Error::BranchMismatch { .. }
                | Error::InvalidUrl(_)
                | Error::Git(_)
                | Error::Encoding(_)
                | Error::InvalidAddonName(_)
                | Error::NoAddonsFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

/// Find the first snapjaw error in an error chain that should be shown to the user
pub fn user_facing(error: &anyhow::Error) -> Option<&Error> {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .find(|e| e.is_user_facing())
}
