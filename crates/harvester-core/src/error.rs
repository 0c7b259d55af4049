use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("no CI descriptor in {0}")]
    DescriptorNotFound(String),

    #[error("scripts field is not a string or list of strings (found {0})")]
    ScriptShape(String),

    #[error("workspace sync failed: {0}")]
    WorkspaceSync(String),

    #[error("failed to run `{command}`: {source}")]
    Subprocess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("repository {0} has no source url")]
    MissingSource(String),

    #[error("cloning {name} failed: {detail}")]
    CloneFailed { name: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
