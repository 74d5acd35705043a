use chromiumoxide::error::CdpError;

/// Failure kinds the agent can surface. Interaction failures abort the run;
/// only the banner-dismissal step is allowed to swallow the two
/// element-absence variants.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("browser session is not initialized, open it before interacting")]
    NotInitialized,

    #[error("no element matching {0:?} was found on the page")]
    ElementNotFound(String),

    #[error("element matching {0:?} exists but is not visible")]
    ElementNotVisible(String),

    #[error("missing configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Automation(#[from] CdpError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// True for the variants that merely report an absent or hidden UI
    /// target, as opposed to a broken session or failed IO.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            AgentError::ElementNotFound(_) | AgentError::ElementNotVisible(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
