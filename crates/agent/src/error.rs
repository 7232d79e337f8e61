use thiserror::Error;
use viewdeck_protocol::PresenceAction;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {error}")]
    Rejected { status: u16, error: String },

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("server reported failure for {0}")]
    Unsuccessful(PresenceAction),

    #[error("stream, user and email must all be known before joining")]
    IncompleteContext,
}
