use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;

lazy_static! {
    static ref CLIENT: reqwest::Client = reqwest::Client::builder()
        .user_agent("BubbleBot")
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to create reqwest client");
}

pub fn get_reqwest_client() -> &'static reqwest::Client {
    &CLIENT
}

/// Failure talking to an upstream collaborator. Timeouts are split out so the
/// dispatch boundary can log them distinctly; both surface to the user as the
/// same "try again later" reply, never as a crash.
#[derive(Debug)]
pub enum UpstreamError {
    Timeout,
    Unavailable(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Timeout => write!(f, "upstream request timed out"),
            UpstreamError::Unavailable(reason) => write!(f, "upstream unavailable: {reason}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Unavailable(err.to_string())
        }
    }
}
