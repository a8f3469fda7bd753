use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// A response that made it back from the server, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP boundary used by scenarios.
///
/// A non-2xx status is still an `Ok` response. Only failures to get a response at all, such as a
/// refused connection or a timeout, are reported as [TransportError]. Calls are never retried.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError>;
}
