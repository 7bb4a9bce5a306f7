use super::{Transport, TransportError};
use crate::job::{Job, Response};
use reqwest::header::RANGE;

/// A [`Transport`] backed by a dedicated [`reqwest::Client`].
///
/// Each worker builds its own instance, so connection pools are never shared
/// between workers.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a session with default client settings.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fetchpool/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn fetch(&mut self, job: &Job) -> Result<Response, TransportError> {
        let response = self
            .client
            .get(&job.url)
            .header(RANGE, job.range_header())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(Response { status, body })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}
