use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes the requests issued by [`super::HttpFetcher`]. Implemented by
/// anything that can stand in for a real HTTP stack.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Plain [`reqwest::Client`] with a connect timeout. Feed archives can be
/// large, so there is no overall request timeout.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.0.execute(req).await
    }
}
