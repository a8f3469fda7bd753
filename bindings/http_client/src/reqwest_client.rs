use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use surge_instruments::{report_operation, OperationRecord, Reporter};

use crate::client::{HttpClient, HttpResponse};
use crate::error::TransportError;

/// A [reqwest::Client] that reports every call to the run's [Reporter].
///
/// Each call is recorded as an `http_get` or `http_post` operation tagged with its status. The
/// underlying client is cheap to clone and pools connections, so one instance should be shared
/// by every virtual user.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClientInstrumented {
    client: reqwest::Client,
    reporter: Arc<Reporter>,
}

impl ReqwestHttpClientInstrumented {
    pub fn new(reporter: Arc<Reporter>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, reporter })
    }

    async fn send(
        &self,
        operation_id: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<HttpResponse, TransportError> {
        let mut operation_record = OperationRecord::new(operation_id);
        let started = Instant::now();

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                operation_record.add_attr("status", status);
                response
                    .text()
                    .await
                    .map(|body| HttpResponse {
                        status,
                        body,
                        elapsed: started.elapsed(),
                    })
                    .map_err(|e| TransportError::from_reqwest(url, e))
            }
            Err(e) => Err(TransportError::from_reqwest(url, e)),
        };

        match &result {
            Ok(response) => log::trace!("{operation_id} {url} -> {}", response.status),
            Err(e) => log::debug!("{operation_id} {url} failed: {e}"),
        }

        report_operation(&self.reporter, operation_record, &result);

        result
    }
}

fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[(&str, &str)],
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
}

#[async_trait]
impl HttpClient for ReqwestHttpClientInstrumented {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let request = with_headers(self.client.get(url), headers);
        self.send("http_get", url, request).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        let request = with_headers(self.client.post(url), headers).body(body);
        self.send("http_post", url, request).await
    }
}
