use std::time::Duration;

use tracing::trace;
use ureq::Agent;

use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};

/// [`HttpClient`] backed by a `ureq` agent.
///
/// Non-2xx statuses are returned as responses, never as errors, so SOAP
/// faults carried by HTTP 500 can be read.
#[derive(Clone)]
pub struct UreqHttpClient {
    agent: Agent,
}

impl UreqHttpClient {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .build();

        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HttpClient for UreqHttpClient {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        trace!(method = %request.method, url = %request.url, "HTTP request");

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let invalid = |e: ureq::http::Error| HttpError::InvalidRequest(request.url.clone(), e.to_string());
        let transport = |e: ureq::Error| HttpError::Transport(request.url.clone(), e.to_string());

        let result = if request.body.is_empty() {
            self.agent.run(builder.body(()).map_err(invalid)?)
        } else {
            self.agent
                .run(builder.body(request.body.as_slice()).map_err(invalid)?)
        };
        let mut response = result.map_err(transport)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.body_mut().read_to_vec().map_err(transport)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
