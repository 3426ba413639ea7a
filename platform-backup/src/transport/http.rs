//! reqwest-backed HTTP gateway.

use super::{HttpGateway, HttpResponse, RequestEntity};
use crate::{BackupError, Result};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use std::path::Path;
use std::time::Duration;

/// Blocking HTTPS client with basic auth. Redirects are surfaced to the
/// caller instead of being followed.
pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|source| BackupError::Http {
                url: String::new(),
                source,
            })?;

        Ok(Self { client })
    }

    fn send(&self, request: &RequestEntity, builder: RequestBuilder) -> Result<HttpResponse> {
        tracing::debug!(url = %request.url, "Sending HTTP request");

        let response = builder
            .basic_auth(&request.username, Some(&request.password))
            .send()
            .map_err(|source| BackupError::Http {
                url: request.url.clone(),
                source,
            })?;

        Ok(into_response(response))
    }
}

fn into_response(response: Response) -> HttpResponse {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    HttpResponse {
        status: response.status().as_u16(),
        location,
        body: Box::new(response),
    }
}

impl HttpGateway for ReqwestGateway {
    fn get(&self, request: &RequestEntity) -> Result<HttpResponse> {
        let builder = self
            .client
            .get(&request.url)
            .header(CONTENT_TYPE, &request.content_type);
        self.send(request, builder)
    }

    fn put(&self, request: &RequestEntity, body: Vec<u8>) -> Result<HttpResponse> {
        let builder = self
            .client
            .put(&request.url)
            .header(CONTENT_TYPE, &request.content_type)
            .body(body);
        self.send(request, builder)
    }

    fn upload(&self, request: &RequestEntity, field_name: &str, file: &Path) -> Result<HttpResponse> {
        let form = multipart::Form::new().file(field_name.to_string(), file)?;
        let builder = self.client.post(&request.url).multipart(form);
        self.send(request, builder)
    }
}
