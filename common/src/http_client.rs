use crate::errors::AppError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{Instrument, error, info, instrument, warn};

/// HTTP client with timeout and optional retry on transient failures
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Fetch JSON from `url` with the given query parameters.
    ///
    /// Only the base URL is logged; query values (API keys included) never
    /// reach the trace output. Retries use exponential backoff and are only
    /// attempted for timeouts, connection failures and 5xx responses.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_json<T>(&self, url: &str, query: &[(&str, String)]) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let full_url = with_query(url, query);
        let mut attempt = 0;

        loop {
            let span = tracing::span!(tracing::Level::INFO, "http_request", attempt = attempt + 1);

            match self
                .fetch_with_timeout(&full_url, url)
                .instrument(span)
                .await
            {
                Ok(response) => {
                    info!(url = %url, attempt = attempt + 1, "Request successful");
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    let backoff = Duration::from_millis(2_u64.pow(attempt) * 100);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Request failed, retrying with exponential backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(url = %url, attempts = attempt + 1, error = %e, "Request failed");
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_with_timeout<T>(&self, full_url: &str, url: &str) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = tokio::time::timeout(self.timeout, self.client.get(full_url).send())
            .await
            .map_err(|_| AppError::timeout(format!("Request to {} timed out", url)))?
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout(format!("Request to {} timed out", url))
                } else {
                    AppError::NetworkError(e.without_url())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(AppError::http(status.as_u16(), message));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(e.without_url()))?;
        let json: T = serde_json::from_str(&text).map_err(AppError::ParseError)?;

        Ok(json)
    }
}

fn with_query(url: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }

    let encoded = query
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    #[test]
    fn query_values_are_percent_encoded() {
        let url = with_query(
            "http://geo.local/direct",
            &[("q", "Phú Yên, VN".to_string()), ("limit", "5".to_string())],
        );
        assert_eq!(
            url,
            "http://geo.local/direct?q=Ph%C3%BA%20Y%C3%AAn%2C%20VN&limit=5"
        );
    }

    #[tokio::test]
    async fn passes_query_parameters_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("lat", "21.0285"))
            .and(query_param("appid", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Hanoi" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 0).expect("client");
        let body: serde_json::Value = client
            .get_json(
                &format!("{}/weather", server.uri()),
                &[("lat", "21.0285".to_string()), ("appid", "secret".to_string())],
            )
            .await
            .expect("request should succeed");

        assert_eq!(body["name"], "Hanoi");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried_and_carry_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "cod": 401, "message": "Invalid API key." })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 3).expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/weather", server.uri()), &[])
            .await
            .expect_err("401 must fail");

        match err {
            AppError::HttpError { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_the_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 2).expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/forecast", server.uri()), &[])
            .await
            .expect_err("503 must fail");

        assert!(matches!(err, AppError::HttpError { status: 503, .. }));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(1, 0).expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/slow", server.uri()), &[])
            .await
            .expect_err("should time out");

        assert!(matches!(err, AppError::TimeoutError(_)));
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 0).expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/weather", server.uri()), &[])
            .await
            .expect_err("body is not JSON");

        assert!(matches!(err, AppError::ParseError(_)));
    }
}
