use crate::pcm;
use async_trait::async_trait;
use hearsay_core::{AudioStream, InitError, QueryError, ServiceConfig};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Media type identifying the response schema version.
pub const MEDIA_TYPE: &str = "application/vnd.hearsay.v1+json";

/// Wire access to the recognition service. `Session` drives every query
/// through this trait, so tests can substitute a scripted implementation.
#[async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// Interpret a text utterance. Returns the raw JSON response body.
    async fn message(&self, text: &str, token: &str) -> Result<String, QueryError>;

    /// Stream a spoken utterance for recognition. Consumes the audio feed;
    /// the upload ends when the feed does.
    async fn speech(&self, audio: AudioStream, token: &str) -> Result<String, QueryError>;
}

// ── HttpTransport ─────────────────────────────────────────────

pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    speech_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self, InitError> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| InitError::InvalidEndpoint {
            url: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if config.request_timeout_secs == 0 || config.speech_timeout_secs == 0 {
            return Err(InitError::InvalidTimeout(
                "timeouts must be at least one second".to_string(),
            ));
        }

        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| InitError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            request_timeout,
            speech_timeout: Duration::from_secs(config.speech_timeout_secs),
        })
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }
}

#[async_trait]
impl RecognitionTransport for HttpTransport {
    async fn message(&self, text: &str, token: &str) -> Result<String, QueryError> {
        let url = format!("{}/message", self.endpoint);
        tracing::debug!(url = %url, "submitting text query");

        let response = self
            .http
            .get(&url)
            .query(&[("q", text)])
            .header(AUTHORIZATION, Self::bearer(token))
            .header(ACCEPT, MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| classify_request_error(e, self.request_timeout))?;

        read_response(response).await
    }

    async fn speech(&self, audio: AudioStream, token: &str) -> Result<String, QueryError> {
        let url = format!("{}/speech", self.endpoint);
        let (format, rx) = audio.into_parts();
        tracing::debug!(
            url = %url,
            sample_rate = format.sample_rate,
            "streaming voice query"
        );

        let pcm_stream = UnboundedReceiverStream::new(rx).map(|chunk| {
            let mono = pcm::downmix_to_mono(&chunk.samples, chunk.channels);
            Ok::<Vec<u8>, std::io::Error>(pcm::encode_i16_le(&mono))
        });

        let response = self
            .http
            .post(&url)
            // The client-wide timeout is sized for text queries; a live
            // upload runs as long as the utterance does
            .timeout(self.speech_timeout)
            .header(CONTENT_TYPE, speech_content_type(format.sample_rate))
            .header(AUTHORIZATION, Self::bearer(token))
            .header(ACCEPT, MEDIA_TYPE)
            .body(reqwest::Body::wrap_stream(pcm_stream))
            .send()
            .await
            .map_err(|e| classify_request_error(e, self.speech_timeout))?;

        read_response(response).await
    }
}

fn speech_content_type(sample_rate: u32) -> String {
    format!("audio/raw;encoding=signed-integer;bits=16;rate={sample_rate};endian=little")
}

fn classify_request_error(err: reqwest::Error, deadline: Duration) -> QueryError {
    if err.is_timeout() {
        QueryError::Timeout(deadline)
    } else {
        QueryError::Network(err.to_string())
    }
}

/// Map a response status to the failure it represents, if any.
fn status_failure(status: StatusCode, body: &str) -> Option<QueryError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(QueryError::Auth(format!("{status}: {body}")));
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Some(QueryError::Network(format!("service responded with {status}")));
    }
    if !status.is_success() {
        return Some(QueryError::Protocol(format!("unexpected status {status}")));
    }
    None
}

fn check_json(body: &str) -> Result<(), QueryError> {
    serde_json::from_str::<serde_json::Value>(body)
        .map(|_| ())
        .map_err(|e| QueryError::Protocol(format!("response is not valid JSON: {e}")))
}

async fn read_response(response: reqwest::Response) -> Result<String, QueryError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| QueryError::Network(e.to_string()))?;

    if let Some(err) = status_failure(status, &body) {
        return Err(err);
    }
    check_json(&body)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn test_status_failure_auth_is_terminal() {
        for code in [401, 403] {
            let err = status_failure(status(code), "denied").unwrap();
            assert!(matches!(err, QueryError::Auth(_)), "status {code}");
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_status_failure_server_errors_are_transient() {
        for code in [408, 429, 500, 502, 503] {
            let err = status_failure(status(code), "").unwrap();
            assert!(matches!(err, QueryError::Network(_)), "status {code}");
            assert!(err.is_transient());
        }
    }

    #[test]
    fn test_status_failure_other_client_errors_are_protocol() {
        for code in [400, 404, 410] {
            let err = status_failure(status(code), "").unwrap();
            assert!(matches!(err, QueryError::Protocol(_)), "status {code}");
        }
    }

    #[test]
    fn test_status_failure_success_is_none() {
        assert!(status_failure(status(200), "{}").is_none());
        assert!(status_failure(status(204), "").is_none());
    }

    #[test]
    fn test_check_json_accepts_valid_body() {
        assert!(check_json(r#"{"_text": "hello", "outcomes": []}"#).is_ok());
    }

    #[test]
    fn test_check_json_rejects_garbage() {
        let err = check_json("<html>502</html>").unwrap_err();
        assert!(matches!(err, QueryError::Protocol(_)));
    }

    #[test]
    fn test_speech_content_type_carries_sample_rate() {
        assert_eq!(
            speech_content_type(16000),
            "audio/raw;encoding=signed-integer;bits=16;rate=16000;endian=little"
        );
    }

    #[test]
    fn test_transport_rejects_invalid_endpoint() {
        let config = ServiceConfig {
            endpoint: "not a url".to_string(),
            ..ServiceConfig::default()
        };
        let result = HttpTransport::new(&config);
        assert!(matches!(result, Err(InitError::InvalidEndpoint { .. })));
    }

    #[test]
    fn test_transport_rejects_zero_timeout() {
        let config = ServiceConfig {
            request_timeout_secs: 0,
            ..ServiceConfig::default()
        };
        let result = HttpTransport::new(&config);
        assert!(matches!(result, Err(InitError::InvalidTimeout(_))));
    }

    #[test]
    fn test_transport_trims_trailing_slash() {
        let config = ServiceConfig {
            endpoint: "https://api.hearsay.audio/".to_string(),
            ..ServiceConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint, "https://api.hearsay.audio");
    }
}
