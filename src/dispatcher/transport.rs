//! HTTP transport.
//!
//! [`Transport`] is the seam between retry policy and the wire. The real
//! implementation uses reqwest with the selected proxy configured for both
//! schemes; tests substitute a scripted transport.

use super::config::TransportConfig;
use super::error::DispatchError;
use crate::models::{PreparedBody, PreparedRequest};
use crate::proxy::SelectedProxy;
use log::debug;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use std::future::Future;
use tokio::sync::Mutex;

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Headers in received order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Gets a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends one attempt of a prepared request through a proxy.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &PreparedRequest,
        proxy: &SelectedProxy,
    ) -> impl Future<Output = Result<TransportResponse, DispatchError>> + Send;
}

/// reqwest-backed transport.
///
/// The client is built for a specific proxy and cached. Every send checks the
/// cached client against the proxy it is asked to use and rebuilds it when
/// they differ, so a request can never leave without the proxy configured.
#[derive(Debug)]
pub struct ReqwestTransport {
    config: TransportConfig,
    client: Mutex<Option<(SelectedProxy, reqwest::Client)>>,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    fn build_client(&self, proxy: &SelectedProxy) -> Result<reqwest::Client, DispatchError> {
        let proxy_url = proxy.url();
        let reqwest_proxy = reqwest::Proxy::all(&proxy_url)
            .map_err(|e| DispatchError::Build(format!("Invalid proxy URL {}: {}", proxy_url, e)))?;

        let redirect = if self.config.follow_redirects {
            Policy::limited(self.config.max_redirects as usize)
        } else {
            Policy::none()
        };

        reqwest::Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout_duration())
            .redirect(redirect)
            .danger_accept_invalid_certs(!self.config.verify_ssl)
            .build()
            .map_err(|e| DispatchError::Build(e.to_string()))
    }

    async fn client_for(&self, proxy: &SelectedProxy) -> Result<reqwest::Client, DispatchError> {
        let mut cached = self.client.lock().await;
        if let Some((configured, client)) = cached.as_ref() {
            if configured == proxy {
                return Ok(client.clone());
            }
        }

        debug!("Configuring HTTP client for proxy {}", proxy);
        let client = self.build_client(proxy)?;
        *cached = Some((proxy.clone(), client.clone()));
        Ok(client)
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        proxy: &SelectedProxy,
    ) -> Result<TransportResponse, DispatchError> {
        let client = self.client_for(proxy).await?;

        let url = url::Url::parse(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| DispatchError::Build(e.to_string()))?;

        let mut builder = client.request(method, url);

        let multipart = matches!(request.body, PreparedBody::Multipart(_));
        for (name, value) in &request.headers {
            // the multipart boundary comes from the encoder
            if multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DispatchError::Build(format!("Invalid header name `{}`: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                DispatchError::Build(format!("Invalid header value for `{}`: {}", name, e))
            })?;
            builder = builder.header(header_name, header_value);
        }

        builder = match &request.body {
            PreparedBody::None => builder,
            PreparedBody::Raw(raw) => builder.body(raw.clone()),
            PreparedBody::UrlEncoded(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish();
                if request.content_type().is_none() {
                    builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                }
                builder.body(encoded)
            }
            PreparedBody::Multipart(pairs) => {
                let form = pairs
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| {
                        form.text(k.clone(), v.clone())
                    });
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn proxy_for(server: &MockServer) -> SelectedProxy {
        let address = server.address();
        SelectedProxy {
            host: address.ip().to_string(),
            port: address.port(),
            verified: true,
        }
    }

    #[tokio::test]
    async fn test_request_goes_through_proxy() {
        // The mock server plays the proxy: absolute-form requests arrive with
        // the target's path.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(header("X-Trace", "1"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("user=ann&note=a+b"))
            .respond_with(ResponseTemplate::new(201).insert_header("Via", "1.1 proxy"))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = PreparedRequest::new("login", HttpMethod::POST, "http://target.test/login");
        request.set_header("X-Trace", "1");
        request.body = PreparedBody::UrlEncoded(vec![
            ("user".to_string(), "ann".to_string()),
            ("note".to_string(), "a b".to_string()),
        ]);

        let transport = ReqwestTransport::new(TransportConfig::default());
        let response = transport.send(&request, &proxy_for(&server)).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.header("via"), Some("1.1 proxy"));
    }

    #[tokio::test]
    async fn test_client_rebuilt_when_proxy_changes() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        for server in [&first, &second] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(server)
                .await;
        }

        let request = PreparedRequest::new("r", HttpMethod::GET, "http://target.test/");
        let transport = ReqwestTransport::new(TransportConfig::default());
        transport.send(&request, &proxy_for(&first)).await.unwrap();
        transport.send(&request, &proxy_for(&second)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = SelectedProxy {
            host: "127.0.0.1".to_string(),
            port,
            verified: false,
        };
        let request = PreparedRequest::new("r", HttpMethod::GET, "http://target.test/");
        let err = ReqwestTransport::new(TransportConfig::default())
            .send(&request, &proxy)
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_invalid_url_not_retryable() {
        let server = MockServer::start().await;
        let request = PreparedRequest::new("r", HttpMethod::GET, "{{base_url}}/x");
        let err = ReqwestTransport::new(TransportConfig::default())
            .send(&request, &proxy_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidUrl(_)));
        assert!(!err.is_retryable());
    }
}
