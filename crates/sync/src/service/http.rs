//! REST Cart Service client.
//!
//! Talks JSON to the food-ordering backend's cart endpoints with a bearer
//! token. Mutations send their request id as an `Idempotency-Key` header.

use std::sync::Arc;

use async_trait::async_trait;
use food_cart_core::{CartItem, OperationId, Product, ProductId, SelectedOption};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{CartService, ItemUpdate, ServiceError};
use crate::config::CartApiConfig;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest<'a> {
    product: &'a Product,
    quantity: u32,
    selected_option: &'a [SelectedOption],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id: &'a ProductId,
    quantity: u32,
    selected_option: &'a [SelectedOption],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveRequest<'a> {
    id: &'a ProductId,
    selected_option: &'a [SelectedOption],
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    updates: &'a [ItemUpdate],
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    items: &'a [CartItem],
}

#[derive(Deserialize)]
struct CartResponse {
    #[serde(default)]
    items: Vec<CartItem>,
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    issues: Vec<String>,
}

// =============================================================================
// HttpCartService
// =============================================================================

/// Client for the backend REST cart API.
#[derive(Clone)]
pub struct HttpCartService {
    inner: Arc<HttpCartServiceInner>,
}

struct HttpCartServiceInner {
    client: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl HttpCartService {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CartApiConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    fn with_client(client: reqwest::Client, config: &CartApiConfig) -> Self {
        Self {
            inner: Arc::new(HttpCartServiceInner {
                client,
                base_url: config.base_url.clone(),
                token: config.token.clone(),
            }),
        }
    }

    /// Resolve an endpoint path against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        request_id: Option<OperationId>,
    ) -> Result<RequestBuilder, ServiceError> {
        let builder = self
            .inner
            .client
            .request(method, self.endpoint(path)?)
            .bearer_auth(self.inner.token.expose_secret())
            .header("Accept", "application/json");

        Ok(match request_id {
            Some(id) => builder.header(IDEMPOTENCY_HEADER, id.to_string()),
            None => builder,
        })
    }

    /// Send a request and return the response body on success.
    async fn execute(&self, builder: RequestBuilder) -> Result<String, ServiceError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ServiceError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Cart API returned non-success status"
            );
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl CartService for HttpCartService {
    #[instrument(skip(self))]
    async fn get(&self) -> Result<Vec<CartItem>, ServiceError> {
        let body = self
            .execute(self.request(Method::GET, "api/cart", None)?)
            .await?;
        let cart: CartResponse = serde_json::from_str(&body)?;
        debug!(lines = cart.items.len(), "Fetched cart");
        Ok(cart.items)
    }

    #[instrument(skip(self, product, options), fields(product = %product.id))]
    async fn add(
        &self,
        request_id: OperationId,
        product: &Product,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        let body = AddRequest {
            product,
            quantity,
            selected_option: options,
        };
        self.execute(
            self.request(Method::POST, "api/cart/items", Some(request_id))?
                .json(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, options))]
    async fn update(
        &self,
        request_id: OperationId,
        id: &ProductId,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        let body = UpdateRequest {
            id,
            quantity,
            selected_option: options,
        };
        self.execute(
            self.request(Method::PATCH, "api/cart/items", Some(request_id))?
                .json(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, options))]
    async fn remove(
        &self,
        request_id: OperationId,
        id: &ProductId,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        let body = RemoveRequest {
            id,
            selected_option: options,
        };
        self.execute(
            self.request(Method::DELETE, "api/cart/items", Some(request_id))?
                .json(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, request_id: OperationId) -> Result<(), ServiceError> {
        self.execute(self.request(Method::DELETE, "api/cart", Some(request_id))?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, updates), fields(lines = updates.len()))]
    async fn batch_update(
        &self,
        request_id: OperationId,
        updates: &[ItemUpdate],
    ) -> Result<(), ServiceError> {
        self.execute(
            self.request(Method::PATCH, "api/cart/items/batch", Some(request_id))?
                .json(&BatchRequest { updates }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, items), fields(lines = items.len()))]
    async fn validate(&self, items: &[CartItem]) -> Result<Vec<String>, ServiceError> {
        let body = self
            .execute(
                self.request(Method::POST, "api/cart/validate", None)?
                    .json(&ValidateRequest { items }),
            )
            .await?;
        let response: ValidateResponse = serde_json::from_str(&body)?;
        Ok(response.issues)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use food_cart_core::Price;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    fn config(base: &str) -> CartApiConfig {
        CartApiConfig {
            base_url: Url::parse(base).unwrap(),
            token: SecretString::from("tok_3f9a1c"),
            timeout: Duration::from_secs(5),
        }
    }

    fn pho() -> Product {
        Product::new("pho", "Beef Pho", Price::from_cents(1350), "noodles")
    }

    // =========================================================================
    // Local Server
    // =========================================================================

    /// A captured request: the head (lowercased) and the body.
    struct Captured {
        head: String,
        body: String,
    }

    impl Captured {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    fn response(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n{headers}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    async fn read_request(socket: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let head = text[..end].to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map_or(0, |v| v.trim().parse::<usize>().unwrap());
                if buf.len() >= end + 4 + length {
                    let body = text[end + 4..].to_string();
                    return Captured { head, body };
                }
            }
        }
        Captured {
            head: String::from_utf8_lossy(&buf).to_ascii_lowercase(),
            body: String::new(),
        }
    }

    /// Answer one connection per canned response, returning what was received.
    async fn serve(responses: Vec<String>) -> (HttpCartService, JoinHandle<Vec<Captured>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut captured = Vec::new();
            for canned in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                captured.push(read_request(&mut socket).await);
                socket.write_all(canned.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            captured
        });
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let service = HttpCartService::with_client(client, &config(&format!("http://{addr}/")));
        (service, handle)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    #[test]
    fn test_endpoint_joins_base_path() {
        let service = HttpCartService::new(&config("https://food.example.com/v1/")).unwrap();
        assert_eq!(
            service.endpoint("api/cart/items").unwrap().as_str(),
            "https://food.example.com/v1/api/cart/items"
        );
    }

    #[test]
    fn test_mutations_carry_idempotency_key() {
        let service = HttpCartService::new(&config("https://food.example.com/")).unwrap();
        let request_id = OperationId::generate();
        let request = service
            .request(Method::DELETE, "api/cart", Some(request_id))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(
            request.headers().get(IDEMPOTENCY_HEADER).unwrap(),
            request_id.to_string().as_str()
        );
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer tok_3f9a1c"
        );
    }

    #[test]
    fn test_cart_response_tolerates_missing_items() {
        let response: CartResponse = serde_json::from_str("{}").unwrap();
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn test_get_parses_cart_items() {
        let line = CartItem::new(pho(), 2, vec![SelectedOption::new("brisket", Price::from_cents(200))]);
        let body = serde_json::json!({ "items": [line.clone()] }).to_string();
        let (service, server) = serve(vec![response("200 OK", "", &body)]).await;

        let items = service.get().await.unwrap();

        assert_eq!(items, vec![line]);
        let captured = server.await.unwrap();
        assert!(captured[0].head.starts_with("get /api/cart http/1.1"));
        assert!(captured[0].head.contains("authorization: bearer tok_3f9a1c"));
    }

    #[tokio::test]
    async fn test_add_sends_product_and_idempotency_key() {
        let (service, server) = serve(vec![response("200 OK", "", "{}")]).await;
        let request_id = OperationId::generate();

        service
            .add(
                request_id,
                &pho(),
                2,
                &[SelectedOption::new("brisket", Price::from_cents(200))],
            )
            .await
            .unwrap();

        let captured = server.await.unwrap();
        let request = &captured[0];
        assert!(request.head.starts_with("post /api/cart/items http/1.1"));
        assert!(
            request
                .head
                .contains(&format!("idempotency-key: {request_id}").to_ascii_lowercase())
        );
        let body = request.json();
        assert_eq!(body["product"]["id"], "pho");
        assert_eq!(body["quantity"], 2);
        assert_eq!(body["selectedOption"][0]["name"], "brisket");
    }

    #[tokio::test]
    async fn test_batch_update_sends_every_line() {
        let (service, server) = serve(vec![response("200 OK", "", "{}")]).await;
        let updates = [
            ItemUpdate {
                id: ProductId::new("pho"),
                quantity: 3,
                selected_option: vec![],
            },
            ItemUpdate {
                id: ProductId::new("banh-mi"),
                quantity: 1,
                selected_option: vec![SelectedOption::new("pate", Price::ZERO)],
            },
        ];

        service
            .batch_update(OperationId::generate(), &updates)
            .await
            .unwrap();

        let captured = server.await.unwrap();
        assert!(captured[0].head.starts_with("patch /api/cart/items/batch http/1.1"));
        let body = captured[0].json();
        let sent = body["updates"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["id"], "pho");
        assert_eq!(sent[0]["quantity"], 3);
        assert_eq!(sent[1]["selectedOption"][0]["name"], "pate");
    }

    #[tokio::test]
    async fn test_validate_returns_server_issues() {
        let body = r#"{"issues":["Beef Pho is sold out"]}"#;
        let (service, server) = serve(vec![response("200 OK", "", body)]).await;

        let issues = service.validate(&[CartItem::new(pho(), 1, vec![])]).await.unwrap();

        assert_eq!(issues, vec!["Beef Pho is sold out".to_string()]);
        let captured = server.await.unwrap();
        assert!(captured[0].head.starts_with("post /api/cart/validate http/1.1"));
        assert_eq!(captured[0].json()["items"][0]["id"], "pho");
    }

    // =========================================================================
    // Error Mapping
    // =========================================================================

    #[tokio::test]
    async fn test_too_many_requests_maps_to_rate_limited() {
        let (service, server) =
            serve(vec![response("429 Too Many Requests", "Retry-After: 7\r\n", "")]).await;

        let result = service.clear(OperationId::generate()).await;

        assert!(matches!(result, Err(ServiceError::RateLimited(7))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_without_header_defaults_to_one_second() {
        let (service, server) = serve(vec![response("429 Too Many Requests", "", "")]).await;

        let result = service.get().await;

        assert!(matches!(result, Err(ServiceError::RateLimited(1))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_keeps_truncated_body() {
        let body = format!("\"{}\"", "x".repeat(300));
        let (service, server) = serve(vec![response("503 Service Unavailable", "", &body)]).await;

        let result = service.remove(OperationId::generate(), &ProductId::new("pho"), &[]).await;

        match result {
            Err(ServiceError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body.chars().count(), 200);
            }
            other => panic!("expected status error, got {other:?}"),
        }
        let captured = server.await.unwrap();
        assert!(captured[0].head.starts_with("delete /api/cart/items http/1.1"));
        assert_eq!(captured[0].json()["id"], "pho");
    }
}
