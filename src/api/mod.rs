//! Remote feed API client
//!
//! [`PostsApi`] is the seam between the repository and the network; the
//! repository only ever talks to the trait, which keeps it testable
//! against a scripted implementation. [`ApiClient`] is the real thing,
//! speaking the feed server's JSON API over reqwest.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;

use crate::error::RequestError;
use crate::models::Post;

/// Remote operations on the feed, as the repository sees them.
///
/// Every method either returns the payload or fails with a mechanical
/// [`RequestError`]; classification into the caller-facing taxonomy
/// happens in the repository.
#[async_trait]
pub trait PostsApi: Send + Sync {
    /// Fetch every post on the server
    async fn fetch_all(&self) -> Result<Vec<Post>, RequestError>;

    /// Fetch posts with ids strictly greater than `id`
    async fn fetch_newer_than(&self, id: i64) -> Result<Vec<Post>, RequestError>;

    /// Create a post; the server assigns id and publish time
    async fn create(&self, post: &Post) -> Result<Post, RequestError>;

    /// Update an existing post
    async fn update(&self, post: &Post) -> Result<Post, RequestError>;

    /// Delete a post by id
    async fn delete(&self, id: i64) -> Result<(), RequestError>;

    /// Like a post by id
    async fn like(&self, id: i64) -> Result<(), RequestError>;

    /// Remove a like from a post by id
    async fn unlike(&self, id: i64) -> Result<(), RequestError>;
}

/// HTTP client for the feed server
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new client; `token` is the session token, if signed in
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
        }
    }

    /// Build API URL
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api{}", self.base_url, endpoint)
    }

    /// Start a request with the session token attached
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.header("Authorization", token),
            None => builder,
        }
    }

    /// Turn a non-2xx response into `RequestError::Status`
    async fn check(response: Response) -> Result<Response, RequestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            body
        };
        Err(RequestError::Status {
            code: status.as_u16(),
            message,
        })
    }

    /// POST a post body; the server routes create and update through
    /// the same endpoint, keyed on the id in the body
    async fn save(&self, post: &Post) -> Result<Post, RequestError> {
        let url = self.api_url("/posts");

        let response = self
            .request(Method::POST, &url)
            .json(post)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        let response = Self::check(response).await?;
        response.json().await.map_err(RequestError::from_reqwest)
    }

    /// Exchange credentials for a session.
    ///
    /// Not part of [`PostsApi`]: the sync core only reads the resulting
    /// identity, it never drives authentication itself.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<AuthResponse, RequestError> {
        let url = self.api_url("/users/authentication");
        let params = [("login", login), ("pass", password)];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        let response = Self::check(response).await?;
        response.json().await.map_err(RequestError::from_reqwest)
    }
}

#[async_trait]
impl PostsApi for ApiClient {
    async fn fetch_all(&self) -> Result<Vec<Post>, RequestError> {
        let url = self.api_url("/posts");

        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        let response = Self::check(response).await?;
        response.json().await.map_err(RequestError::from_reqwest)
    }

    async fn fetch_newer_than(&self, id: i64) -> Result<Vec<Post>, RequestError> {
        let url = self.api_url(&format!("/posts/{id}/newer"));

        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        let response = Self::check(response).await?;
        response.json().await.map_err(RequestError::from_reqwest)
    }

    async fn create(&self, post: &Post) -> Result<Post, RequestError> {
        self.save(post).await
    }

    async fn update(&self, post: &Post) -> Result<Post, RequestError> {
        self.save(post).await
    }

    async fn delete(&self, id: i64) -> Result<(), RequestError> {
        let url = self.api_url(&format!("/posts/{id}"));

        let response = self
            .request(Method::DELETE, &url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        Self::check(response).await?;
        Ok(())
    }

    async fn like(&self, id: i64) -> Result<(), RequestError> {
        let url = self.api_url(&format!("/posts/{id}/likes"));

        let response = self
            .request(Method::POST, &url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        Self::check(response).await?;
        Ok(())
    }

    async fn unlike(&self, id: i64) -> Result<(), RequestError> {
        let url = self.api_url(&format!("/posts/{id}/likes"));

        let response = self
            .request(Method::DELETE, &url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Response of the authentication endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Authenticated user id
    pub id: i64,
    /// Session token for the Authorization header
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn api_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:9999/", None);
        assert_eq!(
            client.api_url("/posts/5/newer"),
            "http://localhost:9999/api/posts/5/newer"
        );
    }

    /// Answer exactly one connection with a canned HTTP response
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Bind then drop, so the port is ours but nothing listens
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}"), None);
        let err = client.fetch_all().await.unwrap_err();

        assert!(matches!(err, RequestError::Transport(_)));
        assert_eq!(SyncError::from(err), SyncError::Network);
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\n\
             content-type: application/json\r\n\
             content-length: 9\r\n\
             connection: close\r\n\r\n\
             not-json!",
        )
        .await;

        let client = ApiClient::new(&base, None);
        let err = client.fetch_all().await.unwrap_err();

        assert!(matches!(err, RequestError::Decode(_)));
        assert_eq!(SyncError::from(err), SyncError::Unknown);
    }

    #[tokio::test]
    async fn non_2xx_carries_code_and_body() {
        let base = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\n\
             content-length: 4\r\n\
             connection: close\r\n\r\n\
             boom",
        )
        .await;

        let client = ApiClient::new(&base, None);
        let err = client.fetch_all().await.unwrap_err();

        match err {
            RequestError::Status { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }
}
