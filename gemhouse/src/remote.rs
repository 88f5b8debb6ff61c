//! [`RepositoryApi`] over HTTP, against a server built from
//! [`crate::server::router`].
//!
//! Absence travels as `404` (or a `null`/`false` body) and comes back as
//! `None`/`false`. Server-side errors are mapped back to the
//! [`RepositoryError`] variants that produced them.

use crate::config::RemoteConfig;
use crate::error::{ApiErrorResponse, RepositoryError, RepositoryResult, StorageError};
use crate::identity::PackageIdentity;
use crate::index::{SourceIndex, SpecQuery};
use crate::record::{PackageRecord, Specification};
use crate::repository::{AddRequest, RepositoryApi};
use crate::server::{DeleteResponse, YankResponse};
use crate::storage::GemStream;
use crate::uri::{LayoutResolver, UriIntent, UriResolver};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Body, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Client for a remote gemhouse server.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    client: Client,
    resolver: LayoutResolver,
}

impl RemoteRepository {
    pub fn new(base: Url, config: &RemoteConfig) -> RepositoryResult<Self> {
        let resolver = LayoutResolver::for_server(&base)?;
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(StorageError::from)?;

        Ok(Self { client, resolver })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.resolver.base().clone();
        // The resolver only accepts base-capable URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn gem_endpoint(&self, identity: &PackageIdentity) -> Url {
        self.endpoint(&["api", "v1", "gems", identity.name(), identity.version()])
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RepositoryResult<Response> {
        Ok(request.send().await.map_err(StorageError::from)?)
    }

    /// `Ok(None)` on 404, the response on success, an error otherwise.
    async fn fetch(
        &self,
        request: reqwest::RequestBuilder,
        identity: Option<&PackageIdentity>,
    ) -> RepositoryResult<Option<Response>> {
        let response = self.send(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %response.url(), "Remote reported not found");
            return Ok(None);
        }
        if status.is_success() {
            return Ok(Some(response));
        }
        Err(error_from_response(response, identity).await)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        identity: Option<&PackageIdentity>,
    ) -> RepositoryResult<Option<T>> {
        match self.fetch(request, identity).await? {
            Some(response) => Ok(Some(response.json().await.map_err(StorageError::from)?)),
            None => Ok(None),
        }
    }

    /// Like [`fetch_json`](Self::fetch_json) for routes that never answer 404.
    async fn expect_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        identity: Option<&PackageIdentity>,
    ) -> RepositoryResult<T> {
        self.fetch_json(request, identity).await?.ok_or_else(|| {
            RepositoryError::Storage(StorageError::UnexpectedResponse {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: "endpoint not found; is this a gemhouse server?".to_string(),
            })
        })
    }
}

async fn error_from_response(
    response: Response,
    identity: Option<&PackageIdentity>,
) -> RepositoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ApiErrorResponse>(&body).ok();

    match (status, identity) {
        (StatusCode::CONFLICT, Some(identity)) => RepositoryError::Duplicate(identity.clone()),
        (StatusCode::BAD_REQUEST, _) => RepositoryError::InvalidIdentity(
            api_error.map(|e| e.error).unwrap_or(body),
        ),
        (StatusCode::PAYLOAD_TOO_LARGE, _) => RepositoryError::TooLarge {
            limit: api_error
                .and_then(|e| e.details)
                .and_then(|details| details.get("limit").and_then(|limit| limit.as_u64()))
                .unwrap_or_default(),
        },
        _ => RepositoryError::Storage(StorageError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl RepositoryApi for RemoteRepository {
    fn resolver(&self) -> &dyn UriResolver {
        &self.resolver
    }

    async fn add(&self, request: AddRequest) -> RepositoryResult<PackageRecord> {
        let AddRequest { identity, body } = request;
        let upload = self
            .client
            .post(self.gem_endpoint(&identity))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(body));
        self.expect_json(upload, Some(&identity)).await
    }

    async fn get(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Bytes>> {
        let url = self.resolver.resolve(identity, UriIntent::Gem);
        match self.fetch(self.client.get(url), Some(identity)).await? {
            Some(response) => Ok(Some(response.bytes().await.map_err(StorageError::from)?)),
            None => Ok(None),
        }
    }

    async fn open(&self, identity: &PackageIdentity) -> RepositoryResult<Option<GemStream>> {
        let url = self.resolver.resolve(identity, UriIntent::Gem);
        let response = self.fetch(self.client.get(url), Some(identity)).await?;
        Ok(response.map(|response| {
            response
                .bytes_stream()
                .map_err(StorageError::from)
                .boxed()
        }))
    }

    async fn record(&self, identity: &PackageIdentity) -> RepositoryResult<Option<PackageRecord>> {
        self.fetch_json(self.client.get(self.gem_endpoint(identity)), Some(identity))
            .await
    }

    async fn search_for(&self, query: &SpecQuery) -> RepositoryResult<Vec<Specification>> {
        let request = self
            .client
            .get(self.endpoint(&["api", "v1", "search"]))
            .query(query);
        self.expect_json(request, None).await
    }

    async fn source_index(&self) -> RepositoryResult<SourceIndex> {
        let request = self.client.get(self.endpoint(&["api", "v1", "specs"]));
        self.expect_json(request, None).await
    }

    async fn yank(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Url>> {
        let mut url = self.gem_endpoint(identity);
        if let Ok(mut path) = url.path_segments_mut() {
            path.push("yank");
        }
        let response: YankResponse = self
            .expect_json(self.client.post(url), Some(identity))
            .await?;
        // The server addresses gems by its own base; hand out ours, as uri_for_gem does.
        Ok(response
            .uri
            .map(|_| self.resolver.resolve(identity, UriIntent::Gem)))
    }

    async fn delete(&self, identity: &PackageIdentity) -> RepositoryResult<bool> {
        let response: DeleteResponse = self
            .expect_json(self.client.delete(self.gem_endpoint(identity)), Some(identity))
            .await?;
        Ok(response.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> RemoteRepository {
        RemoteRepository::new(Url::parse(base).unwrap(), &RemoteConfig::default()).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let repo = remote("http://localhost:9292");
        let foo = PackageIdentity::new("foo", "1.0.0").unwrap();
        assert_eq!(
            repo.gem_endpoint(&foo).as_str(),
            "http://localhost:9292/api/v1/gems/foo/1.0.0"
        );
        assert_eq!(
            repo.endpoint(&["api", "v1", "specs"]).as_str(),
            "http://localhost:9292/api/v1/specs"
        );
    }

    #[test]
    fn test_endpoints_under_path_prefix() {
        let repo = remote("https://example.com/mirror/");
        assert_eq!(
            repo.endpoint(&["api", "v1", "search"]).as_str(),
            "https://example.com/mirror/api/v1/search"
        );
        assert_eq!(repo.gems_uri().as_str(), "https://example.com/mirror/gems/");
    }
}
