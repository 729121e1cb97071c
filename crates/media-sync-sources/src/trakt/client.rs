use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use media_sync_models::{IdMeta, Item, MediaKind};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::TraktError;
use crate::traits::TargetProvider;
use crate::trakt::api::{CrudResponse, NewList, TraktItem, TraktList, TraktSyncPayload, TraktUser};
use crate::trakt::transport::{ApiRequest, ApiResponse, Transport};

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Typed Trakt operations over an assembled transport stack.
pub struct TraktClient {
    transport: Arc<dyn Transport>,
    user: OnceCell<String>,
    max_concurrent_fetches: usize,
}

impl TraktClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            user: OnceCell::new(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    /// Upper bound on list fetches in flight during `lists_get`
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    async fn call(&self, mut request: ApiRequest, want: &[StatusCode]) -> Result<ApiResponse, TraktError> {
        self.transport.send(&mut request).await?.expect(want)
    }

    async fn post_items(
        &self,
        path: String,
        payload: &TraktSyncPayload,
        want: StatusCode,
    ) -> Result<CrudResponse, TraktError> {
        if payload.is_empty() {
            debug!(path = %path, "Nothing to send");
            return Ok(CrudResponse::default());
        }
        let request = ApiRequest::post(path).json(payload)?;
        self.call(request, &[want]).await?.json()
    }

    /// URL-encoded slug of the authenticated user, fetched once
    async fn user(&self) -> Result<&str, TraktError> {
        self.user
            .get_or_try_init(|| async {
                let me: TraktUser = self
                    .call(ApiRequest::get("/users/me"), &[StatusCode::OK])
                    .await?
                    .json()?;
                debug!(user = %me.ids.slug, "Resolved Trakt user");
                Ok::<_, TraktError>(urlencoding::encode(&me.ids.slug).into_owned())
            })
            .await
            .map(String::as_str)
    }

    async fn list_path(&self, slug: &str) -> Result<String, TraktError> {
        Ok(format!(
            "/users/{}/lists/{}/items",
            self.user().await?,
            urlencoding::encode(slug)
        ))
    }
}

#[async_trait]
impl TargetProvider for TraktClient {
    async fn watchlist_get(&self) -> Result<TraktList, TraktError> {
        let items: Vec<TraktItem> = self
            .call(ApiRequest::get("/sync/watchlist"), &[StatusCode::OK])
            .await?
            .json()?;
        Ok(TraktList {
            ids: IdMeta::new("watchlist", "watchlist").with_name("Watchlist"),
            items,
            is_watchlist: true,
        })
    }

    async fn watchlist_items_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/watchlist".to_string(),
            &TraktSyncPayload::ids(items),
            StatusCode::CREATED,
        )
        .await
    }

    async fn watchlist_items_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/watchlist/remove".to_string(),
            &TraktSyncPayload::ids(items),
            StatusCode::OK,
        )
        .await
    }

    async fn list_get(&self, meta: &IdMeta) -> Result<TraktList, TraktError> {
        let path = self.list_path(&meta.slug).await?;
        let response = self
            .call(ApiRequest::get(path), &[StatusCode::OK, StatusCode::NOT_FOUND])
            .await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(TraktError::ListNotFound {
                slug: meta.slug.clone(),
            });
        }
        Ok(TraktList {
            ids: meta.clone(),
            items: response.json()?,
            is_watchlist: false,
        })
    }

    async fn lists_get(&self, metas: &[IdMeta]) -> Result<(Vec<TraktList>, Vec<TraktError>), TraktError> {
        // Collected first so the stream holds plain futures, not a borrowing closure
        let pending: Vec<_> = metas.iter().map(|meta| self.list_get(meta)).collect();
        let mut fetches = stream::iter(pending).buffer_unordered(self.max_concurrent_fetches);

        let mut lists = Vec::with_capacity(metas.len());
        let mut delegated = Vec::new();
        // Returning early drops `fetches`, cancelling whatever is still in flight
        while let Some(result) = fetches.next().await {
            match result {
                Ok(list) => lists.push(list),
                Err(e) if e.is_list_not_found() => {
                    debug!(error = %e, "Delegating missing list");
                    delegated.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(found = lists.len(), missing = delegated.len(), "Fetched Trakt lists");
        Ok((lists, delegated))
    }

    async fn list_add(&self, id: &str, name: &str) -> Result<(), TraktError> {
        let path = format!("/users/{}/lists", self.user().await?);
        let body = NewList::private(name, format!("Synced from IMDb list {}", id));
        self.call(ApiRequest::post(path).json(&body)?, &[StatusCode::CREATED])
            .await?;
        info!(list_id = %id, name = %name, "Created Trakt list");
        Ok(())
    }

    async fn list_items_add(&self, slug: &str, items: &[Item]) -> Result<CrudResponse, TraktError> {
        let path = self.list_path(slug).await?;
        self.post_items(path, &TraktSyncPayload::ids(items), StatusCode::CREATED)
            .await
    }

    async fn list_items_remove(&self, slug: &str, items: &[Item]) -> Result<CrudResponse, TraktError> {
        let path = format!("{}/remove", self.list_path(slug).await?);
        self.post_items(path, &TraktSyncPayload::ids(items), StatusCode::OK)
            .await
    }

    async fn ratings_get(&self) -> Result<Vec<TraktItem>, TraktError> {
        self.call(ApiRequest::get("/sync/ratings"), &[StatusCode::OK])
            .await?
            .json()
    }

    async fn ratings_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/ratings".to_string(),
            &TraktSyncPayload::rated(items),
            StatusCode::CREATED,
        )
        .await
    }

    async fn ratings_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/ratings/remove".to_string(),
            &TraktSyncPayload::ids(items),
            StatusCode::OK,
        )
        .await
    }

    async fn history_get(&self, kind: MediaKind, id: &str) -> Result<Vec<TraktItem>, TraktError> {
        let path = format!("/sync/history/{}/{}", kind.plural(), urlencoding::encode(id));
        self.call(ApiRequest::get(path).query("limit", 1000), &[StatusCode::OK])
            .await?
            .json()
    }

    async fn history_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/history".to_string(),
            &TraktSyncPayload::watched(items),
            StatusCode::CREATED,
        )
        .await
    }

    async fn history_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError> {
        self.post_items(
            "/sync/history/remove".to_string(),
            &TraktSyncPayload::ids(items),
            StatusCode::OK,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trakt::transport::HttpTransport;
    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_user(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "Jane Doe",
                "ids": {"slug": "jane doe"}
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> TraktClient {
        TraktClient::new(Arc::new(HttpTransport::new(server.uri(), CancellationToken::new())))
    }

    fn list_items_json(imdb: &str) -> serde_json::Value {
        serde_json::json!([{
            "listed_at": "2023-01-01T00:00:00.000Z",
            "type": "movie",
            "movie": {"title": "Movie", "ids": {"imdb": imdb}}
        }])
    }

    #[tokio::test]
    async fn test_lists_get_delegates_missing_lists() {
        let server = MockServer::start().await;
        mock_user(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/jane%20doe/lists/ls1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_items_json("tt0000001")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/jane%20doe/lists/ls2/items"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let metas = vec![IdMeta::new("ls1", "ls1"), IdMeta::new("ls2", "ls2")];
        let (lists, delegated) = client(&server).lists_get(&metas).await.unwrap();

        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].ids.slug, "ls1");
        assert_eq!(lists[0].items[0].external_id(), Some("tt0000001"));
        assert_eq!(delegated.len(), 1);
        assert!(matches!(&delegated[0], TraktError::ListNotFound { slug } if slug == "ls2"));
    }

    #[tokio::test]
    async fn test_lists_get_fails_on_other_errors() {
        let server = MockServer::start().await;
        mock_user(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/jane%20doe/lists/ls1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_items_json("tt0000001")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/jane%20doe/lists/ls2/items"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let metas = vec![IdMeta::new("ls1", "ls1"), IdMeta::new("ls2", "ls2")];
        let result = client(&server).with_max_concurrent_fetches(1).lists_get(&metas).await;

        match result {
            Err(TraktError::UnexpectedStatusCode { got, .. }) => assert_eq!(got, StatusCode::FORBIDDEN),
            other => panic!("unexpected result: {:?}", other.map(|(l, d)| (l.len(), d.len()))),
        }
    }

    #[tokio::test]
    async fn test_unexpected_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/watchlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let result = client(&server)
            .watchlist_items_add(&[Item::new("tt0000001", MediaKind::Movie, at)])
            .await;

        match result {
            Err(TraktError::UnexpectedStatusCode { got, want }) => {
                assert_eq!(got, StatusCode::OK);
                assert_eq!(want, vec![StatusCode::CREATED]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ratings_add_sends_rated_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/ratings"))
            .and(body_json(serde_json::json!({
                "movies": [{"ids": {"imdb": "tt0000001"}, "rated_at": "2023-01-01T00:00:00Z", "rating": 8}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "added": {"movies": 1},
                "not_found": {"movies": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let response = client(&server)
            .ratings_add(&[Item::new("tt0000001", MediaKind::Movie, at).with_rating(8)])
            .await
            .unwrap();
        assert_eq!(response.added.movies, 1);
    }

    #[tokio::test]
    async fn test_empty_mutation_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let response = client(&server).history_add(&[]).await.unwrap();
        assert_eq!(response, CrudResponse::default());
    }

    #[tokio::test]
    async fn test_list_add_creates_private_list_once_per_user_lookup() {
        let server = MockServer::start().await;
        mock_user(&server).await;
        Mock::given(method("POST"))
            .and(path("/users/jane%20doe/lists"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        client.list_add("ls1", "Best Films").await.unwrap();
        client.list_add("ls2", "Worst Films").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let create = requests
            .iter()
            .find(|r| r.url.path() == "/users/jane%20doe/lists")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
        assert_eq!(body["name"], "Best Films");
        assert_eq!(body["privacy"], "private");
    }

    #[tokio::test]
    async fn test_history_get_uses_kind_path_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/history/episodes/tt0636289"))
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": 1,
                "watched_at": "2020-01-01T00:00:00.000Z",
                "action": "watch",
                "type": "episode",
                "episode": {"ids": {"imdb": "tt0636289"}},
                "show": {"ids": {"imdb": "tt0411008"}}
            }])))
            .mount(&server)
            .await;

        let entries = client(&server)
            .history_get(MediaKind::Episode, "tt0636289")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].external_id(), Some("tt0636289"));
    }
}
