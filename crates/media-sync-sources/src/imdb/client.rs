use async_trait::async_trait;
use media_sync_models::{Item, List};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::imdb::page::{extract_list_ids, extract_page_id, extract_title};
use crate::imdb::parser;
use crate::traits::SourceProvider;

pub const IMDB_URL: &str = "https://www.imdb.com";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// IMDb session cookies. Both are needed for account-scoped pages.
#[derive(Debug, Clone)]
pub struct ImdbCookies {
    pub at_main: String,
    pub ubid_main: String,
}

impl ImdbCookies {
    pub fn from_parts(at_main: Option<String>, ubid_main: Option<String>) -> Option<Self> {
        match (at_main, ubid_main) {
            (Some(at_main), Some(ubid_main)) if !at_main.is_empty() && !ubid_main.is_empty() => {
                Some(Self { at_main, ubid_main })
            }
            _ => None,
        }
    }

    fn header_value(&self) -> String {
        format!("at-main={}; ubid-main={}", self.at_main, self.ubid_main)
    }
}

/// Reads lists, the watchlist and ratings from IMDb's CSV exports.
///
/// Exports are downloaded into `export_dir` (one `{id}.csv` per list) and
/// parsed from there.
pub struct ImdbSource {
    client: Client,
    base_url: String,
    authenticated: bool,
    export_dir: PathBuf,
    user_id: OnceCell<String>,
}

impl ImdbSource {
    pub fn new(cookies: Option<ImdbCookies>, export_dir: PathBuf) -> Result<Self, SourceError> {
        Self::with_base_url(IMDB_URL, cookies, export_dir)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        cookies: Option<ImdbCookies>,
        export_dir: PathBuf,
    ) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        if let Some(cookies) = &cookies {
            let value = HeaderValue::from_str(&cookies.header_value())
                .map_err(|e| SourceError::Parse(format!("Invalid IMDb cookie value: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authenticated: cookies.is_some(),
            export_dir,
            user_id: OnceCell::new(),
        })
    }

    fn require_auth(&self, operation: &'static str) -> Result<(), SourceError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(SourceError::NotAuthenticated(operation))
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching IMDb page");
        Ok(self.client.get(&url).send().await?.error_for_status()?)
    }

    async fn get_text(&self, path: &str) -> Result<String, SourceError> {
        Ok(self.get(path).await?.text().await?)
    }

    /// `ur…` id of the signed-in user, taken from where `/profile` redirects
    async fn user_id(&self) -> Result<&str, SourceError> {
        self.user_id
            .get_or_try_init(|| async {
                let response = self.get("/profile").await?;
                let user_id = response
                    .url()
                    .path_segments()
                    .and_then(|mut segments| segments.find(|s| s.starts_with("ur")))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        SourceError::Parse(format!("No user id in profile URL {}", response.url()))
                    })?;
                debug!(user_id = %user_id, "Resolved IMDb user");
                Ok::<_, SourceError>(user_id)
            })
            .await
            .map(String::as_str)
    }

    pub fn export_path(&self, id: &str) -> PathBuf {
        self.export_dir.join(format!("{}.csv", id))
    }

    async fn download(&self, path: &str, destination: &Path) -> Result<(), SourceError> {
        let bytes = self.get(path).await?.bytes().await?;
        tokio::fs::create_dir_all(&self.export_dir).await?;
        tokio::fs::write(destination, &bytes).await?;
        debug!(path = %destination.display(), size = bytes.len(), "Saved IMDb export");
        Ok(())
    }

    async fn read_list(&self, id: &str) -> Result<Vec<Item>, SourceError> {
        let path = self.export_path(id);
        if !path.exists() {
            self.export_list(id).await?;
        }
        parser::parse_list_file(&path)
    }

    async fn list_name(&self, id: &str) -> String {
        match self.get_text(&format!("/list/{}/", id)).await {
            Ok(html) => extract_title(&html).unwrap_or_else(|| id.to_string()),
            Err(e) => {
                warn!(list_id = %id, error = %e, "Could not resolve list name, using id");
                id.to_string()
            }
        }
    }

    async fn discover_lists(&self) -> Result<Vec<String>, SourceError> {
        let user_id = self.user_id().await?;
        let html = self.get_text(&format!("/user/{}/lists", user_id)).await?;
        let ids = extract_list_ids(&html);
        info!(count = ids.len(), "Discovered IMDb lists");
        Ok(ids)
    }
}

#[async_trait]
impl SourceProvider for ImdbSource {
    fn source_name(&self) -> &str {
        "imdb"
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn export_list(&self, id: &str) -> Result<(), SourceError> {
        self.download(&format!("/list/{}/export", id), &self.export_path(id))
            .await?;
        info!(list_id = %id, "Exported IMDb list");
        Ok(())
    }

    async fn get_lists(&self, ids: &[String]) -> Result<Vec<List>, SourceError> {
        let ids = if ids.is_empty() {
            self.require_auth("list discovery")?;
            let discovered = self.discover_lists().await?;
            // Freshly discovered lists have not been exported this run
            for id in &discovered {
                self.export_list(id).await?;
            }
            discovered
        } else {
            ids.to_vec()
        };

        let mut lists = Vec::with_capacity(ids.len());
        for id in &ids {
            let items = self.read_list(id).await?;
            let name = self.list_name(id).await;
            debug!(list_id = %id, name = %name, items = items.len(), "Read IMDb list");
            lists.push(List::new(id.as_str(), name, items));
        }
        Ok(lists)
    }

    async fn get_watchlist(&self) -> Result<List, SourceError> {
        self.require_auth("watchlist")?;
        let user_id = self.user_id().await?;
        let html = self.get_text(&format!("/user/{}/watchlist", user_id)).await?;
        let id = extract_page_id(&html)
            .ok_or_else(|| SourceError::Parse("No list id on watchlist page".to_string()))?;

        self.export_list(&id).await?;
        let items = parser::parse_list_file(self.export_path(&id))?;
        info!(list_id = %id, items = items.len(), "Read IMDb watchlist");
        Ok(List::watchlist(id, items))
    }

    async fn get_ratings(&self) -> Result<Vec<Item>, SourceError> {
        self.require_auth("ratings")?;
        let user_id = self.user_id().await?.to_string();
        let path = self.export_path("ratings");
        self.download(&format!("/user/{}/ratings/export", user_id), &path)
            .await?;
        let bytes = tokio::fs::read(&path).await?;
        parser::parse_ratings_csv(bytes.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_models::MediaKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIST_CSV: &str = "Position,Const,Created,Modified,Description,Title,URL,Title Type,IMDb Rating,Runtime (mins),Year,Genres,Num Votes,Release Date,Directors\n\
1,tt0111161,2020-01-01,2020-01-01,,The Shawshank Redemption,https://www.imdb.com/title/tt0111161/,Movie,9.3,142,1994,Drama,2500000,1994-09-23,Frank Darabont\n";

    const RATINGS_CSV: &str = "Const,Your Rating,Date Rated,Title,URL,Title Type\n\
tt0944947,9,2020-01-02,Game of Thrones,https://www.imdb.com/title/tt0944947/,TV Series\n";

    fn cookies() -> Option<ImdbCookies> {
        ImdbCookies::from_parts(Some("at".to_string()), Some("ubid".to_string()))
    }

    async fn mock_profile(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{}/user/ur1234567/", server.uri())),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/ur1234567/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_cookies_need_both_parts() {
        assert!(ImdbCookies::from_parts(Some("a".to_string()), None).is_none());
        assert!(ImdbCookies::from_parts(Some("a".to_string()), Some(String::new())).is_none());
        assert_eq!(cookies().unwrap().header_value(), "at-main=at; ubid-main=ubid");
    }

    #[tokio::test]
    async fn test_get_lists_by_id_without_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list/ls000000001/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST_CSV))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/ls000000001/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Favourites - IMDb</title>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = ImdbSource::with_base_url(server.uri(), None, dir.path().to_path_buf()).unwrap();
        assert!(!source.is_authenticated());

        let lists = source.get_lists(&["ls000000001".to_string()]).await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Favourites");
        assert_eq!(lists[0].items[0].id, "tt0111161");
        assert!(!lists[0].is_watchlist);
        assert!(dir.path().join("ls000000001.csv").exists());

        // Second read is served from the export cache
        let lists = source.get_lists(&["ls000000001".to_string()]).await.unwrap();
        assert_eq!(lists[0].items.len(), 1);
    }

    #[tokio::test]
    async fn test_account_reads_require_auth() {
        let dir = tempfile::tempdir().unwrap();
        let source = ImdbSource::with_base_url("http://127.0.0.1:9", None, dir.path().to_path_buf()).unwrap();

        assert!(matches!(source.get_ratings().await, Err(SourceError::NotAuthenticated(_))));
        assert!(matches!(source.get_watchlist().await, Err(SourceError::NotAuthenticated(_))));
        assert!(matches!(source.get_lists(&[]).await, Err(SourceError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn test_get_watchlist_resolves_page_id() {
        let server = MockServer::start().await;
        mock_profile(&server).await;
        Mock::given(method("GET"))
            .and(path("/user/ur1234567/watchlist"))
            .and(header("cookie", "at-main=at; ubid-main=ubid"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta property="pageId" content="ls099999999"/></head></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/ls099999999/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST_CSV))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = ImdbSource::with_base_url(server.uri(), cookies(), dir.path().to_path_buf()).unwrap();

        let watchlist = source.get_watchlist().await.unwrap();
        assert!(watchlist.is_watchlist);
        assert_eq!(watchlist.id, "ls099999999");
        assert_eq!(watchlist.items.len(), 1);
    }

    #[tokio::test]
    async fn test_get_ratings() {
        let server = MockServer::start().await;
        mock_profile(&server).await;
        Mock::given(method("GET"))
            .and(path("/user/ur1234567/ratings/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RATINGS_CSV))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = ImdbSource::with_base_url(server.uri(), cookies(), dir.path().to_path_buf()).unwrap();

        let ratings = source.get_ratings().await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].kind, MediaKind::Show);
        assert_eq!(ratings[0].rating, Some(9));
    }

    #[tokio::test]
    async fn test_get_lists_discovers_account_lists() {
        let server = MockServer::start().await;
        mock_profile(&server).await;
        Mock::given(method("GET"))
            .and(path("/user/ur1234567/lists"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/list/ls000000001/">One</a><a href="/list/ls000000002/">Two</a>"#,
            ))
            .mount(&server)
            .await;
        for id in ["ls000000001", "ls000000002"] {
            Mock::given(method("GET"))
                .and(path(format!("/list/{}/export", id)))
                .respond_with(ResponseTemplate::new(200).set_body_string(LIST_CSV))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/list/{}/", id)))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let source = ImdbSource::with_base_url(server.uri(), cookies(), dir.path().to_path_buf()).unwrap();

        let lists = source.get_lists(&[]).await.unwrap();
        assert_eq!(lists.len(), 2);
        // Unresolvable names fall back to the id
        assert_eq!(lists[1].name, "ls000000002");
    }
}
