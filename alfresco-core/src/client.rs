use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const API_PREFIX: [&str; 7] = [
    "alfresco",
    "api",
    "-default-",
    "public",
    "alfresco",
    "versions",
    "1",
];
const CURRENT_PERSON: &str = "-me-";
pub const DOCUMENT_LIBRARY: &str = "documentLibrary";
const SITES_FOLDER: &str = "Sites";

#[derive(Debug, Error)]
pub enum AlfrescoError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry a path: {0}")]
    CannotBeABase(Url),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct AlfrescoClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
}

impl AlfrescoClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, AlfrescoError> {
        Self::with_http(Client::new(), base_url, credentials)
    }

    pub fn with_http(
        http: Client,
        base_url: &str,
        credentials: Credentials,
    ) -> Result<Self, AlfrescoError> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches a node including its ancestor path.
    pub async fn get_node(&self, node_id: &str) -> Result<Node, AlfrescoError> {
        let mut url = self.endpoint(&["nodes", node_id])?;
        url.query_pairs_mut().append_pair("include", "path");
        let response = self.get(url).send().await?;
        let payload: Entry<Node> = Self::handle_response(response).await?;
        Ok(payload.entry)
    }

    pub async fn list_children(
        &self,
        node_id: &str,
        skip_count: u32,
        max_items: u32,
    ) -> Result<Page<Node>, AlfrescoError> {
        let mut url = self.endpoint(&["nodes", node_id, "children"])?;
        url.query_pairs_mut()
            .append_pair("skipCount", &skip_count.to_string())
            .append_pair("maxItems", &max_items.to_string());
        let response = self.get(url).send().await?;
        let payload: ListResponse<Node> = Self::handle_response(response).await?;
        Ok(payload.into_page())
    }

    pub async fn list_children_all(
        &self,
        node_id: &str,
        page_size: u32,
    ) -> Result<Vec<Node>, AlfrescoError> {
        let page_size = page_size.max(1);
        let mut skip = 0u32;
        let mut items = Vec::new();
        loop {
            let page = self.list_children(node_id, skip, page_size).await?;
            let fetched = page.items.len() as u32;
            skip = skip.saturating_add(fetched);
            let more = page.pagination.has_more_items;
            items.extend(page.items);
            if !more || fetched == 0 {
                break;
            }
        }
        Ok(items)
    }

    /// Lists the sites the authenticated user is a member of.
    pub async fn list_site_memberships(
        &self,
        skip_count: u32,
        max_items: u32,
    ) -> Result<Page<SiteMembership>, AlfrescoError> {
        let mut url = self.endpoint(&["people", CURRENT_PERSON, "sites"])?;
        url.query_pairs_mut()
            .append_pair("skipCount", &skip_count.to_string())
            .append_pair("maxItems", &max_items.to_string());
        let response = self.get(url).send().await?;
        let payload: ListResponse<SiteMembership> = Self::handle_response(response).await?;
        Ok(payload.into_page())
    }

    pub async fn list_sites_all(&self, page_size: u32) -> Result<Vec<Site>, AlfrescoError> {
        let page_size = page_size.max(1);
        let mut skip = 0u32;
        let mut sites = Vec::new();
        loop {
            let page = self.list_site_memberships(skip, page_size).await?;
            let fetched = page.items.len() as u32;
            skip = skip.saturating_add(fetched);
            let more = page.pagination.has_more_items;
            sites.extend(page.items.into_iter().map(|membership| membership.site));
            if !more || fetched == 0 {
                break;
            }
        }
        Ok(sites)
    }

    pub async fn get_site_container(
        &self,
        site_id: &str,
        container_id: &str,
    ) -> Result<SiteContainer, AlfrescoError> {
        let url = self.endpoint(&["sites", site_id, "containers", container_id])?;
        let response = self.get(url).send().await?;
        let payload: Entry<SiteContainer> = Self::handle_response(response).await?;
        Ok(payload.entry)
    }

    /// Lists the top-level nodes of a site's document library.
    pub async fn list_site_roots(
        &self,
        site_id: &str,
        page_size: u32,
    ) -> Result<Vec<Node>, AlfrescoError> {
        let container = self.get_site_container(site_id, DOCUMENT_LIBRARY).await?;
        self.list_children_all(&container.id, page_size).await
    }

    /// Opens the content stream of a file node. The caller consumes the body.
    pub async fn get_content(&self, node_id: &str) -> Result<reqwest::Response, AlfrescoError> {
        let url = self.endpoint(&["nodes", node_id, "content"])?;
        let response = self.get(url).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.http.get(url).basic_auth(
            &self.credentials.username,
            Some(&self.credentials.password),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AlfrescoError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AlfrescoError::CannotBeABase(self.base_url.clone()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AlfrescoError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> AlfrescoError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        AlfrescoError::Api { status, body }
    }
}

impl AlfrescoError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            AlfrescoError::Api { status, .. } => classify_api_status(*status),
            AlfrescoError::Request(err) if err.is_timeout() || err.is_connect() => {
                ApiErrorClass::Transient
            }
            AlfrescoError::Request(err) if err.is_decode() || err.is_builder() => {
                ApiErrorClass::Permanent
            }
            AlfrescoError::Request(_) => ApiErrorClass::Transient,
            AlfrescoError::Url(_) | AlfrescoError::CannotBeABase(_) => ApiErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            ApiErrorClass::RateLimit | ApiErrorClass::Transient
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub content: Option<ContentInfo>,
    #[serde(default)]
    pub path: Option<PathInfo>,
}

impl Node {
    pub fn size(&self) -> Option<u64> {
        self.content.as_ref().map(|content| content.size_in_bytes)
    }

    /// Short name of the site whose document library directly contains this node.
    ///
    /// Only known when the node was fetched with its path included.
    pub fn site_root_of(&self) -> Option<&str> {
        let elements = &self.path.as_ref()?.elements;
        let [.., sites, site, library] = elements.as_slice() else {
            return None;
        };
        let in_library = self
            .parent_id
            .as_deref()
            .is_none_or(|parent| parent == library.id);
        if sites.name == SITES_FOLDER && library.name == DOCUMENT_LIBRARY && in_library {
            Some(&site.name)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_in_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub elements: Vec<PathElement>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathElement {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SiteMembership {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub site: Site,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteContainer {
    pub id: String,
    pub folder_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub count: u32,
    #[serde(default)]
    pub has_more_items: bool,
    #[serde(default)]
    pub total_items: Option<u32>,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub max_items: u32,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Entry<T> {
    entry: T,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    list: EntryList<T>,
}

#[derive(Debug, Deserialize)]
struct EntryList<T> {
    pagination: Pagination,
    #[serde(default = "Vec::new")]
    entries: Vec<Entry<T>>,
}

impl<T> ListResponse<T> {
    fn into_page(self) -> Page<T> {
        Page {
            items: self.list.entries.into_iter().map(|e| e.entry).collect(),
            pagination: self.list.pagination,
        }
    }
}
