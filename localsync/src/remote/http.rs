//! HTTP remote
//!
//! JSON client for one REST resource (`{base}/v3/{resource}`). Transport
//! failures and 5xx answers surface as `RemoteUnreachable`; 4xx answers as
//! `ConflictOnMutation`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;

use super::{CreateRequest, CreateResponse, RemoteItem, ValueRequest};
use crate::collection::{Category, Item, RemoteService, SyncState, Visibility};
use crate::error::{AppError, Result};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    resource: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, resource: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("localsync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            resource: resource.trim_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/v3/{}", self.base_url, self.resource)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        Ok(response.error_for_status()?)
    }

    async fn fetch_items(&self, builder: RequestBuilder) -> Result<Vec<Item>> {
        let items: Vec<RemoteItem> = self.send(builder).await?.json().await?;
        Ok(items.into_iter().map(Item::from).collect())
    }
}

#[async_trait]
impl RemoteService<Item> for HttpRemote {
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<Item>> {
        tracing::debug!("GET {} (limit {}, offset {})", self.collection_url(), limit, offset);

        let builder = self
            .request(Method::GET, &self.collection_url())
            .query(&[("limit", limit), ("offset", offset)]);
        self.fetch_items(builder).await
    }

    async fn create(&self, content: &str) -> Result<Item> {
        let body = CreateRequest {
            content,
            visibility: Visibility::Private,
            category: Category::Manual,
        };

        let builder = self.request(Method::POST, &self.collection_url()).json(&body);
        let created: CreateResponse = self.send(builder).await?.json().await?;

        tracing::info!("Remote created item: {}", created.id);

        let now = Utc::now();
        Ok(Item {
            id: created.id,
            created_at: now,
            updated_at: now,
            tags: Default::default(),
            category: Category::Manual,
            content: content.to_string(),
            visibility: Visibility::Private,
            sync_state: SyncState::Synced,
        })
    }

    async fn update_content(&self, id: &str, content: &str) -> Result<()> {
        let builder = self
            .request(Method::PATCH, &self.item_url(id))
            .json(&ValueRequest { value: content });
        self.send(builder).await?;
        Ok(())
    }

    async fn update_visibility(&self, id: &str, visibility: Visibility) -> Result<()> {
        let url = format!("{}/visibility", self.item_url(id));
        let builder = self.request(Method::PATCH, &url).json(&ValueRequest {
            value: visibility.as_str(),
        });
        self.send(builder).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.item_url(id)))
            .await?;
        tracing::debug!("Remote deleted item: {}", id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.collection_url()))
            .await?;
        tracing::info!("Remote deleted all items in {}", self.resource);
        Ok(())
    }

    async fn set_all_visibility(&self, visibility: Visibility) -> Result<()> {
        let url = format!("{}/visibility", self.collection_url());
        let builder = self.request(Method::PATCH, &url).json(&ValueRequest {
            value: visibility.as_str(),
        });
        self.send(builder).await?;
        Ok(())
    }

    async fn search(&self, text: &str, page: usize, per_page: usize) -> Result<Vec<Item>> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Search text cannot be empty".to_string()));
        }

        let url = format!("{}/search", self.collection_url());
        let builder = self.request(Method::GET, &url).query(&[
            ("query", text.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ]);
        self.fetch_items(builder).await
    }
}
