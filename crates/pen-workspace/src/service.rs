//! Pen service client
//!
//! The service stores pens server-side. Only the calls the editor makes are
//! modelled: create, fetch, update and version migration.

use crate::config::WorkspaceConfig;
use crate::error::ServiceError;
use crate::models::{ApiResponse, CreatePen, Pen, UpdatePen};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Remote pen storage
#[async_trait]
pub trait PenService: Send + Sync {
    /// Create a pen
    async fn save(&self, pen: CreatePen) -> Result<Pen, ServiceError>;

    /// Fetch a pen by id
    async fn get(&self, id: i64) -> Result<Pen, ServiceError>;

    /// Update a pen; returns the service message
    async fn update(&self, id: i64, update: UpdatePen) -> Result<String, ServiceError>;

    /// Snapshot the current version and bump it; returns the service message
    async fn migrate_version(&self, id: i64) -> Result<String, ServiceError>;
}

/// JSON-over-HTTP client
#[derive(Debug, Clone)]
pub struct HttpPenService {
    client: Client,
    base_url: String,
}

impl HttpPenService {
    /// Create client from workspace config
    ///
    /// # Errors
    /// Returns `ServiceError::Network` if the HTTP client cannot be built
    pub fn new(config: &WorkspaceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        // Validation failures come back as 4xx with a normal envelope
        if let Ok(envelope) = serde_json::from_str::<ApiResponse<T>>(&body) {
            if !envelope.success {
                return Ok(envelope);
            }
        }
        Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PenService for HttpPenService {
    async fn save(&self, pen: CreatePen) -> Result<Pen, ServiceError> {
        pen.validate()?;
        let response = self
            .client
            .post(self.url("/pen/create"))
            .json(&pen)
            .send()
            .await?;
        let saved: Pen = Self::read_envelope(response).await?.into_data()?;
        tracing::info!("Saved pen {} ({})", saved.id, saved.title);
        Ok(saved)
    }

    async fn get(&self, id: i64) -> Result<Pen, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/pen/get-pen-byid/{id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(id));
        }
        Self::read_envelope(response).await?.into_data()
    }

    async fn update(&self, id: i64, update: UpdatePen) -> Result<String, ServiceError> {
        update.validate()?;
        let response = self
            .client
            .post(self.url(&format!("/pen/update/{id}")))
            .json(&update)
            .send()
            .await?;
        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(response).await?;
        let message = envelope.message.clone();
        envelope.into_result()?;
        tracing::info!("Updated pen {}", id);
        Ok(message)
    }

    async fn migrate_version(&self, id: i64) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.url(&format!("/pen/migrate-version/{id}")))
            .send()
            .await?;
        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(response).await?;
        let message = envelope.message.clone();
        envelope.into_result()?;
        tracing::info!("Migrated pen {} to a new version", id);
        Ok(message)
    }
}

/// In-process service
///
/// Assigns ids from 1 and bumps `version` on migration. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPenService {
    pens: Arc<Mutex<BTreeMap<i64, Pen>>>,
}

impl MemoryPenService {
    /// Create empty service
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored pens in id order
    #[must_use]
    pub fn pens(&self) -> Vec<Pen> {
        self.pens.lock().values().cloned().collect()
    }
}

#[async_trait]
impl PenService for MemoryPenService {
    async fn save(&self, pen: CreatePen) -> Result<Pen, ServiceError> {
        pen.validate()?;
        let mut pens = self.pens.lock();
        let id = pens.keys().next_back().map_or(1, |last| last + 1);
        let now = chrono::Utc::now();
        let saved = Pen {
            id,
            html: pen.html,
            css: pen.css,
            js: pen.js,
            title: pen.title,
            description: pen.description,
            version: 1,
            author_id: None,
            status: Some("Active".to_string()),
            created_at: Some(now),
            updated_at: Some(now),
        };
        pens.insert(id, saved.clone());
        Ok(saved)
    }

    async fn get(&self, id: i64) -> Result<Pen, ServiceError> {
        self.pens
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ServiceError::NotFound(id))
    }

    async fn update(&self, id: i64, update: UpdatePen) -> Result<String, ServiceError> {
        update.validate()?;
        let mut pens = self.pens.lock();
        let pen = pens.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
        if update.html.is_some() {
            pen.html = update.html;
        }
        if update.css.is_some() {
            pen.css = update.css;
        }
        if update.js.is_some() {
            pen.js = update.js;
        }
        if let Some(title) = update.title {
            pen.title = title;
        }
        if update.description.is_some() {
            pen.description = update.description;
        }
        pen.updated_at = Some(chrono::Utc::now());
        Ok("Pen updated".to_string())
    }

    async fn migrate_version(&self, id: i64) -> Result<String, ServiceError> {
        let mut pens = self.pens.lock();
        let pen = pens.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
        pen.version += 1;
        Ok(format!("Migrated to version {}", pen.version))
    }
}
