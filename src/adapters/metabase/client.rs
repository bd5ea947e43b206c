//! Metabase HTTP client
//!
//! Implements [`InstanceClient`] against the Metabase REST API with
//! session-token authentication.

use super::models::{
    strip_server_managed, CollectionItem, CollectionItemsResponse, CollectionSummary,
    CreatedResponse, GridPosition, SessionRequest, SessionResponse, SERVER_MANAGED_CARD_FIELDS,
    SERVER_MANAGED_FIELDS, SESSION_HEADER,
};
use crate::adapters::instance::{
    Created, DatabaseMetadata, InstanceClient, InstanceResult, ListedEntity, RootFilter,
};
use crate::config::{InstanceConfig, RetryConfig, SecretString};
use crate::domain::{Dashboard, Entity, EntityId, EntityKind, EntityRef, InstanceError};
use crate::log_retry_attempt;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;

/// Metabase instance client
///
/// Logs in lazily on the first request and keeps the session token for
/// later requests. A `401` response triggers exactly one re-login.
///
/// Reads are retried on transient failures. Creations are only retried
/// when the connection could not be established, since any other failure
/// may have left an entity behind on the server.
pub struct MetabaseClient {
    /// Base URL without trailing slash
    base_url: String,

    /// HTTP client for making requests
    client: Client,

    username: String,
    password: SecretString,

    /// Session token (if logged in)
    session: RwLock<Option<String>>,

    retry: RetryConfig,
}

impl MetabaseClient {
    /// Create a new client from instance configuration
    ///
    /// No request is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if no password is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &InstanceConfig) -> InstanceResult<Self> {
        let password = config.password.clone().ok_or_else(|| {
            InstanceError::AuthenticationFailed(format!(
                "No password configured for {}",
                config.base_url
            ))
        })?;

        let mut client_builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            tracing::warn!(
                base_url = %config.base_url,
                "TLS certificate verification disabled"
            );
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder.build().map_err(|e| {
            InstanceError::ConnectionFailed(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            username: config.username.clone(),
            password,
            session: RwLock::new(None),
            retry: config.retry.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and store a fresh session token
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if the server rejects the credentials.
    pub async fn login(&self) -> InstanceResult<String> {
        tracing::debug!(base_url = %self.base_url, user = %self.username, "Logging in");

        let body = SessionRequest {
            username: &self.username,
            password: self.password.expose_secret().as_ref(),
        };
        let response = self
            .client
            .post(self.url("/api/session"))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(InstanceError::AuthenticationFailed(format!(
                "{} rejected the credentials for {}",
                self.base_url, self.username
            )));
        }

        let session: SessionResponse = serde_json::from_value(read_body(response).await?)
            .map_err(|e| InstanceError::InvalidResponse(format!("Invalid session response: {e}")))?;

        *self.session.write().await = Some(session.id.clone());
        Ok(session.id)
    }

    async fn session_token(&self) -> InstanceResult<String> {
        if let Some(token) = self.session.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> InstanceResult<Response> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(SESSION_HEADER, token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(map_send_error)
    }

    /// One request, with a single re-login when the session has expired
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> InstanceResult<Value> {
        let token = self.session_token().await?;
        let response = self.send_once(method.clone(), path, body, &token).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(base_url = %self.base_url, "Session expired, logging in again");
            let token = self.login().await?;
            self.send_once(method, path, body, &token).await?
        } else {
            response
        };

        read_body(response).await
    }

    /// Retry a request with exponential backoff while `retryable` accepts the error
    async fn retry_request<F, Fut, T>(
        &self,
        retryable: fn(&InstanceError) -> bool,
        operation: F,
    ) -> InstanceResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = InstanceResult<T>>,
    {
        let max_attempts = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts || !retryable(&e) {
                        return Err(e);
                    }

                    log_retry_attempt!(attempt, max_attempts, e);
                    tokio::time::sleep(Duration::from_millis(self.retry.delay_ms(attempt))).await;
                }
            }
        }
    }

    async fn get(&self, path: &str) -> InstanceResult<Value> {
        self.retry_request(InstanceError::is_transient, || {
            self.execute(Method::GET, path, None)
        })
        .await
    }

    async fn write(&self, method: Method, path: &str, body: &Value) -> InstanceResult<Value> {
        self.retry_request(
            |e| matches!(e, InstanceError::ConnectionFailed(_)),
            || self.execute(method.clone(), path, Some(body)),
        )
        .await
    }

    async fn post_for_id(&self, path: &str, payload: &Value) -> InstanceResult<EntityId> {
        let response = self.write(Method::POST, path, payload).await?;
        let created: CreatedResponse = serde_json::from_value(response)
            .map_err(|e| InstanceError::InvalidResponse(format!("Missing id in response: {e}")))?;
        EntityId::new(created.id).map_err(InstanceError::InvalidResponse)
    }

    async fn create_dashboard(&self, dashboard: &Dashboard, payload: Value) -> InstanceResult<Created> {
        let id = self.post_for_id("/api/dashboard", &payload).await?;
        if dashboard.cards.is_empty() {
            return Ok(Created::new(id));
        }

        let children = self.put_cards(id, dashboard).await.map_err(|e| {
            tracing::error!(
                dashboard_id = %id,
                error = %e,
                "Dashboard created but its cards could not be attached"
            );
            InstanceError::PartiallyCreated {
                id,
                message: format!("cards not attached: {e}"),
            }
        })?;

        Ok(Created { id, children })
    }

    async fn put_cards(&self, id: EntityId, dashboard: &Dashboard) -> InstanceResult<Vec<(i64, EntityId)>> {
        let submitted: Vec<Value> = dashboard
            .cards
            .iter()
            .map(|card| {
                let mut card_payload = card.to_json();
                strip_server_managed(&mut card_payload, SERVER_MANAGED_CARD_FIELDS);
                card_payload
            })
            .collect();

        let path = format!("/api/dashboard/{id}/cards");
        let response = self
            .write(Method::PUT, &path, &json!({ "cards": submitted }))
            .await?;

        let returned = match returned_cards(&response) {
            Some(cards) => cards,
            None => {
                let dashboard = self.get(&format!("/api/dashboard/{id}")).await?;
                returned_cards(&dashboard).unwrap_or_default()
            }
        };

        Ok(pair_placements(&submitted, &returned))
    }

    async fn find_existing_collection(
        &self,
        name: &str,
        parent: Option<EntityId>,
    ) -> InstanceResult<Option<EntityId>> {
        let collections: Vec<CollectionSummary> = serde_json::from_value(self.get("/api/collection").await?)
            .map_err(|e| InstanceError::InvalidResponse(e.to_string()))?;

        let wanted_location = match parent {
            Some(parent) => format!("/{parent}/"),
            None => "/".to_string(),
        };

        Ok(collections
            .into_iter()
            .filter(|c| !c.archived && c.name == name)
            .filter(|c| {
                let location = c.location.as_deref().unwrap_or("/");
                match parent {
                    Some(_) => location.ends_with(&wanted_location),
                    None => location == "/",
                }
            })
            .find_map(|c| EntityId::from_json(&c.id)))
    }

    async fn find_existing_item(
        &self,
        kind: EntityKind,
        name: &str,
        collection: Option<EntityId>,
    ) -> InstanceResult<Option<EntityId>> {
        let model = match kind {
            EntityKind::Dashboard => "dashboard",
            _ => "card",
        };
        let collection = collection.map_or_else(|| "root".to_string(), |id| id.to_string());
        let existing = self
            .collection_items(&collection, &[model])
            .await?
            .into_iter()
            .find(|item| item.kind() == Some(kind) && item.name == name);
        Ok(existing.and_then(|item| EntityId::from_json(&item.id)))
    }

    async fn collection_items(
        &self,
        collection: &str,
        models: &[&str],
    ) -> InstanceResult<Vec<CollectionItem>> {
        let query: Vec<String> = models.iter().map(|m| format!("models={m}")).collect();
        let path = format!("/api/collection/{collection}/items?{}", query.join("&"));
        let response: CollectionItemsResponse = serde_json::from_value(self.get(&path).await?)
            .map_err(|e| InstanceError::InvalidResponse(format!("Invalid collection items: {e}")))?;
        Ok(response.into_items())
    }
}

#[async_trait]
impl InstanceClient for MetabaseClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_entity(&self, reference: EntityRef) -> InstanceResult<Entity> {
        let path = match reference.kind {
            EntityKind::Collection => format!("/api/collection/{}", reference.id),
            EntityKind::Question => format!("/api/card/{}", reference.id),
            EntityKind::Dashboard => format!("/api/dashboard/{}", reference.id),
            EntityKind::Card => {
                return Err(InstanceError::Unsupported(format!(
                    "{reference} can only be copied with its dashboard"
                )))
            }
        };

        tracing::debug!(entity = %reference, path = %path, "Fetching entity");

        let value = self.get(&path).await.map_err(|e| match e {
            InstanceError::ClientError { status: 404, .. } => InstanceError::NotFound(reference),
            other => other,
        })?;

        Entity::from_json(reference.kind, &value).map_err(InstanceError::InvalidResponse)
    }

    async fn create_entity(&self, entity: &Entity) -> InstanceResult<Created> {
        let mut payload = entity.to_json();
        strip_server_managed(&mut payload, SERVER_MANAGED_FIELDS);

        match entity {
            Entity::Collection(_) => Ok(Created::new(
                self.post_for_id("/api/collection", &payload).await?,
            )),
            Entity::Question(_) => Ok(Created::new(self.post_for_id("/api/card", &payload).await?)),
            Entity::Dashboard(dashboard) => self.create_dashboard(dashboard, payload).await,
        }
    }

    async fn list_items(&self, filter: RootFilter) -> InstanceResult<Vec<ListedEntity>> {
        let models: &[&str] = match filter {
            RootFilter::DashboardsInCollection(_) => &["dashboard"],
            RootFilter::QuestionsInCollection(_) => &["card", "dataset", "metric"],
            RootFilter::CollectionItems(_) => &["collection", "dashboard", "card", "dataset", "metric"],
        };

        let items = self
            .collection_items(&filter.collection().to_string(), models)
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let kind = item.kind().filter(|k| filter.accepts(*k))?;
                let id = EntityId::from_json(&item.id)?;
                Some(ListedEntity {
                    reference: EntityRef::new(kind, id),
                    name: item.name,
                })
            })
            .collect())
    }

    async fn database_metadata(&self, id: u64) -> InstanceResult<DatabaseMetadata> {
        let value = self
            .get(&format!("/api/database/{id}?include=tables.fields"))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| InstanceError::InvalidResponse(format!("Invalid database metadata: {e}")))
    }

    async fn find_existing(&self, entity: &Entity) -> InstanceResult<Option<EntityId>> {
        match entity {
            Entity::Collection(c) => self.find_existing_collection(&c.name, c.parent).await,
            Entity::Question(q) => {
                self.find_existing_item(EntityKind::Question, &q.name, q.collection)
                    .await
            }
            Entity::Dashboard(d) => {
                self.find_existing_item(EntityKind::Dashboard, &d.name, d.collection)
                    .await
            }
        }
    }

    async fn attach_cards(
        &self,
        dashboard: EntityId,
        content: &Dashboard,
    ) -> InstanceResult<Vec<(i64, EntityId)>> {
        tracing::info!(dashboard_id = %dashboard, cards = content.cards.len(), "Attaching dashboard cards");
        self.put_cards(dashboard, content).await
    }
}

fn map_send_error(e: reqwest::Error) -> InstanceError {
    if e.is_timeout() {
        InstanceError::Timeout(e.to_string())
    } else if e.is_connect() {
        InstanceError::ConnectionFailed(e.to_string())
    } else {
        InstanceError::InvalidResponse(format!("Request failed: {e}"))
    }
}

async fn read_body(response: Response) -> InstanceResult<Value> {
    let status = response.status();
    let text = response.text().await.map_err(map_send_error)?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text)
            .map_err(|e| InstanceError::InvalidResponse(format!("Invalid JSON: {e}")));
    }

    if status.is_server_error() {
        Err(InstanceError::ServerError {
            status: status.as_u16(),
            message: text,
        })
    } else {
        Err(InstanceError::ClientError {
            status: status.as_u16(),
            message: text,
        })
    }
}

/// Placements in a cards response: `{cards: [...]}`, `{dashcards: [...]}` or a bare list
fn returned_cards(response: &Value) -> Option<Vec<Value>> {
    let cards = match response {
        Value::Array(cards) => cards,
        Value::Object(map) => map
            .get("cards")
            .or_else(|| map.get("dashcards"))
            .or_else(|| map.get("ordered_cards"))?
            .as_array()?,
        _ => return None,
    };
    Some(cards.clone())
}

/// Pairs each submitted placement with the returned placement at the same grid position
fn pair_placements(submitted: &[Value], returned: &[Value]) -> Vec<(i64, EntityId)> {
    let mut used = vec![false; returned.len()];
    let mut pairs = Vec::new();

    for card in submitted {
        let (Some(placeholder), Some(position)) =
            (card.get("id").and_then(Value::as_i64), GridPosition::of(card))
        else {
            continue;
        };

        let matched = returned.iter().enumerate().find(|(index, candidate)| {
            !used[*index] && GridPosition::of(candidate) == Some(position)
        });

        match matched.and_then(|(index, candidate)| {
            candidate
                .get("id")
                .and_then(EntityId::from_json)
                .map(|id| (index, id))
        }) {
            Some((index, id)) => {
                used[index] = true;
                pairs.push((placeholder, id));
            }
            None => tracing::warn!(
                placeholder = placeholder,
                "No returned dashboard card at the submitted grid position"
            ),
        }
    }

    pairs
}
