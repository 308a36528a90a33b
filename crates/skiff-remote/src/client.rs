//! The [`RemoteAuthority`] trait and its HTTP implementation.
//!
//! The orchestrator talks only to the trait; [`HttpAuthority`] is the
//! production implementation and tests substitute in-memory fakes. One
//! endpoint per operation, JSON bodies, camelCase field names.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::{debug, instrument};

use skiff_core::Command;

use crate::errors::{RemoteError, Result};
use crate::types::{
    ChangeNotification, CommandBatchRequest, CommandBatchResponse, FolderListing,
    NotificationAckRequest, TaskRow,
};

/// The abstract remote authority the engine reconciles against.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Submit one batch of commands in queue order.
    async fn submit_commands(
        &self,
        user_id: &str,
        commands: &[Command],
    ) -> Result<CommandBatchResponse>;

    /// Echo fetch: pull the authoritative row for one entity.
    async fn fetch_task(&self, user_id: &str, task_id: &str) -> Result<Option<TaskRow>>;

    /// Pull all rows modified at/after `since`; `None` means full snapshot.
    async fn pull_changes(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskRow>>;

    /// Pull out-of-band change notifications since `since`.
    async fn pull_notifications(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangeNotification>>;

    /// Mark notifications as delivered.
    async fn acknowledge_notifications(&self, user_id: &str, ids: &[String]) -> Result<()>;

    /// List the user's folders with the listing's version token.
    async fn list_folders(&self, user_id: &str) -> Result<FolderListing>;
}

/// HTTP implementation of [`RemoteAuthority`].
pub struct HttpAuthority {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthority {
    /// Create a client against `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            client: reqwest::Client::new(),
        }
    }

    /// Create with a shared HTTP client (tests, connection reuse).
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn check_status(status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(RemoteError::UnexpectedStatus { status })
        }
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        let _ = url.pop();
    }
    url
}

fn since_query(since: Option<DateTime<Utc>>) -> Vec<(&'static str, String)> {
    since
        .map(|at| vec![("since", at.to_rfc3339())])
        .unwrap_or_default()
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    #[instrument(skip(self, commands), fields(user_id, count = commands.len()))]
    async fn submit_commands(
        &self,
        user_id: &str,
        commands: &[Command],
    ) -> Result<CommandBatchResponse> {
        let request = CommandBatchRequest {
            user_id: user_id.to_string(),
            commands: commands.to_vec(),
        };
        let response = self
            .client
            .post(self.url("/v1/commands"))
            .json(&request)
            .send()
            .await?;
        Self::check_status(response.status())?;
        let body: CommandBatchResponse = response.json().await?;
        debug!(
            succeeded = body.succeeded.len(),
            conflicts = body.conflicts.len(),
            "command batch submitted"
        );
        Ok(body)
    }

    #[instrument(skip(self), fields(user_id, task_id))]
    async fn fetch_task(&self, user_id: &str, task_id: &str) -> Result<Option<TaskRow>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/tasks/{task_id}")))
            .query(&[("userId", user_id)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(response.status())?;
        Ok(Some(response.json().await?))
    }

    #[instrument(skip(self), fields(user_id, full = since.is_none()))]
    async fn pull_changes(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskRow>> {
        let mut query = vec![("userId", user_id.to_string())];
        query.extend(since_query(since));
        let response = self
            .client
            .get(self.url("/v1/changes"))
            .query(&query)
            .send()
            .await?;
        Self::check_status(response.status())?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self), fields(user_id))]
    async fn pull_notifications(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangeNotification>> {
        let mut query = vec![("userId", user_id.to_string())];
        query.extend(since_query(since));
        let response = self
            .client
            .get(self.url("/v1/notifications"))
            .query(&query)
            .send()
            .await?;
        Self::check_status(response.status())?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, ids), fields(user_id, count = ids.len()))]
    async fn acknowledge_notifications(&self, user_id: &str, ids: &[String]) -> Result<()> {
        let request = NotificationAckRequest {
            user_id: user_id.to_string(),
            notification_ids: ids.to_vec(),
        };
        let response = self
            .client
            .post(self.url("/v1/notifications/ack"))
            .json(&request)
            .send()
            .await?;
        Self::check_status(response.status())
    }

    #[instrument(skip(self), fields(user_id))]
    async fn list_folders(&self, user_id: &str) -> Result<FolderListing> {
        let response = self
            .client
            .get(self.url("/v1/folders"))
            .query(&[("userId", user_id)])
            .send()
            .await?;
        Self::check_status(response.status())?;
        Ok(response.json().await?)
    }
}
