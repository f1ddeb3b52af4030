//! Minimal Bluesky (AT protocol) client.
//!
//! Logs in with an app password via `com.atproto.server.createSession`
//! and publishes posts via `com.atproto.repo.createRecord`. Replies carry
//! `{root, parent}` refs so follow-ups land in the same thread.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::post::{PostError, PostRef};

pub const PLATFORM: &str = "bluesky";
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

#[derive(Debug, Clone)]
pub struct BlueskyConfig {
    pub handle: String,
    pub app_password: String,
    pub service_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: String,
}

pub struct BlueskyClient {
    config: BlueskyConfig,
    client: Client,
    session: Option<Session>,
}

impl BlueskyClient {
    pub fn new(config: BlueskyConfig) -> Result<Self, PostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PostError::Network(e.to_string()))?;
        Ok(Self {
            config,
            client,
            session: None,
        })
    }

    /// Create (or recreate) an authenticated session.
    pub async fn login(&mut self) -> Result<(), PostError> {
        let url = format!(
            "{}/xrpc/com.atproto.server.createSession",
            self.config.service_url.trim_end_matches('/')
        );
        let body = json!({
            "identifier": self.config.handle,
            "password": self.config.app_password,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PostError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(PostError::Authentication(format!(
                "createSession returned {}: {}",
                status, text
            )));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| PostError::Network(e.to_string()))?;

        info!(handle = %self.config.handle, did = %session.did, "Bluesky session established");
        self.session = Some(session);
        Ok(())
    }

    /// Publish a post, optionally as a reply. Retries once after a
    /// re-login when the access token has expired.
    pub async fn post(
        &mut self,
        text: &str,
        reply_to: Option<&PostRef>,
    ) -> Result<PostRef, PostError> {
        if self.session.is_none() {
            self.login().await?;
        }

        match self.create_record(text, reply_to).await {
            Err(PostError::Authentication(msg)) => {
                warn!(error = %msg, "Bluesky token rejected - re-authenticating");
                self.login().await?;
                self.create_record(text, reply_to).await
            }
            other => other,
        }
    }

    async fn create_record(
        &self,
        text: &str,
        reply_to: Option<&PostRef>,
    ) -> Result<PostRef, PostError> {
        let session = self.session.as_ref().ok_or_else(|| {
            PostError::Authentication("no active Bluesky session".to_string())
        })?;

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339(),
        });

        // Replies chain directly off the thread root.
        if let Some(parent) = reply_to {
            let subject = json!({"uri": parent.uri, "cid": parent.cid});
            record["reply"] = json!({"root": subject, "parent": subject});
        }

        let url = format!(
            "{}/xrpc/com.atproto.repo.createRecord",
            self.config.service_url.trim_end_matches('/')
        );
        let body = json!({
            "repo": session.did,
            "collection": "app.bsky.feed.post",
            "record": record,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| PostError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            let text = response.text().await.unwrap_or_default();
            return Err(PostError::Authentication(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PostError::Rejected {
                status_code: status.as_u16(),
                message: text,
            });
        }

        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| PostError::Network(e.to_string()))?;

        debug!(uri = %created.uri, "Bluesky post created");
        Ok(PostRef {
            platform: PLATFORM.to_string(),
            uri: created.uri,
            cid: created.cid,
        })
    }
}
