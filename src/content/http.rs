use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{redirect, Client, Response};

use crate::content::{MediaEvent, PushAck, RemoteSnapshot, SyncEnvelope, ACTION_GET_DATA};
use crate::{ContentService, Error, Result};

/// HTTP client for the bulk content endpoint.
///
/// Pushes do not follow redirects: script-hosted endpoints answer a write with a
/// redirect to a result page, which proves the request arrived but says nothing
/// about whether it was applied. Such answers come back as [`PushAck::Opaque`].
#[derive(Debug, Clone)]
pub struct HttpContentService {
    push_client: Client,
    pull_client: Client,
}

impl HttpContentService {
    pub fn new(timeout: Duration) -> Result<Self> {
        let push_client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        let pull_client = Client::builder().timeout(timeout).build()?;
        Ok(Self { push_client, pull_client })
    }

    async fn write_ack(response: Response) -> Result<PushAck> {
        let status = response.status();
        if status.is_success() {
            Ok(PushAck::Confirmed)
        } else if status.is_redirection() {
            Ok(PushAck::Opaque)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Error::Remote(format!("{} {}", status, text.trim())))
        }
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn push(&self, endpoint: &str, envelope: &SyncEnvelope) -> Result<PushAck> {
        debug!("Publishing snapshot to {}", endpoint);
        let response = self.push_client.post(endpoint).json(envelope).send().await?;
        Self::write_ack(response).await
    }

    async fn pull(&self, endpoint: &str) -> Result<RemoteSnapshot> {
        debug!("Fetching snapshot from {}", endpoint);
        let response = self
            .pull_client
            .get(endpoint)
            .query(&[("action", ACTION_GET_DATA)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Remote(format!("{} {}", status, text.trim())));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn notify_media(&self, endpoint: &str, event: &MediaEvent) -> Result<()> {
        let response = self.push_client.post(endpoint).json(event).send().await?;
        Self::write_ack(response).await.map(|_| ())
    }
}
