use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::tool_protocol::{
    Credential, ExecuteRequest, ExecutionReply, ToolDescriptor, ToolListing,
};

/// Wire access to tool servers. Both tool clients go through this seam, so
/// tests can swap the network for a scripted server.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// `GET {base_url}/tools`
    async fn list_tools(
        &self,
        base_url: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ToolDescriptor>>;

    /// `POST {base_url}/tools/{tool_id}/execute`
    async fn execute(
        &self,
        base_url: &str,
        tool_id: &str,
        parameters: &Value,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply>;

    /// `GET {base_url}/tools/{tool_id}/executions/{execution_id}`
    async fn poll(
        &self,
        base_url: &str,
        tool_id: &str,
        execution_id: &str,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply>;
}

/// HTTP implementation of [`ToolTransport`].
#[derive(Clone)]
pub struct HttpToolTransport {
    client: Client,
}

impl HttpToolTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(request_timeout)
                .build()
                .context("Failed to build HTTP client")?,
        })
    }

    fn authorize(req: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential {
            Some(cred) => req.bearer_auth(cred.expose()),
            None => req,
        }
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("{status}: {body}");
        }
        resp.json::<T>()
            .await
            .context("Failed to parse tool server response")
    }
}

/// Append path segments to a base URL, percent-encoding each one.
pub fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("Invalid tool server URL '{base_url}'"))?;
    url.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("Tool server URL '{base_url}' cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl ToolTransport for HttpToolTransport {
    async fn list_tools(
        &self,
        base_url: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ToolDescriptor>> {
        let url = endpoint(base_url, &["tools"])?;
        debug!(url = %url, "Listing tools");
        let resp = Self::authorize(self.client.get(url), credential)
            .send()
            .await
            .context("Failed to reach tool server")?;
        let listing: ToolListing = Self::read_json(resp).await?;
        Ok(listing.into_descriptors())
    }

    async fn execute(
        &self,
        base_url: &str,
        tool_id: &str,
        parameters: &Value,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply> {
        let url = endpoint(base_url, &["tools", tool_id, "execute"])?;
        debug!(url = %url, "Dispatching tool execution");
        let req = self.client.post(url).json(&ExecuteRequest { parameters });
        let resp = Self::authorize(req, credential)
            .send()
            .await
            .context("Failed to reach tool server")?;
        Self::read_json(resp).await
    }

    async fn poll(
        &self,
        base_url: &str,
        tool_id: &str,
        execution_id: &str,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply> {
        let url = endpoint(base_url, &["tools", tool_id, "executions", execution_id])?;
        let resp = Self::authorize(self.client.get(url), credential)
            .send()
            .await
            .context("Failed to check execution status")?;
        Self::read_json(resp).await
    }
}
