#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ApiError;
use crate::domain::models::Session;
use crate::domain::models::SessionApi;
use crate::domain::models::SessionPage;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsResponse {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// HTTP client for the remote session service.
pub struct HttpSessionApi {
    url: String,
    token: String,
    timeout: String,
}

impl Default for HttpSessionApi {
    fn default() -> HttpSessionApi {
        return HttpSessionApi {
            url: Config::get(ConfigKey::ApiURL),
            token: Config::get(ConfigKey::ApiToken),
            timeout: Config::get(ConfigKey::ApiTimeout),
        };
    }
}

impl HttpSessionApi {
    fn request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let builder = builder.timeout(Duration::from_millis(self.timeout.parse::<u64>()?));
        if self.token.is_empty() {
            return Ok(builder);
        }

        return Ok(builder.bearer_auth(&self.token));
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = self
            .request(reqwest::Client::new().get(format!("{url}/v1/health", url = self.url)))?
            .send()
            .await;

        if res.is_err() {
            tracing::error!(error = ?res.unwrap_err(), "Session service is not reachable");
            bail!("Session service is not reachable");
        }

        let res = res.unwrap();
        if res.status() != 200 {
            tracing::error!(status = res.status().as_u16(), "Session service health check failed");
            bail!("Session service health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn list_sessions(
        &self,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<SessionPage> {
        let mut query = vec![("page_size", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("page_token", token));
        }

        let res = self
            .request(reqwest::Client::new().get(format!("{url}/v1/sessions", url = self.url)))?
            .query(&query)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to list sessions");
            return Err(ApiError::Status(res.status().as_u16()).into());
        }

        let body = res.json::<ListSessionsResponse>().await?;

        return Ok(SessionPage {
            sessions: body.sessions,
            next_page_token: body.next_page_token,
        });
    }

    #[allow(clippy::implicit_return)]
    async fn fetch_session(&self, id: &str) -> Result<Session> {
        let res = self
            .request(
                reqwest::Client::new().get(format!("{url}/v1/sessions/{id}", url = self.url)),
            )?
            .send()
            .await?;

        if res.status() == 404 {
            return Err(ApiError::NotFound(id.to_string()).into());
        }

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                session_id = id,
                "Failed to fetch session"
            );
            return Err(ApiError::Status(res.status().as_u16()).into());
        }

        return Ok(res.json::<Session>().await?);
    }

    #[allow(clippy::implicit_return)]
    async fn update_session(&self, session: &Session) -> Result<Session> {
        let res = self
            .request(reqwest::Client::new().patch(format!(
                "{url}/v1/sessions/{id}",
                url = self.url,
                id = session.id
            )))?
            .json(session)
            .send()
            .await?;

        if res.status() == 404 {
            return Err(ApiError::NotFound(session.id.to_string()).into());
        }

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                session_id = session.id,
                "Failed to update session"
            );
            return Err(ApiError::Status(res.status().as_u16()).into());
        }

        return Ok(res.json::<Session>().await?);
    }
}
