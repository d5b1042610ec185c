//! The backend seam: every controller talks to the API through
//! [`BackendGateway`]; [`HttpGateway`] is the `reqwest` implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{EnvironmentId, InteractionKind, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        EnableTwoFactorRequest, Environment, InteractionUpdate, NewRuleset, Paginated, Profile,
        Ruleset, Settings, Tag, TwoFactorProvisioning, TwoFactorStatus,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ClientError, Result},
    pagination::SkipTake,
    upload::{ImageResource, ImageUpload},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_IMAGE_TYPE: &str = "image/png";

#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile>;
    async fn fetch_settings(&self) -> Result<Settings>;
    async fn update_settings(&self, settings: &Settings) -> Result<()>;

    /// `Ok(None)` when the user has no avatar (204).
    async fn fetch_avatar(&self, user_id: UserId) -> Result<Option<ImageResource>>;
    async fn upload_avatar(&self, upload: ImageUpload) -> Result<()>;
    async fn fetch_banner(&self, user_id: UserId) -> Result<Option<ImageResource>>;
    async fn fetch_logo(&self, environment_id: EnvironmentId) -> Result<Option<ImageResource>>;
    async fn upload_logo(&self, environment_id: EnvironmentId, upload: ImageUpload) -> Result<()>;

    async fn set_interaction(
        &self,
        environment_id: EnvironmentId,
        kind: InteractionKind,
        active: bool,
    ) -> Result<()>;
    async fn delete_environment(&self, environment_id: EnvironmentId) -> Result<()>;
    async fn list_user_environments(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Environment>>;
    async fn list_saved_environments(&self, window: SkipTake) -> Result<Paginated<Environment>>;

    async fn list_user_rulesets(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Ruleset>>;
    async fn create_ruleset(&self, ruleset: &NewRuleset) -> Result<Ruleset>;

    async fn two_factor_status(&self) -> Result<TwoFactorStatus>;
    async fn two_factor_provisioning(&self) -> Result<TwoFactorProvisioning>;
    async fn enable_two_factor(&self, request: &EnableTwoFactorRequest) -> Result<()>;
    async fn disable_two_factor(&self) -> Result<()>;

    async fn search_tags(&self, prefix: &str) -> Result<Vec<Tag>>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Parses `base_url`, forcing a trailing `/` so endpoint paths are joined
    /// below it rather than replacing its last segment.
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim();
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let base_url = Url::parse(&normalized).map_err(|err| {
            ClientError::request(None, format!("invalid api url '{trimmed}': {err}"))
        })?;
        Ok(Self {
            base_url,
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
            token: config.token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| ClientError::request(None, format!("invalid path '{path}': {err}")))?;
        debug!(%method, %url, "gateway: request");
        let builder = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        decode_json(response).await
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        window: SkipTake,
    ) -> Result<Paginated<T>> {
        let response = self
            .send(self.request(Method::GET, path)?.query(&window))
            .await?;
        decode_json(response).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        self.send(self.request(method, path)?.json(body)).await
    }

    async fn fetch_image(&self, path: &str) -> Result<Option<ImageResource>> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or(FALLBACK_IMAGE_TYPE)
            .to_string();
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ImageResource::new(content_type, bytes.to_vec())))
    }

    async fn upload_image(&self, path: &str, upload: ImageUpload) -> Result<()> {
        let ImageUpload {
            field,
            file_name,
            content_type,
            bytes,
        } = upload;
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let form = multipart::Form::new().part(field, part);
        self.send(self.request(Method::POST, path)?.multipart(form))
            .await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        warn!(url = %response.url(), "gateway: unauthenticated");
        return Err(ClientError::AuthFailure);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => (api_error.code, api_error.message),
        Err(_) if body.trim().is_empty() => (
            ErrorCode::from_status(status.as_u16()),
            status.to_string(),
        ),
        Err(_) => (ErrorCode::from_status(status.as_u16()), body),
    };
    warn!(%url, status = status.as_u16(), ?code, "gateway: request rejected");
    Err(ClientError::RequestFailure {
        status: Some(status.as_u16()),
        code,
        message,
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ClientError::request(Some(status), format!("invalid response body: {err}")))
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile> {
        self.get_json(&format!("user/{}", user_id.0)).await
    }

    async fn fetch_settings(&self) -> Result<Settings> {
        self.get_json("user/settings").await
    }

    async fn update_settings(&self, settings: &Settings) -> Result<()> {
        self.send_json(Method::PATCH, "user/settings", settings)
            .await?;
        Ok(())
    }

    async fn fetch_avatar(&self, user_id: UserId) -> Result<Option<ImageResource>> {
        self.fetch_image(&format!("user/settings/avatar/{}", user_id.0))
            .await
    }

    async fn upload_avatar(&self, upload: ImageUpload) -> Result<()> {
        self.upload_image("user/settings/avatar", upload).await
    }

    async fn fetch_banner(&self, user_id: UserId) -> Result<Option<ImageResource>> {
        self.fetch_image(&format!("user/settings/banner/{}", user_id.0))
            .await
    }

    async fn fetch_logo(&self, environment_id: EnvironmentId) -> Result<Option<ImageResource>> {
        self.fetch_image(&format!("environments/{}/logo", environment_id.0))
            .await
    }

    async fn upload_logo(&self, environment_id: EnvironmentId, upload: ImageUpload) -> Result<()> {
        self.upload_image(&format!("environments/{}/logo", environment_id.0), upload)
            .await
    }

    async fn set_interaction(
        &self,
        environment_id: EnvironmentId,
        kind: InteractionKind,
        active: bool,
    ) -> Result<()> {
        self.send_json(
            Method::PUT,
            &format!("environments/{}/{}", environment_id.0, kind.path_segment()),
            &InteractionUpdate { active },
        )
        .await?;
        Ok(())
    }

    async fn delete_environment(&self, environment_id: EnvironmentId) -> Result<()> {
        self.send(self.request(
            Method::DELETE,
            &format!("environments/{}", environment_id.0),
        )?)
        .await?;
        Ok(())
    }

    async fn list_user_environments(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Environment>> {
        self.get_page(&format!("user/{}/environments", user_id.0), window)
            .await
    }

    async fn list_saved_environments(&self, window: SkipTake) -> Result<Paginated<Environment>> {
        self.get_page("user/saved", window).await
    }

    async fn list_user_rulesets(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Ruleset>> {
        self.get_page(&format!("user/{}/rulesets", user_id.0), window)
            .await
    }

    async fn create_ruleset(&self, ruleset: &NewRuleset) -> Result<Ruleset> {
        let response = self.send_json(Method::POST, "rulesets", ruleset).await?;
        decode_json(response).await
    }

    async fn two_factor_status(&self) -> Result<TwoFactorStatus> {
        self.get_json("user/2fa/status").await
    }

    async fn two_factor_provisioning(&self) -> Result<TwoFactorProvisioning> {
        self.get_json("user/2fa/qrcode").await
    }

    async fn enable_two_factor(&self, request: &EnableTwoFactorRequest) -> Result<()> {
        self.send_json(Method::POST, "user/2fa/enable", request)
            .await?;
        Ok(())
    }

    async fn disable_two_factor(&self) -> Result<()> {
        self.send(self.request(Method::POST, "user/2fa/disable")?)
            .await?;
        Ok(())
    }

    async fn search_tags(&self, prefix: &str) -> Result<Vec<Tag>> {
        let response = self
            .send(
                self.request(Method::GET, "tags/search")?
                    .query(&[("prefix", prefix)]),
            )
            .await?;
        decode_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = GatewayConfig::new("http://localhost:3000/api").expect("config");
        assert_eq!(config.base_url.as_str(), "http://localhost:3000/api/");
        assert_eq!(
            config.base_url.join("user/7").expect("join").as_str(),
            "http://localhost:3000/api/user/7"
        );
    }

    #[test]
    fn blank_token_is_dropped() {
        let config = GatewayConfig::new("http://localhost")
            .expect("config")
            .with_token(Some("  ".into()));
        assert_eq!(config.token, None);
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = GatewayConfig::new("not a url").expect_err("must fail");
        assert!(matches!(err, ClientError::RequestFailure { status: None, .. }));
    }
}
