//! Discord OAuth2 implicit-grant login.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{AuthGrant, UserProfile};
use crate::config::DiscordConfig;
use crate::error::{Result, TaskgateError};
use crate::progress::Identity;
use crate::testing::IdentityProvider;

const AUTHORIZE_URL: &str = "https://discord.com/api/oauth2/authorize";
const DISCORD_API_URL: &str = "https://discord.com/api";
const CDN_URL: &str = "https://cdn.discordapp.com";
const SCOPES: &[&str] = &["identify", "email"];

/// User object returned by `/users/@me`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    pub avatar: Option<String>,
    pub email: Option<String>,
    pub global_name: Option<String>,
}

impl DiscordUser {
    /// Avatar image, falling back to the default avatar picked by
    /// discriminator.
    #[must_use]
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("{CDN_URL}/avatars/{}/{hash}.png", self.id),
            None => {
                let index = self.discriminator.parse::<u32>().unwrap_or(0) % 5;
                format!("{CDN_URL}/embed/avatars/{index}.png")
            }
        }
    }

    #[must_use]
    pub fn into_profile(self) -> UserProfile {
        let avatar_url = self.avatar_url();
        UserProfile {
            identity: Identity::new(self.id),
            display_name: self
                .global_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.username.clone()),
            username: self.username,
            avatar_url,
            email: self.email,
        }
    }
}

/// Extract the access token from the redirect fragment
/// (`#access_token=...&token_type=Bearer&...`).
pub fn parse_fragment(fragment: &str) -> Result<String> {
    let fragment = fragment.trim();
    let fragment = fragment
        .split_once('#')
        .map_or(fragment, |(_, after)| after);
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(k, _)| k == "access_token")
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TaskgateError::authentication("No access token found"))
}

/// Identity provider backed by Discord.
#[derive(Debug, Clone)]
pub struct DiscordIdentityProvider {
    client: Client,
    config: DiscordConfig,
    api_base: String,
}

impl DiscordIdentityProvider {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            api_base: DISCORD_API_URL.to_string(),
        }
    }

    async fn fetch_user(&self, token: &str) -> Result<DiscordUser> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TaskgateError::authentication(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TaskgateError::authentication(format!(
                "Failed to fetch user info ({})",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| TaskgateError::authentication(format!("Unexpected user payload: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for DiscordIdentityProvider {
    fn authorize_url(&self) -> anyhow::Result<Url> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TaskgateError::config("Discord client id not configured"))?;

        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "token")
            .append_pair("scope", &SCOPES.join(" "));
        Ok(url)
    }

    async fn exchange(&self, callback_fragment: &str) -> anyhow::Result<AuthGrant> {
        let access_token = parse_fragment(callback_fragment)?;
        let user = self.fetch_user(&access_token).await?;
        debug!("Authenticated Discord user {}", user.id);
        Ok(AuthGrant {
            profile: user.into_profile(),
            access_token,
        })
    }
}
