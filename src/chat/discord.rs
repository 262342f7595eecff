use async_trait::async_trait;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{ChatErr, ChatPort, ChatResult};
use crate::db::models::community::CommunityId;
use crate::db::models::member::MemberId;

const DISCORD_API: &str = "https://discord.com/api/v10";

/// Thin Discord REST client; the community id doubles as the guild id.
pub struct Discord {
    http: reqwest::Client,
    token: String,
    base: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Role {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct User {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GuildMember {
    user: User,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl GuildMember {
    fn display_name(&self) -> String {
        self.nick
            .clone()
            .or_else(|| self.user.global_name.clone())
            .unwrap_or_else(|| self.user.username.clone())
    }
}

impl Discord {
    pub fn new(token: &str) -> Self {
        Self::with_base(token, DISCORD_API)
    }

    /// Base-url override for tests against a local mock server.
    pub fn with_base(token: &str, base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.to_string(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn auth_headers(&self) -> ChatResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bot {}", self.token).parse()?);
        Ok(headers)
    }

    async fn check(res: reqwest::Response) -> ChatResult<reqwest::Response> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(code = %status, body, "non-success response from chat api");
            return Err(ChatErr::Status {
                code: status.as_u16(),
                body,
            });
        }

        Ok(res)
    }

    async fn get_json<T>(&self, path: &str) -> ChatResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self
            .http
            .get(format!("{}{}", self.base, path))
            .headers(self.auth_headers()?)
            .send()
            .await?;

        Ok(Self::check(res).await?.json::<T>().await?)
    }

    async fn find_or_create_role(
        &self,
        community: &CommunityId,
        role_name: &str,
    ) -> ChatResult<Role> {
        let roles: Vec<Role> = self.get_json(&format!("/guilds/{community}/roles")).await?;
        if let Some(role) = roles.into_iter().find(|r| r.name == role_name) {
            return Ok(role);
        }

        tracing::info!(%community, role_name, "creating missing role");
        let res = self
            .http
            .post(format!("{}/guilds/{community}/roles", self.base))
            .headers(self.auth_headers()?)
            .json(&serde_json::json!({ "name": role_name }))
            .send()
            .await?;

        Ok(Self::check(res).await?.json::<Role>().await?)
    }
}

#[async_trait]
impl ChatPort for Discord {
    #[instrument(skip(self, text))]
    async fn post_message(&self, channel: &str, text: &str) -> ChatResult<()> {
        let res = self
            .http
            .post(format!("{}/channels/{channel}/messages", self.base))
            .headers(self.auth_headers()?)
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;

        Self::check(res).await?;
        Ok(())
    }

    #[instrument(skip(self, text, image), fields(image_len = image.len()))]
    async fn post_board(
        &self,
        channel: &str,
        text: &str,
        image: Vec<u8>,
        file_name: &str,
    ) -> ChatResult<()> {
        let payload = serde_json::json!({
            "content": text,
            "attachments": [{ "id": 0, "filename": file_name }],
        });

        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part(
                "files[0]",
                Part::bytes(image).file_name(file_name.to_string()),
            );

        let res = self
            .http
            .post(format!("{}/channels/{channel}/messages", self.base))
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()
            .await?;

        Self::check(res).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_role(&self, community: &CommunityId, role_name: &str) -> ChatResult<()> {
        self.find_or_create_role(community, role_name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rotate_single_holder(
        &self,
        community: &CommunityId,
        role_name: &str,
        member: &MemberId,
    ) -> ChatResult<()> {
        let role = self.find_or_create_role(community, role_name).await?;
        let members: Vec<GuildMember> = self
            .get_json(&format!("/guilds/{community}/members?limit=1000"))
            .await?;

        let mut winner_holds = false;
        for m in &members {
            if !m.roles.iter().any(|r| r == &role.id) {
                continue;
            }
            if m.user.id == member.0 {
                winner_holds = true;
                continue;
            }

            let res = self
                .http
                .delete(format!(
                    "{}/guilds/{community}/members/{}/roles/{}",
                    self.base, m.user.id, role.id
                ))
                .headers(self.auth_headers()?)
                .send()
                .await?;
            Self::check(res).await?;
        }

        if !winner_holds {
            let res = self
                .http
                .put(format!(
                    "{}/guilds/{community}/members/{member}/roles/{}",
                    self.base, role.id
                ))
                .headers(self.auth_headers()?)
                .send()
                .await?;
            Self::check(res).await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn resolve_display_name(
        &self,
        community: &CommunityId,
        member: &MemberId,
    ) -> ChatResult<Option<String>> {
        let res = self
            .http
            .get(format!(
                "{}/guilds/{community}/members/{member}",
                self.base
            ))
            .headers(self.auth_headers()?)
            .send()
            .await?;

        if res.status() == http::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let member: GuildMember = Self::check(res).await?.json().await?;
        Ok(Some(member.display_name()))
    }
}
