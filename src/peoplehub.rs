//! HTTP client for the PeopleHub graph-fetch endpoint.
//!
//! Fetches the caller's followed-users list (or a targeted batch) with
//! profile, relationship and presence decorations. Uses reqwest with JSON
//! serialization; HTTP 424 maps to `SocialError::DependencyFailed`, which
//! `initialize` tolerates.

use crate::clients::PeopleHubClient;
use crate::error::SocialResult;
use crate::types::{
    PresenceRecord, SocialManagerExtraDetailLevel, SocialUser, TitleRecord, UserPresenceState,
    XboxUserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

const CONTRACT_VERSION: &str = "3";

/// reqwest-backed PeopleHub client.
pub struct PeopleHubService {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl PeopleHubService {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            auth_token,
        }
    }

    fn decorations(detail: SocialManagerExtraDetailLevel) -> &'static str {
        match detail {
            SocialManagerExtraDetailLevel::NoExtraDetail => "presencedetail",
            SocialManagerExtraDetailLevel::PreferredColor => "presencedetail,preferredcolor",
            SocialManagerExtraDetailLevel::TitleHistory => "presencedetail,titlehistory",
            SocialManagerExtraDetailLevel::All => {
                "presencedetail,preferredcolor,titlehistory"
            }
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("xbl-contract-version", CONTRACT_VERSION);
        match &self.auth_token {
            Some(token) => req.header("Authorization", token.clone()),
            None => req,
        }
    }
}

#[async_trait]
impl PeopleHubClient for PeopleHubService {
    async fn get_social_graph(
        &self,
        caller: XboxUserId,
        detail: SocialManagerExtraDetailLevel,
        ids: Option<&[XboxUserId]>,
    ) -> SocialResult<Vec<SocialUser>> {
        let decorations = Self::decorations(detail);
        let response: PeopleResponse = match ids {
            None => {
                let url = format!(
                    "{}/users/xuid({})/people/social/decoration/{}",
                    self.base_url, caller, decorations
                );
                debug!("[SOCIAL] PeopleHub full graph fetch for {}", caller);
                self.apply_auth(self.client.get(&url))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?
            }
            Some(ids) => {
                let url = format!(
                    "{}/users/xuid({})/people/batch/decoration/{}",
                    self.base_url, caller, decorations
                );
                let xuids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                debug!("[SOCIAL] PeopleHub batch fetch for {} ids", xuids.len());
                self.apply_auth(self.client.post(&url))
                    .json(&BatchRequest { xuids })
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?
            }
        };

        response
            .people
            .into_iter()
            .map(PeopleHubPerson::into_social_user)
            .collect()
    }
}

#[derive(Serialize)]
struct BatchRequest {
    xuids: Vec<String>,
}

#[derive(Deserialize)]
struct PeopleResponse {
    people: Vec<PeopleHubPerson>,
}

/// One person as returned by PeopleHub. Xuids arrive as decimal strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeopleHubPerson {
    xuid: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    gamertag: String,
    #[serde(default)]
    display_pic_raw: String,
    #[serde(default)]
    is_following_caller: bool,
    #[serde(default)]
    is_followed_by_caller: bool,
    #[serde(default)]
    is_favorite: bool,
    #[serde(default)]
    presence_state: Option<String>,
    #[serde(default)]
    presence_details: Vec<PresenceDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceDetail {
    #[serde(default)]
    title_id: String,
    #[serde(default)]
    is_primary: bool,
    #[serde(default)]
    presence_text: String,
    #[serde(default)]
    last_modified: Option<DateTime<Utc>>,
}

impl PeopleHubPerson {
    fn into_social_user(self) -> SocialResult<SocialUser> {
        let id = XboxUserId::from_str(&self.xuid)?;
        let user_state = match self.presence_state.as_deref() {
            Some("Online") => UserPresenceState::Online,
            Some("Away") => UserPresenceState::Away,
            Some("Offline") => UserPresenceState::Offline,
            _ => UserPresenceState::Unknown,
        };
        let presence_title_records = self
            .presence_details
            .into_iter()
            .filter_map(|detail| {
                let title_id = detail.title_id.parse().ok()?;
                Some(TitleRecord {
                    title_id,
                    is_title_active: detail.is_primary,
                    device_type: Default::default(),
                    presence_text: detail.presence_text,
                    last_modified: detail.last_modified,
                })
            })
            .collect();

        Ok(SocialUser {
            xbox_user_id: id,
            display_name: self.display_name,
            gamertag: self.gamertag,
            display_pic_url: self.display_pic_raw,
            is_followed_by_caller: self.is_followed_by_caller,
            is_following_user: self.is_following_caller,
            is_favorite: self.is_favorite,
            presence: PresenceRecord {
                xbox_user_id: id,
                user_state,
                presence_title_records,
            },
        })
    }
}

impl std::fmt::Debug for PeopleHubService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeopleHubService")
            .field("base_url", &self.base_url)
            .finish()
    }
}
