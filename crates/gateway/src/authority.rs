//! HTTP client for the external authority (signaling server): credential
//! verification, host registration, and the room create/delete calls.
//!
//! Every call is a single request with no internal retry. Callers decide
//! whether a failure is fatal.

use std::time::Duration;

use {
    roundtable_config::{AuthorityConfig, ConversationConfig},
    roundtable_protocol::Profile,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::error::{AuthError, AuthorityError};

/// Every authority response wraps its payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct RegisterHostRequest<'a> {
    name: &'a str,
    emoji: &'a str,
    color: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredHost {
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    connection_url: &'a str,
    topic: &'a str,
    settings: RoomSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomSettings {
    max_duration: u32,
    allow_recording: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedRoom {
    id: String,
}

/// What the orchestrator advertises when it creates its room.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub name: String,
    pub topic: String,
    pub connection_url: String,
    pub max_duration_mins: u32,
    pub allow_recording: bool,
}

impl RoomSpec {
    pub fn from_config(authority: &AuthorityConfig, conversation: &ConversationConfig) -> Self {
        Self {
            name: conversation.room_name.clone(),
            topic: conversation.topic.clone(),
            connection_url: authority.public_url.clone(),
            max_duration_mins: conversation.max_duration_mins,
            allow_recording: conversation.allow_recording,
        }
    }
}

/// Identity the orchestrator registers for itself.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub name: String,
    pub emoji: String,
    pub color: String,
}

impl From<&AuthorityConfig> for HostIdentity {
    fn from(config: &AuthorityConfig) -> Self {
        Self {
            name: config.host_name.clone(),
            emoji: config.host_emoji.clone(),
            color: config.host_color.clone(),
        }
    }
}

pub struct AuthorityClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthorityClient {
    /// Every request made through the client is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        Self::new(config.url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Resolve a participant credential to its profile.
    ///
    /// Only a 200 with a readable profile counts as success.
    pub async fn verify_key(&self, api_key: &str) -> Result<Profile, AuthError> {
        let resp = self
            .client
            .get(self.url("/api/agents/me"))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<Profile> = resp.json().await.map_err(AuthError::Malformed)?;
        Ok(envelope.data)
    }

    /// Register the orchestrator as a host and return its API key.
    pub async fn register_host(
        &self,
        host: &HostIdentity,
        registration_secret: Option<&Secret<String>>,
    ) -> Result<Secret<String>, AuthorityError> {
        let mut req = self
            .client
            .post(self.url("/api/agents/register"))
            .json(&RegisterHostRequest {
                name: &host.name,
                emoji: &host.emoji,
                color: &host.color,
            });
        if let Some(secret) = registration_secret {
            req = req.header("X-Registration-Secret", secret.expose_secret().as_str());
        }

        let resp = req.send().await?.error_for_status()?;
        let envelope: Envelope<RegisteredHost> = resp.json().await?;
        debug!(host = %host.name, "registered host with authority");
        Ok(Secret::new(envelope.data.api_key))
    }

    /// Create the voice room and return its id.
    pub async fn create_room(
        &self,
        host_key: &Secret<String>,
        room: &RoomSpec,
    ) -> Result<String, AuthorityError> {
        let body = CreateRoomRequest {
            name: &room.name,
            kind: "voice",
            connection_url: &room.connection_url,
            topic: &room.topic,
            settings: RoomSettings {
                max_duration: room.max_duration_mins,
                allow_recording: room.allow_recording,
            },
        };
        let resp = self
            .client
            .post(self.url("/api/rooms"))
            .bearer_auth(host_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let envelope: Envelope<CreatedRoom> = resp.json().await?;
        Ok(envelope.data.id)
    }

    pub async fn delete_room(
        &self,
        host_key: &Secret<String>,
        room_id: &str,
    ) -> Result<(), AuthorityError> {
        self.client
            .delete(self.url(&format!("/api/rooms/{room_id}")))
            .bearer_auth(host_key.expose_secret())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, serde_json::json};

    fn client(server: &mockito::ServerGuard) -> AuthorityClient {
        AuthorityClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    fn host() -> HostIdentity {
        HostIdentity {
            name: "Orchestrator Host".into(),
            emoji: "🤖".into(),
            color: "#FF0000".into(),
        }
    }

    #[tokio::test]
    async fn verify_key_returns_profile() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/agents/me")
            .match_header("authorization", "Bearer good-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": {"id": "a1", "name": "Scout", "emoji": "🔍", "color": "#667eea"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let profile = client(&server).verify_key("good-key").await.unwrap();
        assert_eq!(profile.id, "a1");
        assert_eq!(profile.name, "Scout");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn verify_key_rejects_non_200() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/me")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let err = client(&server).verify_key("bad").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
        assert_eq!(err.close_reason(), "Invalid API Key");
    }

    #[tokio::test]
    async fn verify_key_rejects_other_success_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/me")
            .with_status(204)
            .create_async()
            .await;

        let err = client(&server).verify_key("k").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 204, .. }));
    }

    #[tokio::test]
    async fn verify_key_rejects_malformed_profile() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/me")
            .with_status(200)
            .with_body(r#"{"data": {"nickname": "x"}}"#)
            .create_async()
            .await;

        let err = client(&server).verify_key("k").await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_authority_is_a_transport_error() {
        let client = AuthorityClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client.verify_key("k").await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[tokio::test]
    async fn stalled_authority_hits_the_request_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client =
            AuthorityClient::new(format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let started = tokio::time::Instant::now();
        let err = client.verify_key("k").await.unwrap_err();
        match err {
            AuthError::Transport(source) => assert!(source.is_timeout()),
            other => panic!("expected a transport error, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));

        let cfg = AuthorityConfig {
            url: format!("http://{addr}"),
            ..AuthorityConfig::default()
        };
        assert_eq!(AuthorityClient::from_config(&cfg).unwrap().base_url(), cfg.url);
    }

    #[tokio::test]
    async fn register_host_sends_secret_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/agents/register")
            .match_header("x-registration-secret", "s3cret")
            .match_body(Matcher::PartialJson(json!({
                "name": "Orchestrator Host",
                "color": "#FF0000"
            })))
            .with_status(201)
            .with_body(json!({"data": {"apiKey": "host-key"}}).to_string())
            .create_async()
            .await;

        let secret = Secret::new("s3cret".to_string());
        let key = client(&server)
            .register_host(&host(), Some(&secret))
            .await
            .unwrap();
        assert_eq!(key.expose_secret(), "host-key");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn register_host_without_secret_omits_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/agents/register")
            .match_header("x-registration-secret", Matcher::Missing)
            .with_status(200)
            .with_body(json!({"data": {"apiKey": "host-key"}}).to_string())
            .create_async()
            .await;

        client(&server).register_host(&host(), None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_room_posts_voice_room() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/rooms")
            .match_header("authorization", "Bearer host-key")
            .match_body(Matcher::Json(json!({
                "name": "The future of autonomous AI agents",
                "type": "voice",
                "connectionUrl": "ws://orchestrator:8765/agent",
                "topic": "General AI",
                "settings": {"maxDuration": 60, "allowRecording": true}
            })))
            .with_status(201)
            .with_body(json!({"data": {"id": "room-42"}}).to_string())
            .create_async()
            .await;

        let spec = RoomSpec::from_config(&AuthorityConfig::default(), &ConversationConfig::default());
        let id = client(&server)
            .create_room(&Secret::new("host-key".into()), &spec)
            .await
            .unwrap();
        assert_eq!(id, "room-42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_room_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/rooms")
            .with_status(500)
            .create_async()
            .await;

        let spec = RoomSpec::from_config(&AuthorityConfig::default(), &ConversationConfig::default());
        let result = client(&server)
            .create_room(&Secret::new("host-key".into()), &spec)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_room_uses_room_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/rooms/room-42")
            .match_header("authorization", "Bearer host-key")
            .with_status(204)
            .create_async()
            .await;

        client(&server)
            .delete_room(&Secret::new("host-key".into()), "room-42")
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
