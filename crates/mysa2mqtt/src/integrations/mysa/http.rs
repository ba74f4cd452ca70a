use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::api::MysaApi;
use super::api::MysaError;
use super::realtime::diff_device_state;
use super::types::DeviceFirmwares;
use super::types::DeviceState;
use super::types::DeviceStates;
use super::types::Devices;
use super::types::MysaEvent;
use super::types::MysaSession;
use super::types::SetDeviceState;

pub const DEFAULT_BASE_URL: &str = "https://app-prod.mysa.cloud";
pub const DEFAULT_COGNITO_URL: &str = "https://cognito-idp.us-east-1.amazonaws.com/";
const COGNITO_CLIENT_ID: &str = "19efs8tgqe942atbqmot5m36t3";
const COGNITO_INITIATE_AUTH: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const COGNITO_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 64;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: HashMap<&'a str, &'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: String,
    access_token: String,
    /// Only returned by the password flow.
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct CognitoError {
    #[serde(rename = "__type")]
    kind: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SerialNumberResponse {
    serial_number: String,
}

/// Body of a state change request. Absent fields are left untouched by the device.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StateCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    set_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tstat_mode: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fan_speed: Option<i64>,
}

impl From<SetDeviceState> for StateCommand {
    fn from(change: SetDeviceState) -> Self {
        Self {
            set_point: change.set_point,
            tstat_mode: change.mode.map(|mode| mode.raw_code()),
            fan_speed: change.fan_speed.map(|fan| fan.raw_code()),
        }
    }
}

pub struct HttpMysaClientBuilder {
    base_url: String,
    cognito_url: String,
    poll_interval: Duration,
    session: Option<MysaSession>,
}

impl Default for HttpMysaClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cognito_url: DEFAULT_COGNITO_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            session: None,
        }
    }
}

impl HttpMysaClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn cognito_url(mut self, url: impl Into<String>) -> Self {
        self.cognito_url = url.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resume a previously persisted session.
    pub fn session(mut self, session: Option<MysaSession>) -> Self {
        self.session = session;
        self
    }

    pub fn build(self) -> Result<HttpMysaClient, MysaError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mysa2mqtt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (session, _) = watch::channel(self.session);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(HttpMysaClient {
            inner: Arc::new(Inner {
                http,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                cognito_url: self.cognito_url,
                poll_interval: self.poll_interval,
                session,
                events,
                pollers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    cognito_url: String,
    poll_interval: Duration,
    session: watch::Sender<Option<MysaSession>>,
    events: broadcast::Sender<MysaEvent>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(pollers) = self.pollers.get_mut() {
            for (_, task) in pollers.drain() {
                task.abort();
            }
        }
    }
}

/// Mysa cloud client over HTTPS.
///
/// Cheap to clone; clones share the session, the event stream and the
/// realtime pollers.
#[derive(Clone)]
pub struct HttpMysaClient {
    inner: Arc<Inner>,
}

impl HttpMysaClient {
    pub fn builder() -> HttpMysaClientBuilder {
        HttpMysaClientBuilder::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<MysaSession> {
        self.inner.session.borrow().clone()
    }

    /// Receives the session every time it changes (login, token refresh).
    pub fn session_changes(&self) -> watch::Receiver<Option<MysaSession>> {
        self.inner.session.subscribe()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), MysaError> {
        let parameters = HashMap::from([("USERNAME", username), ("PASSWORD", password)]);
        let result = self.initiate_auth("USER_PASSWORD_AUTH", parameters).await?;
        let refresh_token = result.refresh_token.ok_or_else(|| {
            MysaError::AuthenticationFailed("no refresh token in login response".to_string())
        })?;

        info!(username, "logged in to Mysa");
        self.inner.session.send_replace(Some(MysaSession {
            username: username.to_string(),
            id_token: result.id_token,
            access_token: result.access_token,
            refresh_token,
        }));
        Ok(())
    }

    /// Exchange the refresh token for fresh id and access tokens.
    pub async fn refresh_session(&self) -> Result<(), MysaError> {
        let session = self.session().ok_or(MysaError::NotAuthenticated)?;
        let parameters = HashMap::from([("REFRESH_TOKEN", session.refresh_token.as_str())]);
        let result = self.initiate_auth("REFRESH_TOKEN_AUTH", parameters).await?;

        debug!(username = %session.username, "refreshed Mysa session");
        self.inner.session.send_replace(Some(MysaSession {
            id_token: result.id_token,
            access_token: result.access_token,
            refresh_token: result.refresh_token.unwrap_or(session.refresh_token),
            username: session.username,
        }));
        Ok(())
    }

    pub async fn get_devices(&self) -> Result<Devices, MysaError> {
        self.get_json("/devices").await
    }

    pub async fn get_device_firmwares(&self) -> Result<DeviceFirmwares, MysaError> {
        self.get_json("/devices/firmware").await
    }

    pub async fn get_device_serial_number(&self, device_id: &str) -> Result<String, MysaError> {
        let response: SerialNumberResponse = self
            .get_json(&format!("/devices/{device_id}/serial"))
            .await?;
        Ok(response.serial_number)
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        parameters: HashMap<&str, &str>,
    ) -> Result<AuthenticationResult, MysaError> {
        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: COGNITO_CLIENT_ID,
            auth_parameters: parameters,
        };

        let response = self
            .inner
            .http
            .post(&self.inner.cognito_url)
            .header("X-Amz-Target", COGNITO_INITIATE_AUTH)
            .header(CONTENT_TYPE, COGNITO_CONTENT_TYPE)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<CognitoError>(&body)
                .ok()
                .and_then(|error| error.message.or(error.kind))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(MysaError::AuthenticationFailed(message));
        }

        let response: InitiateAuthResponse = response.json().await?;
        response.authentication_result.ok_or_else(|| {
            MysaError::AuthenticationFailed(format!(
                "unsupported challenge {}",
                response.challenge_name.as_deref().unwrap_or("<none>")
            ))
        })
    }

    fn id_token(&self) -> Result<String, MysaError> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .map(|session| session.id_token.clone())
            .ok_or(MysaError::NotAuthenticated)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Send an authorized request, refreshing the session and retrying once
    /// when the id token is rejected.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, MysaError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.id_token()?;
        let response = build(&self.inner.http)
            .header(AUTHORIZATION, token)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response.error_for_status()?);
        }

        debug!(url = %response.url(), "id token rejected, refreshing session");
        self.refresh_session().await?;

        let token = self.id_token()?;
        let response = build(&self.inner.http)
            .header(AUTHORIZATION, token)
            .send()
            .await?;
        Ok(response.error_for_status()?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MysaError> {
        let url = self.url(path);
        trace!(%url, "GET");
        let response = self.send_authorized(|http| http.get(&url)).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| MysaError::InvalidResponse {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    fn spawn_poller(&self, device_id: &str) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let span = tracing::info_span!("poller", device_id);
        tokio::spawn(poll_device(inner, device_id.to_string(), self.inner.poll_interval).instrument(span))
    }
}

/// Poll one device and turn successive snapshots into realtime events.
///
/// Holds only a weak reference so that dropping the last client handle
/// stops the loop.
async fn poll_device(inner: Weak<Inner>, device_id: String, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<DeviceState> = None;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let client = HttpMysaClient { inner };

        let mut states = match client.get_device_states().await {
            Ok(states) => states,
            Err(e) => {
                warn!(error = %e, "failed to poll device state");
                continue;
            }
        };
        let Some(current) = states.device_states_obj.remove(&device_id) else {
            debug!("device missing from state poll");
            continue;
        };

        for event in diff_device_state(&device_id, previous.as_ref(), &current) {
            trace!(?event, "realtime event");
            // No subscribers is fine; the event is simply dropped.
            let _ = client.inner.events.send(event);
        }
        previous = Some(current);
    }
}

#[async_trait]
impl MysaApi for HttpMysaClient {
    async fn get_device_states(&self) -> Result<DeviceStates, MysaError> {
        self.get_json("/devices/state").await
    }

    async fn set_device_state(
        &self,
        device_id: &str,
        change: SetDeviceState,
    ) -> Result<(), MysaError> {
        if change.is_empty() {
            debug!(device_id, "empty state change, nothing to send");
            return Ok(());
        }

        let url = self.url(&format!("/devices/{device_id}/state"));
        let command = StateCommand::from(change);
        debug!(device_id, ?command, "setting device state");
        self.send_authorized(|http| http.post(&url).json(&command))
            .await?;
        Ok(())
    }

    async fn start_realtime_updates(&self, device_id: &str) -> Result<(), MysaError> {
        if !self.is_authenticated() {
            return Err(MysaError::NotAuthenticated);
        }

        let mut pollers = self
            .inner
            .pollers
            .lock()
            .map_err(|_| MysaError::InvalidResponse {
                endpoint: "realtime".to_string(),
                message: "poller registry poisoned".to_string(),
            })?;
        if pollers.get(device_id).is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        debug!(device_id, "starting realtime updates");
        pollers.insert(device_id.to_string(), self.spawn_poller(device_id));
        Ok(())
    }

    async fn stop_realtime_updates(&self, device_id: &str) -> Result<(), MysaError> {
        let task = match self.inner.pollers.lock() {
            Ok(mut pollers) => pollers.remove(device_id),
            Err(_) => None,
        };
        if let Some(task) = task {
            debug!(device_id, "stopping realtime updates");
            task.abort();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<MysaEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_json;
    use wiremock::matchers::body_string_contains;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    use super::*;
    use crate::thermostat::ClimateMode;

    fn session(id_token: &str) -> MysaSession {
        MysaSession {
            username: "me@example.com".to_string(),
            id_token: id_token.to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    fn client(server: &MockServer, session: Option<MysaSession>) -> HttpMysaClient {
        HttpMysaClient::builder()
            .base_url(server.uri())
            .cognito_url(format!("{}/cognito", server.uri()))
            .poll_interval(Duration::from_millis(20))
            .session(session)
            .build()
            .unwrap()
    }

    fn tokens(id_token: &str, refresh_token: Option<&str>) -> serde_json::Value {
        let mut result = json!({"IdToken": id_token, "AccessToken": "access-2"});
        if let Some(refresh_token) = refresh_token {
            result["RefreshToken"] = json!(refresh_token);
        }
        json!({ "AuthenticationResult": result })
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cognito"))
            .and(header("X-Amz-Target", COGNITO_INITIATE_AUTH))
            .and(body_string_contains("USER_PASSWORD_AUTH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokens("id-1", Some("r-1"))))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None);
        let mut changes = client.session_changes();
        assert!(!client.is_authenticated());

        client.login("me@example.com", "hunter2").await.unwrap();

        assert!(client.is_authenticated());
        assert!(changes.has_changed().unwrap());
        let stored = changes.borrow_and_update().clone().unwrap();
        assert_eq!(stored.id_token, "id-1");
        assert_eq!(stored.refresh_token, "r-1");
        assert_eq!(stored.username, "me@example.com");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cognito"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "NotAuthorizedException",
                "message": "Incorrect username or password."
            })))
            .mount(&server)
            .await;

        let client = client(&server, None);
        let err = client.login("me@example.com", "wrong").await.unwrap_err();
        assert!(
            matches!(&err, MysaError::AuthenticationFailed(m) if m == "Incorrect username or password."),
            "{err:?}"
        );
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_requests_require_session() {
        let server = MockServer::start().await;
        let client = client(&server, None);
        assert!(matches!(
            client.get_device_states().await,
            Err(MysaError::NotAuthenticated)
        ));
        assert!(matches!(
            client.start_realtime_updates("dev").await,
            Err(MysaError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_get_devices_sends_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(header("Authorization", "id-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DevicesObj": {
                    "dev": {"Id": "dev", "Name": "Hall", "Model": "BB-V1-1", "Voltage": 240}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let devices = client(&server, Some(session("id-1"))).get_devices().await.unwrap();
        assert_eq!(devices.devices_obj["dev"].name, "Hall");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/state"))
            .and(header("Authorization", "stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/devices/state"))
            .and(header("Authorization", "fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DeviceStatesObj": {"dev": {"CorrectedTemp": {"v": 20.5}}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cognito"))
            .and(body_string_contains("REFRESH_TOKEN_AUTH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokens("fresh", None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("stale")));
        let states = client.get_device_states().await.unwrap();
        assert_eq!(states.device_states_obj["dev"].temperature(), Some(20.5));

        let refreshed = client.session().unwrap();
        assert_eq!(refreshed.id_token, "fresh");
        assert_eq!(refreshed.refresh_token, "refresh");
    }

    #[tokio::test]
    async fn test_set_device_state_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices/dev/state"))
            .and(body_json(json!({"SetPoint": 21.5, "TstatMode": 3})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let change = SetDeviceState {
            set_point: Some(21.5),
            mode: Some(ClimateMode::Heat),
            fan_speed: None,
        };
        client(&server, Some(session("id-1")))
            .set_device_state("dev", change)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_state_change_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        client(&server, Some(session("id-1")))
            .set_device_state("dev", SetDeviceState::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_realtime_updates_poll_and_stop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DeviceStatesObj": {
                    "dev": {
                        "CorrectedTemp": {"v": 19.0},
                        "Humidity": {"v": 45},
                        "TstatMode": {"v": 3},
                        "SetPoint": {"v": 21.0}
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server, Some(session("id-1")));
        let mut events = client.subscribe();
        client.start_realtime_updates("dev").await.unwrap();
        // Starting twice keeps the existing poller.
        client.start_realtime_updates("dev").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, MysaEvent::StateChanged(ref c) if c.mode == Some(ClimateMode::Heat)));
        let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, MysaEvent::StatusChanged(ref s) if s.humidity == 45.0));

        client.stop_realtime_updates("dev").await.unwrap();
        assert!(client.inner.pollers.lock().unwrap().is_empty());
    }
}
