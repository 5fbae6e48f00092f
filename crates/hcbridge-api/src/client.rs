// Home Connect request/response client
//
// Wraps `reqwest::Client` with appliance-scoped URL construction and
// envelope unwrapping. The event stream lives in `events::sse`; it shares
// the base URL and the authorization header set up here.

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{
    Appliance, ApplianceList, DataEnvelope, ErrorEnvelope, SettingDetail, SettingWrite,
    SettingWriteData, SettingsList, StatusList, ValueItem,
};
use crate::transport::TransportConfig;

/// Production endpoint of the Home Connect cloud.
pub const DEFAULT_BASE_URL: &str = "https://api.home-connect.com/";

/// HTTP client for the Home Connect cloud API.
///
/// Methods return unwrapped `data` payloads -- the envelope is stripped
/// before the caller sees it.
#[derive(Clone)]
pub struct HomeConnectClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
}

impl HomeConnectClient {
    /// Create a client from a `TransportConfig` and an already-issued
    /// access token.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client(token)?,
            stream_http: transport.build_stream_client(token)?,
            base_url,
        })
    }

    /// Create a client with pre-built `reqwest::Client`s.
    pub fn with_clients(http: reqwest::Client, stream_http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            stream_http,
            base_url,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream_http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/homeappliances/{segments...}`.
    ///
    /// Segments are percent-encoded individually, so keys and appliance
    /// identifiers can never escape their path position.
    pub(crate) fn appliances_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("api")
            .push("homeappliances")
            .extend(segments);
        Ok(url)
    }

    /// URL of the event stream, for every appliance or just one.
    pub fn events_url(&self, target: Option<&str>) -> Result<Url, Error> {
        match target {
            Some(ha_id) => self.appliances_url(&[ha_id, "events"]),
            None => self.appliances_url(&["events"]),
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List every appliance paired with the account.
    pub async fn list_appliances(&self) -> Result<Vec<Appliance>, Error> {
        let url = self.appliances_url(&[])?;
        let list: ApplianceList = self.get(url).await?;
        Ok(list.homeappliances)
    }

    /// Current status values of one appliance.
    pub async fn status(&self, ha_id: &str) -> Result<Vec<ValueItem>, Error> {
        let url = self.appliances_url(&[ha_id, "status"])?;
        let list: StatusList = self.get(url).await?;
        Ok(list.status)
    }

    /// Settings supported by one appliance, with their current values.
    pub async fn settings(&self, ha_id: &str) -> Result<Vec<ValueItem>, Error> {
        let url = self.appliances_url(&[ha_id, "settings"])?;
        let list: SettingsList = self.get(url).await?;
        Ok(list.settings)
    }

    /// Full description of one setting, including constraints.
    pub async fn setting(&self, ha_id: &str, key: &str) -> Result<SettingDetail, Error> {
        let url = self.appliances_url(&[ha_id, "settings", key])?;
        self.get(url).await
    }

    /// Change the value of one setting.
    pub async fn set_setting(
        &self,
        ha_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), Error> {
        let url = self.appliances_url(&[ha_id, "settings", key])?;
        debug!("PUT {}", url);

        let body = SettingWrite {
            data: SettingWriteData { key, value },
        };
        let resp = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.bsh.sdk.v1+json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        expect_no_content(resp).await
    }

    /// Stop the program that is currently running.
    pub async fn stop_program(&self, ha_id: &str) -> Result<(), Error> {
        let url = self.appliances_url(&[ha_id, "programs", "active"])?;
        debug!("DELETE {}", url);

        let resp = self.http.delete(url).send().await.map_err(Error::Transport)?;
        expect_no_content(resp).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and unwrap the `data` envelope.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let resp = check_status(resp).await?;
        let body = resp.text().await.map_err(Error::Transport)?;

        let envelope: DataEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;
        Ok(envelope.data)
    }
}

async fn expect_no_content(resp: reqwest::Response) -> Result<(), Error> {
    check_status(resp).await.map(drop)
}

/// Map non-2xx responses to errors, decoding the error envelope when
/// the body carries one.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "access token expired or invalid".into(),
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(Error::RateLimited { retry_after_secs });
    }

    let body = resp.text().await.unwrap_or_default();
    let (key, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let message = envelope
                .error
                .description
                .or_else(|| envelope.error.key.clone())
                .unwrap_or_else(|| status.to_string());
            (envelope.error.key, message)
        }
        Err(_) if body.is_empty() => (None, status.to_string()),
        Err(_) => (None, body),
    };

    Err(Error::Api {
        message,
        key,
        status: status.as_u16(),
    })
}
