use super::{PushError, PushProvider};
use crate::config::PushConfig;
use crate::domain::{DeliveryFailure, OutboundMessage, PushPayload, Receipt, Ticket};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const SEND_PATH: &str = "/--/api/v2/push/send";
const RECEIPTS_PATH: &str = "/--/api/v2/push/getReceipts";

/// Expo push service client.
#[derive(Debug, Clone)]
pub struct ExpoPushProvider {
    client: reqwest::Client,
    send_url: String,
    receipts_url: String,
    access_token: Option<String>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    to: &'a str,
    #[serde(flatten)]
    payload: &'a PushPayload,
}

#[derive(Serialize)]
struct ReceiptsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireStatus {
    Ok,
    Error,
}

#[derive(Debug, Deserialize)]
struct WireDetails {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTicket {
    status: WireStatus,
    id: Option<String>,
    message: Option<String>,
    details: Option<WireDetails>,
}

#[derive(Debug, Deserialize)]
struct WireReceipt {
    status: WireStatus,
    message: Option<String>,
    details: Option<WireDetails>,
}

#[derive(Debug, Deserialize)]
struct WireRequestError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    data: Vec<WireTicket>,
    #[serde(default)]
    errors: Vec<WireRequestError>,
}

#[derive(Debug, Deserialize)]
struct ReceiptsResponse {
    #[serde(default)]
    data: HashMap<String, WireReceipt>,
    #[serde(default)]
    errors: Vec<WireRequestError>,
}

fn failure(message: Option<String>, details: Option<WireDetails>) -> DeliveryFailure {
    let code = details.and_then(|d| d.error);
    DeliveryFailure::new(code.as_deref(), message.unwrap_or_default())
}

fn request_errors(errors: &[WireRequestError]) -> Option<PushError> {
    if errors.is_empty() {
        return None;
    }
    let joined = errors.iter().map(|e| format!("{}: {}", e.code, e.message)).collect::<Vec<_>>().join("; ");
    Some(PushError::Rejected(joined))
}

impl From<WireTicket> for Ticket {
    fn from(wire: WireTicket) -> Self {
        match (wire.status, wire.id) {
            (WireStatus::Ok, Some(id)) => Self::Accepted { id },
            (WireStatus::Ok, None) => Self::Rejected(DeliveryFailure::new(None, "Ticket is missing an id")),
            (WireStatus::Error, _) => Self::Rejected(failure(wire.message, wire.details)),
        }
    }
}

impl From<WireReceipt> for Receipt {
    fn from(wire: WireReceipt) -> Self {
        match wire.status {
            WireStatus::Ok => Self::Ok,
            WireStatus::Error => Self::Error(failure(wire.message, wire.details)),
        }
    }
}

fn classify_transport_error(e: &reqwest::Error) -> PushError {
    if e.is_timeout() || e.is_connect() {
        PushError::Unavailable(e.to_string())
    } else {
        PushError::Other(anyhow::anyhow!("Push request failed: {e}"))
    }
}

impl ExpoPushProvider {
    /// Creates a new client for the configured push service.
    ///
    /// # Errors
    /// Returns `PushError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PushError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let base = config.api_url.trim_end_matches('/');
        Ok(Self {
            client,
            send_url: format!("{base}{SEND_PATH}"),
            receipts_url: format!("{base}{RECEIPTS_PATH}"),
            access_token: config.access_token.clone(),
        })
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, PushError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(url).header(ACCEPT, "application/json").json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PushError::RateLimited);
        }
        if status.is_server_error() {
            return Err(PushError::Unavailable(format!("HTTP {status}")));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(PushError::Configuration(format!("HTTP {status}: {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected(format!("HTTP {status}: {text}")));
        }

        response.json::<R>().await.map_err(|e| PushError::Other(anyhow::anyhow!("Invalid push service response: {e}")))
    }
}

#[async_trait]
impl PushProvider for ExpoPushProvider {
    #[tracing::instrument(level = "debug", skip_all, fields(count = messages.len()), err)]
    async fn submit(&self, messages: &[OutboundMessage]) -> Result<Vec<Ticket>, PushError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let wire: Vec<WireMessage<'_>> =
            messages.iter().map(|m| WireMessage { to: &m.token, payload: &m.payload }).collect();
        let response: SendResponse = self.post(&self.send_url, &wire).await?;

        if let Some(err) = request_errors(&response.errors) {
            return Err(err);
        }
        Ok(response.data.into_iter().map(Ticket::from).collect())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(count = ticket_ids.len()), err)]
    async fn fetch_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, Receipt>, PushError> {
        if ticket_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response: ReceiptsResponse = self.post(&self.receipts_url, &ReceiptsRequest { ids: ticket_ids }).await?;

        if let Some(err) = request_errors(&response.errors) {
            return Err(err);
        }
        Ok(response.data.into_iter().map(|(id, receipt)| (id, Receipt::from(receipt))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PushErrorCode;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_send_response_maps_to_tickets_in_order() {
        let response: SendResponse = serde_json::from_value(json!({
            "data": [
                { "status": "ok", "id": "XXXX-1" },
                {
                    "status": "error",
                    "message": "\"ExponentPushToken[dead]\" is not a registered push notification recipient",
                    "details": { "error": "DeviceNotRegistered" }
                },
                { "status": "ok" }
            ]
        }))
        .unwrap();

        let tickets: Vec<Ticket> = response.data.into_iter().map(Ticket::from).collect();

        assert_eq!(tickets.len(), 3);
        assert_eq!(tickets[0], Ticket::Accepted { id: "XXXX-1".into() });
        match &tickets[1] {
            Ticket::Rejected(f) => assert_eq!(f.code, Some(PushErrorCode::DeviceNotRegistered)),
            Ticket::Accepted { .. } => panic!("expected rejection"),
        }
        assert!(matches!(&tickets[2], Ticket::Rejected(f) if f.code.is_none()));
    }

    #[test]
    fn test_receipts_response_parsing() {
        let response: ReceiptsResponse = serde_json::from_value(json!({
            "data": {
                "a": { "status": "ok" },
                "b": { "status": "error", "message": "creds", "details": { "error": "InvalidCredentials" } },
                "c": { "status": "error", "message": "???", "details": { "error": "BrandNewCode" } }
            }
        }))
        .unwrap();

        let receipts: HashMap<String, Receipt> =
            response.data.into_iter().map(|(id, r)| (id, Receipt::from(r))).collect();

        assert_eq!(receipts["a"], Receipt::Ok);
        assert!(matches!(&receipts["b"], Receipt::Error(f) if f.code == Some(PushErrorCode::InvalidCredentials)));
        assert!(
            matches!(&receipts["c"], Receipt::Error(f) if f.code == Some(PushErrorCode::Unknown("BrandNewCode".into())))
        );
    }

    #[test]
    fn test_request_level_errors_are_terminal() {
        let response: SendResponse = serde_json::from_value(json!({
            "errors": [{ "code": "PUSH_TOO_MANY_EXPERIENCE_IDS", "message": "mixed projects" }]
        }))
        .unwrap();

        let err = request_errors(&response.errors).unwrap();
        assert!(matches!(err, PushError::Rejected(_)));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_wire_message_flattens_payload() {
        let payload = Arc::new(PushPayload::new("Hi", "There"));
        let message = OutboundMessage::new("ExponentPushToken[x]".into(), payload);
        let value = serde_json::to_value(WireMessage { to: &message.token, payload: &message.payload }).unwrap();
        assert_eq!(value, json!({ "to": "ExponentPushToken[x]", "title": "Hi", "body": "There" }));
    }

    #[test]
    fn test_urls_built_from_base() {
        let config = PushConfig { api_url: "http://localhost:9000/".into(), ..PushConfig::default() };
        let provider = ExpoPushProvider::new(&config).unwrap();
        assert_eq!(provider.send_url, "http://localhost:9000/--/api/v2/push/send");
        assert_eq!(provider.receipts_url, "http://localhost:9000/--/api/v2/push/getReceipts");
    }
}
