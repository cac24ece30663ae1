//! Belpost adapter (parcel status lookups).
//!
//! POSTs `{"number": ...}` to the tracking endpoint and renders the newest
//! tracking step as the status text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ptb_core::{carrier::CarrierClient, domain::StatusSnapshot, errors::Error, Result};

#[derive(Clone, Debug)]
pub struct BelpostClient {
    pub api_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct TrackingRequest<'a> {
    number: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TrackingResponse {
    #[serde(default)]
    data: Vec<TrackingItem>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackingItem {
    #[serde(default)]
    steps: Vec<TrackingStep>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackingStep {
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    place: Option<String>,
}

impl TrackingStep {
    fn render(&self) -> String {
        match self.place.as_deref().map(str::trim) {
            Some(place) if !place.is_empty() => {
                format!("{}: {} ({place})", self.created_at, self.event)
            }
            _ => format!("{}: {}", self.created_at, self.event),
        }
    }
}

impl BelpostClient {
    /// `timeout` bounds a single HTTP exchange; the scan loop applies its own
    /// deadline on top.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("belpost client build error: {e}")))?;
        Ok(Self {
            api_url: api_url.into(),
            http,
        })
    }
}

fn parse_response(body: &str) -> Result<TrackingResponse> {
    Ok(serde_json::from_str(body)?)
}

/// Pick the newest step across all items. Belpost timestamps are
/// `YYYY-MM-DD HH:MM:SS`, so lexical order is chronological.
fn latest_status(number: &str, resp: &TrackingResponse) -> Result<StatusSnapshot> {
    let newest = resp
        .data
        .iter()
        .flat_map(|item| item.steps.iter())
        .filter(|step| !step.event.trim().is_empty())
        .max_by(|a, b| a.created_at.cmp(&b.created_at));

    match newest {
        Some(step) => Ok(StatusSnapshot::new(step.render())),
        None => Err(Error::Carrier(format!("belpost has no data for {number}"))),
    }
}

#[async_trait]
impl CarrierClient for BelpostClient {
    async fn fetch_status(&self, number: &str) -> Result<StatusSnapshot> {
        let resp = self
            .http
            .post(&self.api_url)
            .json(&TrackingRequest { number })
            .send()
            .await
            .map_err(|e| Error::Carrier(format!("belpost request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Carrier(format!(
                "belpost lookup failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Carrier(format!("belpost read error: {e}")))?;
        let parsed = parse_response(&body)?;

        tracing::debug!(number, items = parsed.data.len(), "belpost response");
        latest_status(number, &parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TrackingResponse {
        parse_response(json).unwrap()
    }

    #[test]
    fn garbage_body_is_a_json_error() {
        let err = parse_response("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn renders_newest_step() {
        let resp = parse(
            r#"{"data":[{"steps":[
                {"created_at":"2024-03-01 10:00:00","event":"Accepted","place":"Minsk 220000"},
                {"created_at":"2024-03-04 08:15:00","event":"Arrived at post office","place":"Grodno 230005"},
                {"created_at":"2024-03-02 19:40:00","event":"In transit","place":""}
            ]}]}"#,
        );

        let snap = latest_status("PC123456789BY", &resp).unwrap();
        assert_eq!(
            snap.text,
            "2024-03-04 08:15:00: Arrived at post office (Grodno 230005)"
        );
    }

    #[test]
    fn omits_empty_place() {
        let resp = parse(
            r#"{"data":[{"steps":[{"created_at":"2024-03-02 19:40:00","event":"In transit","place":"  "}]}]}"#,
        );

        let snap = latest_status("X1", &resp).unwrap();
        assert_eq!(snap.text, "2024-03-02 19:40:00: In transit");
    }

    #[test]
    fn empty_data_is_a_carrier_error() {
        let err = latest_status("X1", &parse(r#"{"data":[]}"#)).unwrap_err();
        assert!(matches!(err, Error::Carrier(msg) if msg.contains("X1")));

        let err = latest_status("X1", &parse("{}")).unwrap_err();
        assert!(matches!(err, Error::Carrier(_)));
    }

    #[test]
    fn ignores_unknown_fields() {
        let resp = parse(
            r#"{"data":[{"id":1,"steps":[{"id":7,"created_at":"2024-01-01 00:00:00","event":"Sent","place":null,"code":"A"}]}],"meta":{}}"#,
        );
        assert_eq!(
            latest_status("X", &resp).unwrap().text,
            "2024-01-01 00:00:00: Sent"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_carrier_error() {
        let client =
            BelpostClient::new("http://127.0.0.1:9/tracking", Duration::from_secs(2)).unwrap();
        let err = client.fetch_status("X1").await.unwrap_err();
        assert!(matches!(err, Error::Carrier(_)));
    }
}
