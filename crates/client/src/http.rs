//! HTTP implementation of [`ReservationStore`] against the cardesk API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use cardesk_core::reservation::ReceiptBlocker;
use cardesk_core::types::DbId;
use cardesk_db::models::reservation::{
    CreateReservation, Reservation, UpdateDetails, UpdateSerials,
};

use crate::store::{Completion, CreateResult, ReservationStore, StoreError};

/// Bounded per-request timeout. A partitioned network must fail the call,
/// not hang the submit control.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `{ "data": ... }` envelope used by every successful API response.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Error body shape produced by the API's error type.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    winner: Option<Reservation>,
    #[serde(default)]
    blockers: Option<Vec<ReceiptBlocker>>,
}

/// Store client bound to one officer's bearer token.
pub struct ApiStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiStore {
    /// Build a client for `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    /// Execute a request and decode the `data` envelope, translating error
    /// statuses into the store error taxonomy.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status.is_success() {
            let envelope: DataEnvelope<T> = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(format!("malformed response: {e}")))?;
            return Ok(envelope.data);
        }

        Err(error_from_status(status, read_error_body(response).await))
    }
}

/// Decode the error body, tolerating non-JSON responses from middleware.
async fn read_error_body(response: reqwest::Response) -> ErrorBody {
    response.json().await.unwrap_or(ErrorBody {
        error: String::new(),
        code: String::new(),
        winner: None,
        blockers: None,
    })
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(e.to_string())
    }
}

fn error_from_status(status: StatusCode, body: ErrorBody) -> StoreError {
    match status {
        StatusCode::BAD_REQUEST => {
            if let Some(blockers) = body.blockers {
                StoreError::ReceiptBlocked(blockers)
            } else {
                StoreError::Validation(body.error)
            }
        }
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized(body.error),
        StatusCode::FORBIDDEN => StoreError::Forbidden(body.error),
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::CONFLICT => StoreError::Conflict(body.error),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => StoreError::Timeout,
        other => StoreError::Transport(format!("HTTP {other}: {}", body.error)),
    }
}

#[async_trait]
impl ReservationStore for ApiStore {
    async fn create(&self, input: &CreateReservation) -> Result<CreateResult, StoreError> {
        let response = self
            .request(reqwest::Method::POST, "/reservations")
            .json(input)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();

        if status == StatusCode::CONFLICT {
            // The one expected failure: the 409 body carries the winner.
            let body = read_error_body(response).await;
            return Ok(CreateResult::Conflict {
                winner: body.winner,
            });
        }
        if status.is_success() {
            let envelope: DataEnvelope<Reservation> = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(format!("malformed response: {e}")))?;
            return Ok(CreateResult::Created(envelope.data));
        }

        Err(error_from_status(status, read_error_body(response).await))
    }

    async fn get_by_appointment(
        &self,
        appointment_no: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let encoded = urlencode(appointment_no.trim());
        self.execute(self.request(
            reqwest::Method::GET,
            &format!("/reservations/by-appointment/{encoded}"),
        ))
        .await
    }

    async fn update_serials(
        &self,
        id: DbId,
        input: &UpdateSerials,
    ) -> Result<Reservation, StoreError> {
        self.execute(
            self.request(reqwest::Method::PUT, &format!("/reservations/{id}/serials"))
                .json(input),
        )
        .await
    }

    async fn update_details(
        &self,
        id: DbId,
        input: &UpdateDetails,
    ) -> Result<Reservation, StoreError> {
        self.execute(
            self.request(reqwest::Method::PATCH, &format!("/reservations/{id}/details"))
                .json(input),
        )
        .await
    }

    async fn update_image(&self, id: DbId, url: &str) -> Result<Reservation, StoreError> {
        self.execute(
            self.request(reqwest::Method::PUT, &format!("/reservations/{id}/image"))
                .json(&json!({ "card_image_url": url })),
        )
        .await
    }

    async fn complete(&self, id: DbId) -> Result<Completion, StoreError> {
        self.execute(self.request(
            reqwest::Method::POST,
            &format!("/reservations/{id}/complete"),
        ))
        .await
    }

    async fn delete(&self, id: DbId) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .execute(self.request(reqwest::Method::DELETE, &format!("/reservations/{id}")))
            .await?;
        Ok(())
    }

    async fn list_today(&self) -> Result<Vec<Reservation>, StoreError> {
        self.execute(self.request(reqwest::Method::GET, "/reservations"))
            .await
    }
}

/// Percent-encode a path segment (appointment numbers are officer-typed).
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
