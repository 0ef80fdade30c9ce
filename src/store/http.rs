use super::errors::{AttemptError, StoreError};
use super::retry::with_retry;
use super::RemoteStateStore;
use crate::config::StoreSettings;
use crate::consts::USER_AGENT;
use crate::manifest::{ManifestDocument, ReconciliationRecord};
use async_trait::async_trait;
use reqwest::{Error as ReqwestError, RequestBuilder, Response, StatusCode};
use url::Url;

const SCOPES_SEGMENT: &str = "scopes";

/// State store client speaking plain HTTP + JSON with a bearer token.
///
/// `GET    /scopes/{scope}/manifest`
/// `PUT    /scopes/{scope}/resources/{name}`
/// `DELETE /scopes/{scope}/resources/{name}`
///
/// Scope and resource names are sent as single percent-encoded path segments.
pub struct HttpStateStore {
    client: reqwest::Client,
    /// Base URL of the store
    /// e.g. http://state-store:8080
    base_url: Url,
    settings: StoreSettings,
}

impl HttpStateStore {
    pub fn new(settings: StoreSettings) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(StoreError::HttpBuilder)?;

        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(settings.base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    fn get_scope_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        // `.` and `..` are dropped from a path and would address a different record.
        if let Some(segment) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(StoreError::InvalidKey(segment.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(SCOPES_SEGMENT)
            .extend(segments);

        Ok(url)
    }

    fn get_manifest_url(&self, scope_id: &str) -> Result<Url, StoreError> {
        self.get_scope_url(&[scope_id, "manifest"])
    }

    fn get_resource_url(&self, scope_id: &str, resource_name: &str) -> Result<Url, StoreError> {
        self.get_scope_url(&[scope_id, "resources", resource_name])
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.timeout(self.settings.request_timeout);

        match &self.settings.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AttemptError> {
        let request = self
            .authorize(builder)
            .build()
            .map_err(|error| AttemptError::Permanent(StoreError::HttpBuilder(error)))?;

        self.client
            .execute(request)
            .await
            .map_err(transport_error_into_attempt_error)
    }
}

fn transport_error_into_attempt_error(error: ReqwestError) -> AttemptError {
    if error.is_timeout() {
        AttemptError::Transient(format!("request timed out: {error}"))
    } else if error.is_connect() || error.is_request() || error.is_body() {
        AttemptError::Transient(format!("connection error: {error}"))
    } else {
        AttemptError::Transient(format!("transport error: {error}"))
    }
}

fn status_code_into_attempt_error(status_code: StatusCode) -> AttemptError {
    match status_code {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AttemptError::Permanent(StoreError::Unauthorized)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AttemptError::Transient(format!("store answered {status_code}"))
        }
        status_code if status_code.is_server_error() => {
            AttemptError::Transient(format!("store answered {status_code}"))
        }
        status_code => AttemptError::Permanent(StoreError::Rejected {
            status: status_code.as_u16(),
        }),
    }
}

#[async_trait]
impl RemoteStateStore for HttpStateStore {
    async fn fetch_manifest(&self, scope_id: &str) -> Result<Option<ManifestDocument>, StoreError> {
        let url = self.get_manifest_url(scope_id)?;

        with_retry(&self.settings.retry, "fetch_manifest", || async {
            let response = self.send(self.client.get(url.clone())).await?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status_code if status_code.is_success() => {
                    let body = response
                        .text()
                        .await
                        .map_err(transport_error_into_attempt_error)?;

                    serde_json::from_str::<ManifestDocument>(&body)
                        .map(Some)
                        .map_err(|error| {
                            AttemptError::Permanent(StoreError::InvalidResponse(error.to_string()))
                        })
                }
                status_code => Err(status_code_into_attempt_error(status_code)),
            }
        })
        .await
    }

    async fn upsert_resource(
        &self,
        scope_id: &str,
        resource_name: &str,
        record: &ReconciliationRecord,
    ) -> Result<(), StoreError> {
        let url = self.get_resource_url(scope_id, resource_name)?;
        let body = serde_json::to_string(record)?;

        with_retry(&self.settings.retry, "upsert_resource", || async {
            let builder = self
                .client
                .put(url.clone())
                .header("Content-Type", "application/json")
                .body(body.clone());

            let response = self.send(builder).await?;

            match response.status() {
                status_code if status_code.is_success() => Ok(()),
                status_code => Err(status_code_into_attempt_error(status_code)),
            }
        })
        .await
    }

    async fn delete_resource(&self, scope_id: &str, resource_name: &str) -> Result<(), StoreError> {
        let url = self.get_resource_url(scope_id, resource_name)?;

        with_retry(&self.settings.retry, "delete_resource", || async {
            let response = self.send(self.client.delete(url.clone())).await?;

            match response.status() {
                // Already gone.
                StatusCode::NOT_FOUND => Ok(()),
                status_code if status_code.is_success() => Ok(()),
                status_code => Err(status_code_into_attempt_error(status_code)),
            }
        })
        .await
    }
}
