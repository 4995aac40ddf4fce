//! Public document verification.
//!
//! Anyone holding a printed code can check it. The response is always 200 and only
//! says whether the document is valid; misses, forged codes and expired documents all
//! look the same to the caller.

pub mod storage;

use axum::{
    Json,
    extract::{Extension, Path},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::api::state::AppState;
use storage::DocumentRecord;

const MAX_CODE_LEN: usize = 128;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct VerificationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl VerificationResponse {
    fn invalid() -> Self {
        Self::default()
    }

    fn valid(record: DocumentRecord) -> Self {
        Self {
            valid: true,
            document_type: Some(record.document_type),
            subject_name: Some(record.subject_name),
            school_name: record.school_name,
            issued_at: Some(record.issued_at),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/verify/{code}",
    params(("code" = String, Path, description = "Verification code printed on the document")),
    responses(
        (status = 200, description = "Verification result", body = VerificationResponse)
    ),
    tag = "verify"
)]
pub async fn verify_document(
    Path(code): Path<String>,
    state: Extension<Arc<AppState>>,
) -> Json<VerificationResponse> {
    Json(check(&state, code.trim()).await)
}

async fn check(state: &AppState, code: &str) -> VerificationResponse {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return VerificationResponse::invalid();
    }

    let record = match state.documents().find_by_code(code).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!("verification code not found");
            return VerificationResponse::invalid();
        }
        Err(err) => {
            error!("Failed to look up verification code: {err:#}");
            return VerificationResponse::invalid();
        }
    };

    if !state
        .verification()
        .verify_code(code, record.id, record.tenant_id)
    {
        warn!(document_id = %record.id, "verification code does not match document");
        return VerificationResponse::invalid();
    }

    if record.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
        debug!(document_id = %record.id, "document has expired");
        return VerificationResponse::invalid();
    }

    VerificationResponse::valid(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{TestApp, body_json};
    use anyhow::Result;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn document(tenant_id: Uuid) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            tenant_id,
            school_name: Some("Riverside High".to_string()),
            document_type: "enrollment_certificate".to_string(),
            subject_name: "Ana Torres".to_string(),
            issued_at: Utc::now() - Duration::days(3),
            expires_at: None,
        }
    }

    async fn get(app: &TestApp, code: &str) -> Result<serde_json::Value> {
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/verify/{code}"))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn issued_code_verifies() -> Result<()> {
        let app = TestApp::new()?;
        let record = document(Uuid::new_v4());
        let code = app
            .state
            .verification()
            .generate_code(record.id, record.tenant_id)?;
        app.documents.insert(code.clone(), record);

        let body = get(&app, &code).await?;
        assert_eq!(body["valid"], true);
        assert_eq!(body["subject_name"], "Ana Torres");
        assert_eq!(body["school_name"], "Riverside High");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_code_is_invalid_without_reason() -> Result<()> {
        let app = TestApp::new()?;
        let body = get(&app, "bm90LWEtcmVhbC1jb2Rl").await?;
        assert_eq!(body, serde_json::json!({"valid": false}));
        Ok(())
    }

    #[tokio::test]
    async fn code_minted_for_other_tenant_is_invalid() -> Result<()> {
        let app = TestApp::new()?;
        let record = document(Uuid::new_v4());
        let foreign = app
            .state
            .verification()
            .generate_code(record.id, Uuid::new_v4())?;
        app.documents.insert(foreign.clone(), record);

        let body = get(&app, &foreign).await?;
        assert_eq!(body, serde_json::json!({"valid": false}));
        Ok(())
    }

    #[tokio::test]
    async fn expired_document_is_invalid() -> Result<()> {
        let app = TestApp::new()?;
        let mut record = document(Uuid::new_v4());
        record.expires_at = Some(Utc::now() - Duration::minutes(1));
        let code = app
            .state
            .verification()
            .generate_code(record.id, record.tenant_id)?;
        app.documents.insert(code.clone(), record);

        let body = get(&app, &code).await?;
        assert_eq!(body["valid"], false);
        Ok(())
    }
}
