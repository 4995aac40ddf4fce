//! Official document issuance.
//!
//! Flow Overview:
//! 1) Guarded as [`ProtectedFeature::Documents`](crate::api::middleware::ProtectedFeature):
//!    any full session, daily document limiter.
//! 2) Resolve the student inside the effective school; students of other schools are
//!    reported as missing.
//! 3) Students request their own documents, parents need a guardian link, staff may
//!    request for anyone in the school.
//! 4) Mint the verification code, register the document and audit the issuance.

use axum::{Json, extract::Extension, http::StatusCode};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        context::{ClientInfo, JsonBody, RequestContext},
        error::{ApiError, ErrorBody},
        handlers::verify::storage::NewDocument,
        state::AppState,
    },
    audit::AuditEntry,
    roles::Role,
};

/// Enrollment certificates lapse after one semester.
const ENROLLMENT_VALIDITY: Months = Months::new(6);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    EnrollmentCertificate,
    AttendanceLetter,
    AcademicStanding,
    TuitionConfirmation,
    Custom,
}

impl DocumentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnrollmentCertificate => "enrollment_certificate",
            Self::AttendanceLetter => "attendance_letter",
            Self::AcademicStanding => "academic_standing",
            Self::TuitionConfirmation => "tuition_confirmation",
            Self::Custom => "custom",
        }
    }

    fn expires_at(self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::EnrollmentCertificate => issued_at.checked_add_months(ENROLLMENT_VALIDITY),
            _ => None,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct IssueDocumentRequest {
    pub student_id: Uuid,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct IssuedDocument {
    pub document_id: Uuid,
    pub verification_code: String,
    /// Public page where the printed code can be checked.
    pub verification_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    post,
    path = "/v1/documents",
    request_body = IssueDocumentRequest,
    responses(
        (status = 201, description = "Document registered", body = IssuedDocument),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 403, description = "Not allowed to request documents for this student", body = ErrorBody),
        (status = 404, description = "No such student in this school", body = ErrorBody),
        (status = 429, description = "Daily document quota exhausted", body = ErrorBody)
    ),
    tag = "documents"
)]
pub async fn issue_document(
    state: Extension<Arc<AppState>>,
    context: RequestContext,
    client: ClientInfo,
    JsonBody(request): JsonBody<IssueDocumentRequest>,
) -> Result<(StatusCode, Json<IssuedDocument>), ApiError> {
    let tenant = context.require_tenant()?;
    let student = state
        .users()
        .find_by_id(request.student_id)
        .await?
        .filter(|user| user.role == Role::Student && user.tenant_id == Some(tenant))
        .ok_or(ApiError::NotFound)?;

    let requester = &context.identity;
    let allowed = match requester.role {
        Role::Student => requester.user_id == student.id,
        Role::Parent => {
            state
                .users()
                .is_guardian_of(requester.user_id, student.id)
                .await?
        }
        Role::Teacher | Role::Admin | Role::SuperAdmin => true,
    };
    if !allowed {
        return Err(ApiError::Forbidden);
    }

    let document_id = Uuid::new_v4();
    let verification_code = state
        .verification()
        .generate_code(document_id, tenant)
        .map_err(anyhow::Error::from)?;
    let expires_at = request.document_type.expires_at(Utc::now());

    state
        .documents()
        .register(&NewDocument {
            id: document_id,
            tenant_id: tenant,
            subject_id: student.id,
            subject_name: format!("{} {}", student.first_name, student.last_name),
            document_type: request.document_type.as_str().to_string(),
            verification_code: verification_code.clone(),
            issued_by: requester.user_id,
            expires_at,
        })
        .await?;
    info!(%document_id, document_type = request.document_type.as_str(), "document issued");

    state
        .audit()
        .write(
            AuditEntry::new("document.generate", "document")
                .with_tenant(Some(tenant))
                .with_actor(requester.user_id)
                .with_entity(document_id)
                .with_new_value(json!({
                    "type": request.document_type.as_str(),
                    "student_id": student.id,
                }))
                .with_client(client.ip_address, client.user_agent),
        )
        .await;

    let verification_url = format!(
        "{}/verify/{verification_code}",
        state.config().frontend_base_url().trim_end_matches('/')
    );
    Ok((
        StatusCode::CREATED,
        Json(IssuedDocument {
            document_id,
            verification_code,
            verification_url,
            expires_at,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            handlers::auth::storage::UserRecord,
            testing::{FRONTEND, TestApp, body_json, user},
        },
        rate_limit::{LimitsConfig, Quota, RateLimitAction},
    };
    use anyhow::Result;
    use axum::{
        body::Body,
        http::{Request, header::AUTHORIZATION},
        response::Response,
    };
    use tower::ServiceExt;

    fn student() -> Result<UserRecord> {
        user(Role::Student, "ana@school.test", "long enough password")
    }

    async fn issue(app: &TestApp, token: &str, body: serde_json::Value) -> Result<Response> {
        Ok(app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/documents")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))?,
            )
            .await?)
    }

    fn enrollment(student: &UserRecord) -> serde_json::Value {
        json!({ "student_id": student.id, "type": "enrollment_certificate" })
    }

    #[tokio::test]
    async fn issued_document_verifies_publicly() -> Result<()> {
        let ana = student()?;
        let app = TestApp::builder().user(ana.clone(), None).build()?;
        let token = app.token_for(&ana, false)?;

        let response = issue(&app, &token, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let issued: IssuedDocument = serde_json::from_value(body_json(response).await?)?;
        assert_eq!(
            issued.verification_url,
            format!("{FRONTEND}/verify/{}", issued.verification_code)
        );
        assert!(issued.expires_at.is_some_and(|at| at > Utc::now() + chrono::Duration::days(150)));
        assert_eq!(app.documents.len(), 1);

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/verify/{}", issued.verification_code))
                    .body(Body::empty())?,
            )
            .await?;
        let body = body_json(response).await?;
        assert_eq!(body["valid"], true);
        assert_eq!(body["subject_name"], "Ana Torres");

        let entries = app.audit_entries(2).await;
        assert!(entries.iter().any(|entry| entry.action == "document.generate"
            && entry.entity_id == Some(issued.document_id)));
        Ok(())
    }

    #[tokio::test]
    async fn only_enrollment_certificates_expire() -> Result<()> {
        let ana = student()?;
        let app = TestApp::builder().user(ana.clone(), None).build()?;
        let token = app.token_for(&ana, false)?;
        let response = issue(
            &app,
            &token,
            json!({ "student_id": ana.id, "type": "attendance_letter" }),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await?["expires_at"], serde_json::Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn students_only_request_their_own() -> Result<()> {
        let ana = student()?;
        let mut classmate = user(Role::Student, "leo@school.test", "long enough password")?;
        classmate.tenant_id = ana.tenant_id;
        let app = TestApp::builder()
            .user(ana.clone(), None)
            .user(classmate.clone(), None)
            .build()?;

        let response = issue(&app, &app.token_for(&classmate, false)?, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(app.documents.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn parents_need_a_guardian_link() -> Result<()> {
        let ana = student()?;
        let mut linked = user(Role::Parent, "mother@school.test", "long enough password")?;
        linked.tenant_id = ana.tenant_id;
        let mut stranger = user(Role::Parent, "stranger@school.test", "long enough password")?;
        stranger.tenant_id = ana.tenant_id;
        let app = TestApp::builder()
            .user(ana.clone(), None)
            .user(linked.clone(), None)
            .user(stranger.clone(), None)
            .guardian(linked.id, ana.id)
            .build()?;

        let response = issue(&app, &app.token_for(&linked, false)?, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = issue(&app, &app.token_for(&stranger, false)?, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn staff_of_other_school_see_no_student() -> Result<()> {
        let ana = student()?;
        let app = TestApp::builder().user(ana.clone(), None).build()?;

        let outsider = app.token(Role::Admin, Some(Uuid::new_v4()), true)?;
        let response = issue(&app, &outsider, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let teacher = app.token(Role::Teacher, ana.tenant_id, true)?;
        let response = issue(&app, &teacher, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() -> Result<()> {
        let ana = student()?;
        let app = TestApp::builder().user(ana.clone(), None).build()?;
        let token = app.token_for(&ana, false)?;
        let response = issue(&app, &token, json!({ "student_id": ana.id, "type": "diploma" })).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["error"], "invalid_request");
        Ok(())
    }

    #[tokio::test]
    async fn daily_quota_applies() -> Result<()> {
        let ana = student()?;
        let limits = LimitsConfig::default()
            .with_quota(RateLimitAction::DocumentGeneration, Quota::per_period(1, 86_400.0));
        let app = TestApp::builder().user(ana.clone(), None).limits(limits).build()?;
        let token = app.token_for(&ana, false)?;

        let response = issue(&app, &token, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = issue(&app, &token, enrollment(&ana)).await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.documents.len(), 1);
        Ok(())
    }
}
