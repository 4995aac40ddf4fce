//! Password login.
//!
//! Flow Overview:
//! 1) Decrypt the AES-GCM payload into `{email, password}`.
//! 2) Look the user up; reject inactive, then locked accounts.
//! 3) Verify the Argon2id hash off the async runtime. A miss bumps the failure
//!    counter in the store (and may lock the account); a hit resets it.
//! 4) Issue a session token. Staff with MFA enrolled get `mfa_done = false` and must
//!    call `/v1/auth/mfa/verify` before anything else.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    session::{record_session, session_cookie},
    storage::UserRecord,
    types::{EncryptedLoginRequest, LoginCredentials, LoginResponse, UserSummary},
    utils::normalize_email,
};
use crate::{
    api::{
        context::{ClientInfo, JsonBody},
        error::{ApiError, ErrorBody},
        state::AppState,
    },
    audit::AuditEntry,
    credentials::verify_password,
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = EncryptedLoginRequest,
    responses(
        (status = 200, description = "Session issued; cookie set", body = LoginResponse),
        (status = 400, description = "Malformed or undecryptable payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account inactive", body = ErrorBody),
        (status = 429, description = "Account locked or rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    client: ClientInfo,
    JsonBody(request): JsonBody<EncryptedLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plaintext = state
        .login_cipher()
        .decrypt(request.encrypted.trim())
        .map_err(|err| {
            debug!("login payload rejected: {err}");
            ApiError::DecryptionFailed
        })?;
    let credentials: LoginCredentials = serde_json::from_slice(&plaintext)
        .map_err(|_| ApiError::invalid_request("decrypted payload is not valid JSON"))?;
    let email = normalize_email(&credentials.email);
    if email.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::invalid_request("email and password are required"));
    }

    let Some(user) = state.users().find_by_email(&email).await? else {
        audit_failed_login(&state, &email, None, &client);
        return Err(ApiError::InvalidCredentials);
    };

    if !user.is_active {
        return Err(ApiError::AccountInactive);
    }
    let now = Utc::now();
    if user.lock.is_locked(now) {
        info!(user_id = %user.id, "login attempt on locked account");
        return Err(ApiError::AccountLocked);
    }

    if !password_matches(&credentials.password, &user).await? {
        let outcome = state
            .users()
            .record_failed_login(user.id, &state.config().lockout(), now)
            .await?;
        if let Some(outcome) = outcome
            && outcome.lock.is_locked(now)
        {
            warn!(user_id = %user.id, attempts = outcome.attempts, "account locked after failed logins");
        }
        audit_failed_login(&state, &email, Some(&user), &client);
        return Err(ApiError::InvalidCredentials);
    }

    state.users().record_successful_login(user.id).await?;

    let mfa_done = !user.role.requires_mfa() || !user.mfa_enabled;
    let issued = state
        .tokens()
        .issue(user.id, user.tenant_id, user.role, &user.email, mfa_done)
        .context("failed to issue session token")?;
    record_session(&state, &issued, user.id, user.tenant_id, &client).await;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        session_cookie(&issued).context("failed to build session cookie")?,
    );

    let body = if mfa_done {
        LoginResponse::Authenticated {
            user: UserSummary::from(&user),
        }
    } else {
        LoginResponse::MfaPending {
            mfa_required: true,
            user_id: user.id,
        }
    };
    Ok((headers, Json(body)))
}

async fn password_matches(password: &str, user: &UserRecord) -> Result<bool, ApiError> {
    let password = password.to_string();
    let stored = user.password_hash.clone();
    let user_id = user.id;
    // Argon2id with 64 MiB is too heavy for a runtime worker.
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .context("password verification task failed")?;
    Ok(verified.unwrap_or_else(|err| {
        warn!(user_id = %user_id, "stored password hash is unusable: {err}");
        false
    }))
}

fn audit_failed_login(
    state: &AppState,
    email: &str,
    user: Option<&UserRecord>,
    client: &ClientInfo,
) {
    let mut entry = AuditEntry::new("user.login_failed", "user")
        .with_new_value(json!({ "email": email }))
        .with_client(client.ip_address.clone(), client.user_agent.clone());
    if let Some(user) = user {
        entry = entry.with_tenant(user.tenant_id).with_entity(user.id);
    }
    state.audit().spawn_write(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::testing::{LOGIN_KEY, TestApp, body_json, proxy_peer, user},
        credentials::LockState,
        crypto::LoginPayloadCipher,
        rate_limit::{LimitsConfig, Quota, RateLimitAction},
        roles::Role,
        session_token::hash_token,
    };
    use anyhow::Result;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode, header::CONTENT_TYPE},
        response::Response,
    };
    use tokio::task::JoinSet;
    use tower::ServiceExt;

    const PASSWORD: &str = "correct horse battery";

    fn encrypted_body(email: &str, password: &str) -> Result<String> {
        let cipher = LoginPayloadCipher::from_key(&LOGIN_KEY)?;
        let payload = serde_json::to_vec(&json!({ "email": email, "password": password }))?;
        Ok(json!({ "encrypted": cipher.encrypt(&payload)? }).to_string())
    }

    /// Login as forwarded by the trusted local proxy for `client`.
    fn login_request(body: String, client: &str) -> Result<Request<Body>> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header(CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body))?;
        request.extensions_mut().insert(ConnectInfo(proxy_peer()));
        Ok(request)
    }

    async fn post_login(app: &TestApp, body: String) -> Result<Response> {
        Ok(app
            .router()
            .oneshot(login_request(body, "203.0.113.50")?)
            .await?)
    }

    #[tokio::test]
    async fn parent_login_sets_cookie_and_returns_user() -> Result<()> {
        let parent = user(Role::Parent, "parent@school.test", PASSWORD)?;
        let app = TestApp::builder().user(parent.clone(), None).build()?;

        let response = post_login(&app, encrypted_body("Parent@School.test ", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();
        assert!(cookie.starts_with("session="));
        assert!(cookie.ends_with(&format!("Max-Age={}", 24 * 60 * 60)));

        let body = body_json(response).await?;
        assert_eq!(body["user"]["id"], parent.id.to_string());
        assert_eq!(body["user"]["role"], "parent");

        let token = cookie
            .trim_start_matches("session=")
            .split(';')
            .next()
            .unwrap_or_default();
        let identity = app.state.tokens().validate(token)?;
        assert!(identity.mfa_done);
        let sessions = app.sessions.all();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token_hash, hash_token(token));
        assert_eq!(sessions[0].ip_address.as_deref(), Some("203.0.113.50"));
        Ok(())
    }

    #[tokio::test]
    async fn staff_with_mfa_gets_partial_session() -> Result<()> {
        let mut teacher = user(Role::Teacher, "teacher@school.test", PASSWORD)?;
        teacher.mfa_enabled = true;
        let app = TestApp::builder().user(teacher.clone(), None).build()?;

        let response = post_login(&app, encrypted_body("teacher@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["mfa_required"], true);
        assert_eq!(body["user_id"], teacher.id.to_string());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_counts_and_audits() -> Result<()> {
        let admin = user(Role::Admin, "admin@school.test", PASSWORD)?;
        let app = TestApp::builder().user(admin.clone(), None).build()?;

        let response = post_login(&app, encrypted_body("admin@school.test", "nope nope nope")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await?["error"], "invalid_credentials");

        let stored = app.users.get(admin.id).map(|u| u.record.failed_login_attempts);
        assert_eq!(stored, Some(1));
        let entries = app.audit_entries(1).await;
        assert_eq!(entries[0].action, "user.login_failed");
        assert_eq!(
            entries[0].new_value,
            Some(json!({ "email": "admin@school.test" }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_matches_wrong_password() -> Result<()> {
        let app = TestApp::new()?;
        let response = post_login(&app, encrypted_body("ghost@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await?["error"], "invalid_credentials");
        Ok(())
    }

    #[tokio::test]
    async fn fifth_failure_locks_then_correct_password_is_refused() -> Result<()> {
        let mut teacher = user(Role::Teacher, "teacher@school.test", PASSWORD)?;
        teacher.failed_login_attempts = 4;
        let app = TestApp::builder().user(teacher.clone(), None).build()?;

        let response = post_login(&app, encrypted_body("teacher@school.test", "wrong")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let record = app.users.get(teacher.id).map(|u| u.record);
        assert!(matches!(record.map(|r| r.lock), Some(LockState::Until(_))));

        let response = post_login(&app, encrypted_body("teacher@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await?["error"], "account_locked");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_failures_are_all_counted() -> Result<()> {
        const ATTEMPTS: usize = 8;
        let teacher = user(Role::Teacher, "teacher@school.test", PASSWORD)?;
        let app = TestApp::builder().user(teacher.clone(), None).build()?;

        let mut logins = JoinSet::new();
        for _ in 0..ATTEMPTS {
            let router = app.router();
            let request = login_request(
                encrypted_body("teacher@school.test", "wrong password")?,
                "203.0.113.50",
            )?;
            logins.spawn(async move { router.oneshot(request).await });
        }

        // Each attempt either counted as a failure or found the account already locked.
        let mut counted = 0;
        while let Some(result) = logins.join_next().await {
            let status = result??.status();
            match status {
                StatusCode::UNAUTHORIZED => counted += 1,
                StatusCode::TOO_MANY_REQUESTS => {}
                other => anyhow::bail!("unexpected status {other}"),
            }
        }

        let record = app.users.get(teacher.id).map(|u| u.record);
        let attempts = record.as_ref().map(|r| r.failed_login_attempts);
        assert_eq!(attempts, i32::try_from(counted).ok());
        assert!(counted >= 5, "only {counted} failures were counted");
        assert!(matches!(
            record.map(|r| r.lock),
            Some(LockState::Until(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn success_resets_counter() -> Result<()> {
        let mut student = user(Role::Student, "student@school.test", PASSWORD)?;
        student.failed_login_attempts = 3;
        let app = TestApp::builder().user(student.clone(), None).build()?;

        let response = post_login(&app, encrypted_body("student@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let attempts = app.users.get(student.id).map(|u| u.record.failed_login_attempts);
        assert_eq!(attempts, Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn inactive_account_is_refused() -> Result<()> {
        let mut parent = user(Role::Parent, "parent@school.test", PASSWORD)?;
        parent.is_active = false;
        let app = TestApp::builder().user(parent, None).build()?;
        let response = post_login(&app, encrypted_body("parent@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await?["error"], "account_inactive");
        Ok(())
    }

    #[tokio::test]
    async fn tampered_payload_fails_decryption() -> Result<()> {
        let app = TestApp::new()?;
        let other = LoginPayloadCipher::from_key(&[9u8; 32])?;
        let body = json!({ "encrypted": other.encrypt(b"{}")? }).to_string();
        let response = post_login(&app, body).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["error"], "decryption_failed");

        let response = post_login(&app, r#"{"email":"plain@school.test"}"#.to_string()).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["error"], "invalid_request");
        Ok(())
    }

    #[tokio::test]
    async fn login_limiter_is_keyed_by_client_ip() -> Result<()> {
        let limits =
            LimitsConfig::default().with_quota(RateLimitAction::Login, Quota::per_period(1, 3600.0));
        let app = TestApp::builder().limits(limits).build()?;

        let response = post_login(&app, encrypted_body("a@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = post_login(&app, encrypted_body("b@school.test", PASSWORD)?).await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await?["error"], "rate_limit_exceeded");

        let other_client = app
            .router()
            .oneshot(login_request(
                encrypted_body("c@school.test", PASSWORD)?,
                "198.51.100.20",
            )?)
            .await?;
        assert_eq!(other_client.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn direct_clients_cannot_rotate_forwarded_for() -> Result<()> {
        let limits =
            LimitsConfig::default().with_quota(RateLimitAction::Login, Quota::per_period(1, 3600.0));
        let app = TestApp::builder().limits(limits).build()?;
        let direct: std::net::SocketAddr = ([192, 0, 2, 44], 51_000).into();

        let mut statuses = Vec::new();
        for forged in ["203.0.113.1", "203.0.113.2"] {
            let mut request = login_request(encrypted_body("a@school.test", PASSWORD)?, forged)?;
            request.extensions_mut().insert(ConnectInfo(direct));
            statuses.push(app.router().oneshot(request).await?.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::UNAUTHORIZED, StatusCode::TOO_MANY_REQUESTS]
        );
        Ok(())
    }
}
