use super::{
    error::ErrorBody,
    handlers::{
        admin,
        auth::{self, types},
        documents, gates, health, me, verify,
    },
};
use crate::{roles::Role, session_token::Identity};
use utoipa::{
    OpenApi,
    openapi::{Contact, License, Tag},
};

/// Documented endpoints. `/` and `OPTIONS /health` are served but left out.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::mfa::verify_mfa,
        auth::logout::logout,
        auth::register::register,
        auth::password_reset::request_password_reset,
        me::get_me,
        verify::verify_document,
        admin::unlock_user,
        documents::issue_document,
        gates::admit_ai,
        gates::admit_upload,
    ),
    components(schemas(
        ErrorBody,
        Identity,
        Role,
        types::EncryptedLoginRequest,
        types::LoginResponse,
        types::UserSummary,
        types::MfaVerifyRequest,
        types::MfaVerifyResponse,
        types::RegisterRequest,
        types::RegisterResponse,
        types::PasswordResetRequest,
        me::MeResponse,
        verify::VerificationResponse,
        documents::DocumentType,
        documents::IssueDocumentRequest,
        documents::IssuedDocument,
        health::Health,
    ))
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();

    // Use Cargo.toml metadata instead of the utoipa crate info defaults.
    spec.info.title = env!("CARGO_PKG_NAME").to_string();
    spec.info.version = env!("CARGO_PKG_VERSION").to_string();
    spec.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    spec.info.contact = cargo_contact();
    spec.info.license = cargo_license();

    spec.tags = Some(vec![
        tag("auth", "Login, MFA, registration and password reset"),
        tag("me", "Session introspection"),
        tag("verify", "Public document verification"),
        tag("admin", "School administration"),
        tag("documents", "Official document issuance"),
        tag("gates", "Forward-auth checks for the AI and upload services"),
        tag("health", "Liveness and database status"),
    ]);

    spec
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
