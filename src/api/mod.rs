use crate::{
    api::{
        handlers::{admin, auth, documents, gates, health, me, root, verify},
        middleware::{
            ProtectedFeature, RouteGuard, guard, protect,
            rate_limit::{RateLimitGate, throttle},
            roles::RoleGate,
            security_headers::security_headers,
        },
        state::{AppState, AuthConfig, CryptoKeys, Stores},
    },
    credentials::BreachChecker,
    rate_limit::{LimitsConfig, RateLimitAction, RateLimiter},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod context;
pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;
pub mod state;

#[cfg(test)]
mod testing;

pub use openapi::openapi;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything [`new`] needs besides the database and the listener.
pub struct ServerConfig {
    pub auth: AuthConfig,
    pub keys: CryptoKeys,
    pub limits: LimitsConfig,
    pub breach: BreachChecker,
    pub request_timeout: Duration,
}

/// Build the API router: public routes, the login-limited group and the guarded groups.
///
/// `/` and `/health` are added by [`new`] because they need the database pool.
#[must_use]
pub fn router(state: &Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/v1/verify/:code", get(verify::verify_document))
        .route("/v1/auth/password-reset", post(auth::request_password_reset));

    let login_limited = Router::new()
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/register", post(auth::register))
        .route_layer(from_fn_with_state(
            RateLimitGate::new(state.clone(), RateLimitAction::Login),
            throttle,
        ));

    // Partial staff sessions may only finish MFA or leave.
    let mfa = guard(
        Router::new().route("/v1/auth/mfa/verify", post(auth::verify_mfa)),
        state,
        RouteGuard::mfa_exempt().with_limit(RateLimitAction::Login),
    );
    let logout = guard(
        Router::new().route("/v1/auth/logout", post(auth::logout)),
        state,
        RouteGuard::mfa_exempt(),
    );

    let session = guard(
        Router::new().route("/v1/me", get(me::get_me)),
        state,
        RouteGuard::authenticated(),
    );

    let administration = guard(
        Router::new().route("/v1/admin/users/:user_id/unlock", post(admin::unlock_user)),
        state,
        RouteGuard::authenticated().with_roles(RoleGate::administrators()),
    );

    let document_issuance = protect(
        Router::new().route("/v1/documents", post(documents::issue_document)),
        state,
        ProtectedFeature::Documents,
    );
    let ai_gate = protect(
        Router::new().route("/v1/gates/ai", post(gates::admit_ai)),
        state,
        ProtectedFeature::Ai,
    );
    let upload_gate = protect(
        Router::new().route("/v1/gates/uploads", post(gates::admit_upload)),
        state,
        ProtectedFeature::Uploads,
    );

    Router::new()
        .merge(public)
        .merge(login_limited)
        .merge(mfa)
        .merge(logout)
        .merge(session)
        .merge(administration)
        .merge(document_issuance)
        .merge(ai_gate)
        .merge(upload_gate)
        .layer(Extension(state.clone()))
        .layer(from_fn(security_headers))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: ServerConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let ServerConfig {
        auth,
        keys,
        limits,
        breach,
        request_timeout,
    } = config;

    let frontend_origin = frontend_origin(auth.frontend_base_url())?;
    let state = Arc::new(AppState::new(
        auth,
        keys,
        Stores::postgres(&pool),
        RateLimiter::new(&limits),
        breach,
    ));

    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(middleware::tenant::SCHOOL_OVERRIDE_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .layer(from_fn(security_headers))
        .merge(router(&state))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(TimeoutLayer::new(request_timeout))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
