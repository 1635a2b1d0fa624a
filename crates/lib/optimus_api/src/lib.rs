//! # optimus_api
//!
//! HTTP front door for Optimus authentication and tenant scoping.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::routing::{get, post};
use optimus_core::auth::{PasswordHasher, PasswordResetLedger, ResetConfig, TokenService};
use optimus_core::mail::Mailer;
use optimus_core::oauth::{OAuthIdentityResolver, OAuthStateStore, ProviderRegistry};
use optimus_core::store::{CredentialStore, ResetTokenStore};
use optimus_core::tenant::TENANT_HEADER;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, companies, health, oauth, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub users: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub hasher: PasswordHasher,
    pub resets: Arc<PasswordResetLedger>,
    pub oauth: Arc<OAuthIdentityResolver>,
    /// Configured OAuth providers, fixed at startup.
    pub providers: Arc<ProviderRegistry>,
    /// Pending OAuth authorizations keyed by `state`.
    pub oauth_state: Arc<OAuthStateStore>,
}

impl AppState {
    /// Wire the core services over the given stores and collaborators.
    pub fn new(
        config: ApiConfig,
        users: Arc<dyn CredentialStore>,
        reset_store: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn Mailer>,
        providers: ProviderRegistry,
    ) -> Self {
        let hasher = PasswordHasher::new(config.hash_workers, config.bcrypt_cost);
        let tokens = Arc::new(TokenService::new(&config.tokens));
        let resets = Arc::new(PasswordResetLedger::new(
            Arc::clone(&users),
            reset_store,
            mailer,
            hasher.clone(),
            ResetConfig {
                ttl: config.reset_ttl,
                frontend_url: config.frontend_url.clone(),
                mail_timeout: config.mail.timeout,
            },
        ));
        let oauth = Arc::new(OAuthIdentityResolver::new(Arc::clone(&users)));
        Self {
            config,
            users,
            tokens,
            hasher,
            resets,
            oauth,
            providers: Arc::new(providers),
            oauth_state: Arc::new(OAuthStateStore::new()),
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `optimus_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    optimus_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Cookies need credentialed CORS, which rules out wildcards.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(TENANT_HEADER),
        ]);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_AUTH_FORGOT, post(auth::forgot_handler))
        .route(routes::POST_AUTH_RESET, post(auth::reset_handler))
        .route(routes::GET_AUTH_OAUTH_PROVIDER, get(oauth::start_handler))
        .route(
            routes::AUTH_PROVIDER_CALLBACK,
            get(oauth::callback_get_handler).post(oauth::callback_post_handler),
        );

    // Authenticated, not tenant-scoped
    let authed = Router::new()
        .route(
            routes::USERS_ME,
            get(users::me_handler).put(users::update_me_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Tenant-owned resources: auth, then tenant scope
    let scoped = Router::new()
        .route(routes::GET_COMPANY_SCOPE, get(companies::scope_handler))
        .route_layer(axum::middleware::from_fn(middleware::tenant::tenant_scope))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let api = Router::new().merge(public).merge(authed).merge(scoped);

    Router::new()
        .route(routes::PING, get(health::ping))
        .nest(routes::API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
