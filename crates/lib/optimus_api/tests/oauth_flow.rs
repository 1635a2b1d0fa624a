//! OAuth start and callback through the router with a scripted provider.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{Method, Request, StatusCode};
use common::{
    FRONTEND, ScriptedProvider, TestApp, TestResponse, get_request, query_param, registry_with,
    spawn_app, spawn_app_with,
};
use optimus_core::store::CredentialStore;
use serde_json::json;

fn newcomer() -> ScriptedProvider {
    ScriptedProvider::returning(json!({
        "id": "idp-42",
        "email": "Neo@Example.com",
        "given_name": "Neo",
        "family_name": "Anderson"
    }))
}

/// A started sign-in: the `state` sent to the provider and the cookie the
/// starting browser got back.
struct Flow {
    state: String,
    cookie: String,
}

async fn start(app: &TestApp) -> Flow {
    let resp = app.send(get_request("/api/v1/auth/oauth/scripted", &[])).await;
    assert!(resp.status.is_redirection(), "status {}", resp.status);
    let location = resp.location();
    assert!(location.starts_with("https://idp.test/authorize"));
    assert_eq!(
        query_param(&location, "code_challenge_method").as_deref(),
        Some("S256")
    );
    let state = query_param(&location, "state").expect("state in authorize url");
    assert_eq!(resp.cookies()["oauthState"], state);
    Flow {
        state,
        cookie: resp.cookie_header(),
    }
}

fn callback_uri(state: &str) -> String {
    format!("/api/v1/auth/scripted/callback?code=abc&state={state}")
}

/// Provider redirect landing back in the browser that started `flow`.
async fn finish(app: &TestApp, flow: &Flow) -> TestResponse {
    app.send(get_request(
        &callback_uri(&flow.state),
        &[("cookie", flow.cookie.as_str())],
    ))
    .await
}

#[tokio::test]
async fn new_profile_signs_in_and_sets_cookies() {
    let app = spawn_app_with(registry_with(newcomer()));
    let flow = start(&app).await;

    let resp = finish(&app, &flow).await;
    assert!(resp.status.is_redirection());
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=success"));
    let cookies = resp.cookies();
    assert!(cookies.contains_key("accessToken"));
    assert!(cookies.contains_key("refreshToken"));
    assert_eq!(cookies["oauthState"], "");

    let user = app
        .store
        .find_by_email("neo@example.com")
        .await
        .unwrap()
        .expect("account created");
    assert_eq!(user.first_name, "Neo");
    assert!(user.tenant_id.is_none());
}

#[tokio::test]
async fn state_is_single_use() {
    let app = spawn_app_with(registry_with(newcomer()));
    let flow = start(&app).await;

    finish(&app, &flow).await;
    let replay = finish(&app, &flow).await;
    assert_eq!(replay.location(), format!("{FRONTEND}/?oauth=fail"));
    assert!(!replay.cookies().contains_key("accessToken"));
}

#[tokio::test]
async fn forged_state_fails() {
    let app = spawn_app_with(registry_with(newcomer()));
    let resp = app
        .send(get_request(
            &callback_uri("forged"),
            &[("cookie", "oauthState=forged")],
        ))
        .await;
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=fail"));
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn callback_from_another_browser_fails() {
    let app = spawn_app_with(registry_with(newcomer()));
    let attacker = start(&app).await;
    let victim = start(&app).await;

    let cookieless = app.send(get_request(&callback_uri(&attacker.state), &[])).await;
    assert_eq!(cookieless.location(), format!("{FRONTEND}/?oauth=fail"));
    assert!(!cookieless.cookies().contains_key("accessToken"));

    let mismatched = app
        .send(get_request(
            &callback_uri(&attacker.state),
            &[("cookie", victim.cookie.as_str())],
        ))
        .await;
    assert_eq!(mismatched.location(), format!("{FRONTEND}/?oauth=fail"));
    assert!(!mismatched.cookies().contains_key("accessToken"));
    assert_eq!(app.store.user_count(), 0);

    // Rejected attempts do not burn the state for the browser that owns it.
    let own = finish(&app, &attacker).await;
    assert_eq!(own.location(), format!("{FRONTEND}/?oauth=success"));
}

#[tokio::test]
async fn existing_password_account_is_linked_and_flagged() {
    let app = spawn_app_with(registry_with(newcomer()));
    let registered = app
        .post_json(
            "/api/v1/auth/register",
            json!({
                "firstName": "Thomas",
                "email": "neo@example.com",
                "password": "pw",
                "role": "Applicant"
            }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let flow = start(&app).await;
    let resp = finish(&app, &flow).await;
    assert_eq!(
        resp.location(),
        format!("{FRONTEND}/?oauth=success&linked=existing")
    );
    assert_eq!(app.store.user_count(), 1);

    let access = resp.cookies()["accessToken"].clone();
    let claims = app.state.tokens.verify_access_token(&access).unwrap();
    assert_eq!(claims.sub.to_string(), registered.json["user"]["id"].as_str().unwrap());
}

#[tokio::test]
async fn exchange_failure_redirects_with_fail() {
    let mut provider = newcomer();
    provider.fail_exchange = true;
    let app = spawn_app_with(registry_with(provider));
    let flow = start(&app).await;

    let resp = finish(&app, &flow).await;
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=fail"));
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn slow_provider_times_out() {
    let mut provider = newcomer();
    provider.delay = Some(Duration::from_secs(2));
    let app = spawn_app_with(registry_with(provider));
    let flow = start(&app).await;

    let resp = finish(&app, &flow).await;
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=fail"));
}

#[tokio::test]
async fn provider_error_parameter_fails() {
    let app = spawn_app_with(registry_with(newcomer()));
    let flow = start(&app).await;
    let uri = format!(
        "/api/v1/auth/scripted/callback?error=access_denied&state={}",
        flow.state
    );
    let resp = app.send(get_request(&uri, &[("cookie", flow.cookie.as_str())])).await;
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=fail"));
}

#[tokio::test]
async fn form_post_callback_is_accepted() {
    let app = spawn_app_with(registry_with(newcomer()));
    let flow = start(&app).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/scripted/callback")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(COOKIE, &flow.cookie)
        .body(Body::from(format!("code=abc&state={}", flow.state)))
        .unwrap();
    let resp = app.send(req).await;
    assert_eq!(resp.location(), format!("{FRONTEND}/?oauth=success"));
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let app = spawn_app();
    let start = app.send(get_request("/api/v1/auth/oauth/myspace", &[])).await;
    assert_eq!(start.status, StatusCode::BAD_REQUEST);
    assert_eq!(start.json["message"], "Unknown provider");

    let callback = app
        .send(get_request("/api/v1/auth/myspace/callback?code=x&state=y", &[]))
        .await;
    assert_eq!(callback.status, StatusCode::BAD_REQUEST);
}
