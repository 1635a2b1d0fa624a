//! Auth cookies. Tokens never appear in response bodies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use optimus_core::models::auth::TokenPair;
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Cookie binding an OAuth `state` to the browser that started the flow.
pub const OAUTH_STATE_COOKIE: &str = "oauthState";

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// httpOnly cookie carrying the access token.
pub fn access_cookie(token: &str, max_age: chrono::Duration, secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        Duration::seconds(max_age.num_seconds()),
        secure,
    )
}

/// httpOnly cookie carrying the refresh token.
pub fn refresh_cookie(token: &str, max_age: chrono::Duration, secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        Duration::seconds(max_age.num_seconds()),
        secure,
    )
}

/// Add both token cookies to the jar.
pub fn with_tokens(
    jar: CookieJar,
    tokens: &TokenPair,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    secure: bool,
) -> CookieJar {
    jar.add(access_cookie(&tokens.access_token, access_ttl, secure))
        .add(refresh_cookie(&tokens.refresh_token, refresh_ttl, secure))
}

/// Overwrite both token cookies with expired, empty ones.
pub fn cleared(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, String::new(), Duration::ZERO, secure))
        .add(auth_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

/// Short-lived httpOnly cookie carrying the OAuth `state` issued to this
/// browser.
pub fn oauth_state_cookie(
    state: &str,
    max_age: std::time::Duration,
    secure: bool,
) -> Cookie<'static> {
    let max_age = Duration::try_from(max_age).unwrap_or(Duration::ZERO);
    auth_cookie(OAUTH_STATE_COOKIE, state.to_string(), max_age, secure)
}

/// Expire the OAuth state cookie.
pub fn without_oauth_state(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(auth_cookie(OAUTH_STATE_COOKIE, String::new(), Duration::ZERO, secure))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_cookie_is_http_only_with_ttl() {
        let c = access_cookie("tok", chrono::Duration::minutes(15), true);
        assert_eq!(c.name(), ACCESS_COOKIE);
        assert_eq!(c.value(), "tok");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), Some(Duration::minutes(15)));
    }

    #[test]
    fn cleared_jar_expires_both_cookies() {
        let jar = cleared(CookieJar::new(), false);
        for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
            let c = jar.get(name).expect("cookie present");
            assert_eq!(c.value(), "");
            assert_eq!(c.max_age(), Some(Duration::ZERO));
        }
    }

    #[test]
    fn oauth_state_cookie_is_short_lived() {
        let c = oauth_state_cookie("st", std::time::Duration::from_secs(600), false);
        assert_eq!(c.name(), OAUTH_STATE_COOKIE);
        assert_eq!(c.value(), "st");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.max_age(), Some(Duration::minutes(10)));

        let jar = without_oauth_state(CookieJar::new().add(c), false);
        let cleared = jar.get(OAUTH_STATE_COOKIE).expect("cookie present");
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(Duration::ZERO));
    }
}
