//! Route paths. Everything except [`PING`] is nested under [`API_PREFIX`].

pub const API_PREFIX: &str = "/api/v1";

pub const PING: &str = "/ping";

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const POST_AUTH_FORGOT: &str = "/auth/forgot";
pub const POST_AUTH_RESET: &str = "/auth/reset";
pub const GET_AUTH_OAUTH_PROVIDER: &str = "/auth/oauth/{provider}";
pub const AUTH_PROVIDER_CALLBACK: &str = "/auth/{provider}/callback";

pub const USERS_ME: &str = "/users/me";

pub const GET_COMPANY_SCOPE: &str = "/companies/{company_id}/scope";
