//! Ticket redemption against the application's login endpoint.
//!
//! The endpoint's response contract is inconsistent across deployments, so all
//! shape and success inference lives in [`normalize`]. Callers only ever see an
//! [`ExchangeResult`].

use std::future::Future;

use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use url::Url;

use crate::session::{Session, UserInfo};
use crate::ticket::{TICKET_PARAM, Ticket};

/// Fallback notification for failures without a usable server message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Ticket login failed";
/// Notification for a reported success that carries no credentials.
pub const MISSING_TOKEN_MESSAGE: &str = "Ticket login response missing token";
/// Notification for a session that could not be saved.
pub const PERSISTENCE_FAILURE_MESSAGE: &str = "Failed to save login session";

/// Why a ticket exchange did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The request could not be sent or its response could not be read.
    #[error("Ticket exchange request failed: {0}")]
    Transport(String),

    /// The server reported success but the credentials are missing.
    #[error("Ticket exchange response is missing credentials")]
    MissingCredentials,

    /// The server reported a non-success code.
    #[error("Ticket exchange rejected: {}", message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },

    /// The session could not be persisted.
    #[error("Failed to persist session: {0}")]
    Persistence(String),
}

impl ExchangeError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Transport(_) => GENERIC_FAILURE_MESSAGE,
            Self::MissingCredentials => MISSING_TOKEN_MESSAGE,
            Self::Rejected { message } => message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE),
            Self::Persistence(_) => PERSISTENCE_FAILURE_MESSAGE,
        }
    }
}

/// Credentials and identity granted for a redeemed ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeGrant {
    pub authorization: String,
    pub access_token: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

impl ExchangeGrant {
    /// Builds the session to persist.
    ///
    /// The display name falls back to the user id; the email is the user id.
    pub fn to_session(&self) -> Session {
        let uid = self.user_id.clone().unwrap_or_default();
        let name = self
            .display_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| uid.clone());
        Session {
            authorization: self.authorization.clone(),
            access_token: self.access_token.clone(),
            user_info: UserInfo {
                avatar: self.avatar.clone(),
                name,
                email: uid,
            },
        }
    }
}

/// Outcome of a redemption.
pub type ExchangeResult = Result<ExchangeGrant, ExchangeError>;

/// Redeems a ticket for session credentials.
pub trait TicketExchange: Send + Sync {
    /// Performs one redemption. `page` is the location the ticket arrived on;
    /// relative endpoints resolve against its origin.
    fn redeem(&self, ticket: &Ticket, page: &Url) -> impl Future<Output = ExchangeResult> + Send;
}

/// Reads a string-ish field. Numbers are accepted; empty strings count as absent.
fn text_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turns a raw envelope plus the authorization response header into a result.
///
/// - `data` is unwrapped when present and not null, else the top level is used.
/// - `userName` takes precedence over `username` whenever it is present.
/// - The authorization value comes from the header, else `Bearer <access_token>`.
/// - `code` 0 or 200 is success; an absent `code` infers success from
///   `access_token`; anything else is a rejection carrying `message`.
/// - A success without both authorization and token is downgraded.
pub fn normalize(body: &Value, authorization_header: Option<&str>) -> ExchangeResult {
    let payload = match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => body,
    };

    let access_token = text_field(payload, "access_token");
    let user_id = text_field(payload, "uid");
    let display_name = match payload.get("userName") {
        Some(value) if !value.is_null() => text_field(payload, "userName"),
        _ => text_field(payload, "username"),
    };
    let avatar = payload
        .get("avatar")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let authorization = authorization_header
        .filter(|h| !h.is_empty())
        .map(ToString::to_string)
        .or_else(|| access_token.as_ref().map(|t| format!("Bearer {t}")));

    let success = match body.get("code") {
        None => access_token.is_some(),
        Some(code) => code.as_i64().is_some_and(|c| c == 0 || c == 200),
    };

    if !success {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(ToString::to_string);
        return Err(ExchangeError::Rejected { message });
    }

    let (Some(authorization), Some(access_token)) = (authorization, access_token) else {
        return Err(ExchangeError::MissingCredentials);
    };

    Ok(ExchangeGrant {
        authorization,
        access_token,
        user_id,
        display_name,
        avatar,
    })
}

/// Resolves the redemption URL for `ticket` arriving on `page`.
///
/// The endpoint may be absolute or relative to the page's origin, never to the
/// page path. Any existing `ticket` parameter on the endpoint is replaced.
///
/// # Errors
/// Returns [`ExchangeError::Transport`] if the endpoint cannot be resolved.
pub fn redemption_url(endpoint: &str, ticket: &Ticket, page: &Url) -> Result<Url, ExchangeError> {
    let invalid = |e: url::ParseError| {
        ExchangeError::Transport(format!("invalid ticket login URL {endpoint}: {e}"))
    };
    let mut url = page.join("/").and_then(|origin| origin.join(endpoint)).map_err(invalid)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TICKET_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(TICKET_PARAM, ticket.as_str());
    Ok(url)
}

/// HTTP implementation of [`TicketExchange`].
///
/// Sends a plain GET; no bearer token is ever attached to the redemption call.
#[derive(Debug, Clone)]
pub struct HttpTicketExchange {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTicketExchange {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TicketExchange for HttpTicketExchange {
    async fn redeem(&self, ticket: &Ticket, page: &Url) -> ExchangeResult {
        let url = redemption_url(&self.endpoint, ticket, page)?;
        tracing::debug!(endpoint = %self.endpoint, "Redeeming ticket");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        let authorization = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        // A body that is not JSON is treated as an empty envelope.
        let body: Value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(%status, error = %e, "Ticket login response is not JSON");
            Value::Object(serde_json::Map::new())
        });

        normalize(&body, authorization.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ticket::detect_ticket;

    fn ticket(value: &str) -> Ticket {
        let page = Url::parse(&format!("https://app.example/login?ticket={value}")).unwrap();
        detect_ticket(&page).unwrap()
    }

    #[test]
    fn test_success_with_header() {
        let body = json!({"code": 0, "data": {"access_token": "T", "uid": "U"}});
        let grant = normalize(&body, Some("Bearer T")).unwrap();

        assert_eq!(grant.authorization, "Bearer T");
        assert_eq!(grant.access_token, "T");
        let session = grant.to_session();
        assert_eq!(session.access_token, "T");
        assert_eq!(session.user_info.email, "U");
        assert_eq!(session.user_info.name, "U");
    }

    #[test]
    fn test_code_200_is_success() {
        let body = json!({"code": 200, "data": {"access_token": "T"}});
        assert!(normalize(&body, None).is_ok());
    }

    #[test]
    fn test_bearer_synthesized_without_header() {
        let body = json!({"code": 0, "data": {"access_token": "T"}});
        let grant = normalize(&body, None).unwrap();
        assert_eq!(grant.authorization, "Bearer T");

        let grant = normalize(&body, Some("")).unwrap();
        assert_eq!(grant.authorization, "Bearer T");
    }

    #[test]
    fn test_header_wins_over_synthesized_bearer() {
        let body = json!({"code": 0, "data": {"access_token": "T"}});
        let grant = normalize(&body, Some("Token abc")).unwrap();
        assert_eq!(grant.authorization, "Token abc");
        assert_eq!(grant.access_token, "T");
    }

    #[test]
    fn test_success_code_without_token_is_downgraded() {
        let body = json!({"code": 0, "data": {"uid": "U"}});
        assert_eq!(normalize(&body, None), Err(ExchangeError::MissingCredentials));

        // A header alone is not enough either.
        assert_eq!(
            normalize(&body, Some("Bearer X")),
            Err(ExchangeError::MissingCredentials)
        );
    }

    #[test]
    fn test_absent_code_infers_from_token() {
        let body = json!({"data": {"access_token": "T"}});
        let grant = normalize(&body, None).unwrap();
        assert_eq!(grant.access_token, "T");

        let body = json!({"data": {"uid": "U"}});
        assert_eq!(
            normalize(&body, None),
            Err(ExchangeError::Rejected { message: None })
        );
    }

    #[test]
    fn test_empty_token_counts_as_absent() {
        let body = json!({"code": 0, "data": {"access_token": ""}});
        assert_eq!(normalize(&body, None), Err(ExchangeError::MissingCredentials));

        let body = json!({"data": {"access_token": ""}});
        assert_eq!(
            normalize(&body, None),
            Err(ExchangeError::Rejected { message: None })
        );
    }

    #[test]
    fn test_top_level_payload() {
        let body = json!({"access_token": "T", "uid": "U", "username": "alice"});
        let grant = normalize(&body, None).unwrap();
        assert_eq!(grant.user_id.as_deref(), Some("U"));
        assert_eq!(grant.display_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_null_data_falls_back_to_top_level() {
        let body = json!({"code": 0, "data": null, "access_token": "T"});
        assert!(normalize(&body, None).is_ok());
    }

    #[test]
    fn test_explicit_failure_message() {
        let body = json!({"code": 403, "message": "expired"});
        let err = normalize(&body, None).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::Rejected {
                message: Some("expired".to_string())
            }
        );
        assert_eq!(err.user_message(), "expired");
    }

    #[test]
    fn test_explicit_failure_generic_message() {
        let err = normalize(&json!({"code": 500, "message": ""}), None).unwrap_err();
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_rejection_wins_over_present_token() {
        let body = json!({"code": 401, "data": {"access_token": "T"}});
        assert!(matches!(
            normalize(&body, Some("Bearer T")),
            Err(ExchangeError::Rejected { .. })
        ));
    }

    #[test]
    fn test_null_or_string_code_is_failure() {
        let body = json!({"code": null, "data": {"access_token": "T"}});
        assert!(normalize(&body, None).is_err());

        let body = json!({"code": "0", "data": {"access_token": "T"}});
        assert!(normalize(&body, None).is_err());
    }

    #[test]
    fn test_user_name_precedence() {
        let body = json!({"code": 0, "data": {"access_token": "T", "userName": "A", "username": "b"}});
        assert_eq!(normalize(&body, None).unwrap().display_name.as_deref(), Some("A"));

        let body = json!({"code": 0, "data": {"access_token": "T", "userName": null, "username": "b"}});
        assert_eq!(normalize(&body, None).unwrap().display_name.as_deref(), Some("b"));
    }

    #[test]
    fn test_session_identity_mapping() {
        let body = json!({"code": 0, "data": {
            "access_token": "T", "uid": 2_301_001, "userName": "Alice", "avatar": "a.png"
        }});
        let session = normalize(&body, None).unwrap().to_session();
        assert_eq!(session.user_info.name, "Alice");
        assert_eq!(session.user_info.email, "2301001");
        assert_eq!(session.user_info.avatar.as_deref(), Some("a.png"));

        let body = json!({"code": 0, "data": {"access_token": "T"}});
        let session = normalize(&body, None).unwrap().to_session();
        assert_eq!(session.user_info.name, "");
        assert_eq!(session.user_info.email, "");
        assert!(session.user_info.avatar.is_none());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ExchangeError::Transport("boom".into()).user_message(),
            GENERIC_FAILURE_MESSAGE
        );
        assert_eq!(
            ExchangeError::MissingCredentials.user_message(),
            MISSING_TOKEN_MESSAGE
        );
        assert_eq!(
            ExchangeError::Persistence("disk".into()).user_message(),
            PERSISTENCE_FAILURE_MESSAGE
        );
    }

    #[test]
    fn test_redemption_url_relative() {
        let page = Url::parse("https://app.example/login?ticket=ST-1&lang=zh").unwrap();
        let url = redemption_url("/v1/user/login", &ticket("ST-1"), &page).unwrap();
        assert_eq!(url.as_str(), "https://app.example/v1/user/login?ticket=ST-1");
    }

    #[test]
    fn test_redemption_url_resolves_against_origin() {
        let page = Url::parse("https://app.example/sso/login?ticket=ST-1").unwrap();
        let url = redemption_url("v1/user/login", &ticket("ST-1"), &page).unwrap();
        assert_eq!(url.as_str(), "https://app.example/v1/user/login?ticket=ST-1");

        let url = redemption_url("/v1/user/login", &ticket("ST-1"), &page).unwrap();
        assert_eq!(url.as_str(), "https://app.example/v1/user/login?ticket=ST-1");
    }

    #[test]
    fn test_redemption_url_absolute_replaces_ticket() {
        let page = Url::parse("https://app.example/login").unwrap();
        let url = redemption_url(
            "https://api.example/v1/user/login?ticket=stale&client=web",
            &ticket("ST-2"),
            &page,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example/v1/user/login?client=web&ticket=ST-2"
        );
    }

    #[tokio::test]
    async fn test_http_redeem_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/user/login"))
            .and(query_param("ticket", "ST-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Authorization", "Bearer T")
                    .set_body_json(json!({"code": 0, "data": {"access_token": "T", "uid": "U"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page = Url::parse(&format!("{}/login?ticket=ST-1", server.uri())).unwrap();
        let exchange = HttpTicketExchange::new("/v1/user/login");
        let grant = exchange.redeem(&ticket("ST-1"), &page).await.unwrap();

        assert_eq!(grant.authorization, "Bearer T");
        assert_eq!(grant.access_token, "T");
        assert_eq!(grant.user_id.as_deref(), Some("U"));
    }

    #[tokio::test]
    async fn test_http_redeem_sends_no_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/user/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"access_token": "T"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page = Url::parse(&format!("{}/login?ticket=ST-1", server.uri())).unwrap();
        let grant = HttpTicketExchange::new("/v1/user/login")
            .redeem(&ticket("ST-1"), &page)
            .await
            .unwrap();
        assert_eq!(grant.authorization, "Bearer T");
    }

    #[tokio::test]
    async fn test_http_redeem_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let page = Url::parse(&format!("{}/login?ticket=ST-1", server.uri())).unwrap();
        let err = HttpTicketExchange::new("/v1/user/login")
            .redeem(&ticket("ST-1"), &page)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_http_redeem_transport_failure() {
        // Nothing listens on the discard port.
        let page = Url::parse("http://127.0.0.1:9/login?ticket=ST-1").unwrap();
        let err = HttpTicketExchange::new("/v1/user/login")
            .redeem(&ticket("ST-1"), &page)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Transport(_)));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }
}
