// HTTP access to the Pepal portal.
//
// Every outbound request goes through `PortalClient`: login with its own
// cookie jar, authenticated page fetches carrying the `sdv` cookie, the
// presence form post and the anonymous calendar download.

use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Client, Response};
use url::Url;
use crate::config::Config;
use crate::error::{AuthError, PortalError, Result};
use crate::models::SessionToken;

pub const SESSION_COOKIE: &str = "sdv";
pub const LOGIN_PATH: &str = "include/php/ident.php";

const ACCESS_DENIED_MARKER: &str = "Accès refusé !";
// The portal answers an expired session with its login page instead of an error status.
const LOGIN_FORM_MARKER: &str = "form class=\"login-form\"";

#[derive(Debug, Clone)]
pub struct PortalClient {
    http: Client,
    base_url: Url,
    calendar_url: Url,
    timeout: Duration,
}

impl PortalClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(PortalClient {
            http,
            base_url: config.base_url.clone(),
            calendar_url: config.calendar_url.clone(),
            timeout: config.http_timeout,
        })
    }

    // Exchanges credentials for the portal's session cookie.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<SessionToken> {
        let url = self.base_url.join(LOGIN_PATH)?;

        // A fresh jar per login keeps sessions of different users apart.
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(self.timeout)
            .build()?;

        let login_data = [("login", username), ("pass", password)];
        let response = client.post(url.clone())
            .header(ACCEPT, "*/*")
            .form(&login_data)
            .send()
            .await?;

        let status = response.status();
        let response_cookie = response
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());
        let body = response.text().await?;

        if body.contains(ACCESS_DENIED_MARKER) {
            warn!("Incorrect username or password");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !status.is_success() {
            warn!("Login failed with status: {}", status);
            return Err(AuthError::TransportFailure(status).into());
        }

        match response_cookie.or_else(|| session_cookie_from_jar(&jar, &url)) {
            Some(value) if !value.is_empty() => {
                info!("Login successful");
                Ok(SessionToken::new(value))
            }
            _ => {
                warn!("Session cookie not found in login response");
                Err(AuthError::TokenMissing.into())
            }
        }
    }

    // GETs a page relative to the portal base URL on behalf of a session.
    pub async fn fetch_page(&self, token: &SessionToken, path: &str) -> Result<Vec<u8>> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let response = self.http.get(url.clone())
            .header(ACCEPT, "*/*")
            .header(COOKIE, session_cookie(token))
            .send()
            .await?;

        let body = read_success(&url, response).await?;
        if contains_marker(&body, LOGIN_FORM_MARKER) {
            warn!("Session rejected by the portal on {}", url.path());
            return Err(AuthError::SessionExpired.into());
        }
        Ok(body)
    }

    // POSTs an urlencoded form on behalf of a session. gzip bodies are decoded by the transport.
    pub async fn post_form(&self, token: &SessionToken, path: &str, form: &[(&str, &str)]) -> Result<Vec<u8>> {
        let url = self.base_url.join(path)?;
        debug!("POST {}", url);

        let response = self.http.post(url.clone())
            .header(ACCEPT, "*/*")
            .header(COOKIE, session_cookie(token))
            .form(form)
            .send()
            .await?;

        read_success(&url, response).await
    }

    // Downloads a student calendar. The calendar feed does not need a session.
    pub async fn fetch_calendar_document(&self, calendar_id: &str) -> Result<Vec<u8>> {
        let url = self.calendar_url.join(&urlencoding::encode(calendar_id))?;
        debug!("GET {}", url);

        let response = self.http.get(url.clone()).send().await?;
        read_success(&url, response).await
    }
}

async fn read_success(url: &Url, response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        warn!("Failed to load {}: {}", url, status);
        return Err(PortalError::UnexpectedStatus { url: url.to_string(), status });
    }
    Ok(response.bytes().await?.to_vec())
}

fn session_cookie(token: &SessionToken) -> String {
    format!("{}={}", SESSION_COOKIE, token.as_str())
}

fn session_cookie_from_jar(jar: &Jar, url: &Url) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(str::to_string)
}

pub fn contains_marker(body: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    !marker.is_empty() && body.windows(marker.len()).any(|window| window == marker)
}
