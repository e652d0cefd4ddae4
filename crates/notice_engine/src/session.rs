use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use relay_logging::{relay_debug, relay_info, relay_warn};
use thiserror::Error;
use url::Url;

use crate::fetch::FetchSettings;

/// Cookie names that carry the portal session, in preference order.
pub const SESSION_COOKIES: [&str; 2] = ["JSESSIONID", "JSID#/IIT_ERP3"];
pub const SSO_COOKIE: &str = "ssoToken";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("could not build http client: {0}")]
    Client(String),
    #[error("session file {path:?} unreadable: {source}")]
    SessionFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no session cookie ({}) present", SESSION_COOKIES.join(" or "))]
    MissingSessionCookie,
    #[error("portal rejected the session")]
    Rejected,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub session_token: String,
    pub sso_token: Option<String>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("session_token", &"<present>")
            .field("sso_token", &self.sso_token.as_ref().map(|_| "<present>"))
            .finish()
    }
}

/// An HTTP client bound to the portal with its own cookie jar.
#[derive(Debug, Clone)]
pub struct PortalSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    portal_url: Url,
}

impl PortalSession {
    pub fn new(portal_url: Url, settings: &FetchSettings) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|err| AuthError::Client(err.to_string()))?;
        Ok(Self {
            client,
            jar,
            portal_url,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn portal_url(&self) -> &Url {
        &self.portal_url
    }

    /// Adds a `name=value` cookie scoped to the portal host. Cookies without
    /// an explicit path apply to the whole host.
    pub fn add_cookie(&self, cookie: &str) {
        if cookie.to_ascii_lowercase().contains("path=") {
            self.jar.add_cookie_str(cookie, &self.portal_url);
        } else {
            self.jar
                .add_cookie_str(&format!("{cookie}; Path=/"), &self.portal_url);
        }
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.portal_url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    /// Tokens currently held in the jar, if a session cookie is present.
    pub fn tokens(&self) -> Option<SessionTokens> {
        let session_token = SESSION_COOKIES
            .iter()
            .find_map(|name| self.cookie(name))
            .filter(|value| !value.is_empty())?;
        Some(SessionTokens {
            session_token,
            sso_token: self.cookie(SSO_COOKIE),
        })
    }
}

/// Capability to obtain an authenticated portal session.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    async fn is_alive(&self, session: &PortalSession) -> bool;

    /// Establishes a session, storing its cookies in `session`.
    async fn login(&self, session: &PortalSession) -> Result<SessionTokens, AuthError>;
}

/// Reuses the current session when the provider says it is alive, otherwise logs in.
pub async fn ensure_session(
    provider: &dyn SessionProvider,
    session: &PortalSession,
) -> Result<SessionTokens, AuthError> {
    if provider.is_alive(session).await {
        if let Some(tokens) = session.tokens() {
            relay_info!("Existing portal session is alive");
            return Ok(tokens);
        }
    }
    relay_info!("Logging into portal");
    let tokens = provider.login(session).await?;
    relay_info!(
        "Portal login succeeded (session token present, sso token {})",
        if tokens.sso_token.is_some() { "present" } else { "absent" }
    );
    Ok(tokens)
}

/// Loads cookies written by an external login helper (the OTP handshake
/// lives outside this crate) and verifies them against a probe URL.
///
/// The file holds one `name=value` cookie per line; blank lines and lines
/// starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct CookieFileSessionProvider {
    session_file: PathBuf,
    alive_url: Url,
}

impl CookieFileSessionProvider {
    pub fn new(session_file: PathBuf, alive_url: Url) -> Self {
        Self {
            session_file,
            alive_url,
        }
    }

    fn load_cookies(&self, session: &PortalSession) -> Result<usize, AuthError> {
        let content =
            fs::read_to_string(&self.session_file).map_err(|source| AuthError::SessionFile {
                path: self.session_file.clone(),
                source,
            })?;
        let mut loaded = 0;
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || !line.contains('=') {
                continue;
            }
            session.add_cookie(line);
            loaded += 1;
        }
        relay_debug!("Loaded {} cookie(s) from {:?}", loaded, self.session_file);
        Ok(loaded)
    }
}

#[async_trait::async_trait]
impl SessionProvider for CookieFileSessionProvider {
    async fn is_alive(&self, session: &PortalSession) -> bool {
        if session.tokens().is_none() {
            return false;
        }
        match session.client().get(self.alive_url.clone()).send().await {
            Ok(response) => {
                let alive = response.status().is_success()
                    && response.url().path() == self.alive_url.path();
                if !alive {
                    relay_debug!(
                        "Session probe status={} final_path={}",
                        response.status(),
                        response.url().path()
                    );
                }
                alive
            }
            Err(err) => {
                relay_warn!("Session probe failed: {}", err);
                false
            }
        }
    }

    async fn login(&self, session: &PortalSession) -> Result<SessionTokens, AuthError> {
        self.load_cookies(session)?;
        let tokens = session.tokens().ok_or(AuthError::MissingSessionCookie)?;
        if !self.is_alive(session).await {
            return Err(AuthError::Rejected);
        }
        Ok(tokens)
    }
}
