//! Blocking client for the Spotify Web API player endpoints
//!
//! Authorization follows the OAuth authorization-code flow: the first run prints
//! an authorize link and asks for the URL Spotify redirected to, later runs reuse
//! (and refresh) the token cached on disk.

use std::{
    fs::OpenOptions,
    io::{BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    api::{Device, PlayerApi},
    config::Credentials,
    error::ApiError,
};

const API_BASE: &str = "https://api.spotify.com/v1";
const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SCOPE: &str = "user-read-playback-state,user-modify-playback-state";
/// refresh this many seconds before the token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// turns an `open.spotify.com` share link into a `spotify:` uri, anything else is returned as is
#[must_use]
pub fn context_uri(reference: &str) -> String {
    let Ok(url) = Url::parse(reference) else {
        return reference.to_string();
    };
    if url.host_str() != Some("open.spotify.com") {
        return reference.to_string();
    }
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty() && !s.starts_with("intl-"))
                .collect()
        })
        .unwrap_or_default();
    match segments.as_slice() {
        [kind, id] => format!("spotify:{kind}:{id}"),
        _ => reference.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    /// unix timestamp in seconds
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Token {
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at.saturating_sub(now) < EXPIRY_MARGIN_SECS
    }

    /// still valid, or at least refreshable
    #[must_use]
    pub const fn is_usable(&self, now: i64) -> bool {
        !self.is_expired(now) || self.refresh_token.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// spotify may leave out the refresh token when refreshing, in which case the old one stays valid
    fn into_token(self, now: i64, previous_refresh: Option<String>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            scope: self.scope,
            expires_at: now + self.expires_in,
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

/// token cache json file
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// a missing or unreadable cache just means we have to authorize again
    #[must_use]
    pub fn load(&self) -> Option<Token> {
        let cached = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&cached) {
            Ok(token) => Some(token),
            Err(e) => {
                log::warn!("ignoring corrupt token cache {}: {e}", self.path.display());
                None
            }
        }
    }

    /// writes the token readable by the owner only
    ///
    /// # Errors
    /// if the cache file can't be written
    pub fn save(&self, token: &Token) -> Result<(), ApiError> {
        let cache_err = |source: std::io::Error| ApiError::TokenCache {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string(token).map_err(|e| cache_err(e.into()))?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // mode only applies when the file is created
            if self.path.exists() {
                std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                    .map_err(cache_err)?;
            }
        }
        let mut file = options.open(&self.path).map_err(cache_err)?;
        file.write_all(json.as_bytes()).map_err(cache_err)
    }
}

/// # Errors
/// if the redirect uri makes the link invalid
pub fn authorize_url(credentials: &Credentials) -> Result<Url, ApiError> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("scope", SCOPE),
        ],
    )
    .map_err(|e| ApiError::Authorization(e.to_string()))
}

/// pulls the authorization code out of the url spotify redirected to
///
/// # Errors
/// if the url is malformed, carries an `error` or has no `code`
pub fn code_from_redirect(redirected: &str) -> Result<String, ApiError> {
    let url = Url::parse(redirected.trim())
        .map_err(|e| ApiError::Authorization(format!("invalid redirect url: {e}")))?;
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(ApiError::Authorization(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.ok_or_else(|| ApiError::Authorization("redirect url has no code".to_string()))
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Vec<SpotifyDevice>,
}

#[derive(Debug, Deserialize)]
struct SpotifyDevice {
    id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// restricted devices come without an id and can't be controlled
fn into_devices(response: DevicesResponse) -> Vec<Device> {
    response
        .devices
        .into_iter()
        .filter_map(|device| {
            let Some(id) = device.id else {
                debug!("skipping device {} without an id", device.name);
                return None;
            };
            Some(Device {
                id,
                name: device.name,
                kind: device.kind,
            })
        })
        .collect()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug)]
pub struct SpotifyClient {
    agent: ureq::Agent,
    api_base: String,
    token_url: String,
    credentials: Credentials,
    cache: TokenCache,
    token: Option<Token>,
}

impl SpotifyClient {
    #[must_use]
    pub fn new(credentials: Credentials, cache: TokenCache) -> Self {
        Self::with_urls(credentials, cache, API_BASE, TOKEN_URL)
    }

    fn with_urls(
        credentials: Credentials,
        cache: TokenCache,
        api_base: &str,
        token_url: &str,
    ) -> Self {
        let token = cache.load();
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            api_base: api_base.to_string(),
            token_url: token_url.to_string(),
            credentials,
            cache,
            token,
        }
    }

    /// whether there is a token that is still valid or can be refreshed
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.token.as_ref().is_some_and(|token| token.is_usable(now()))
    }

    /// makes sure requests can be authorized, refreshing the cached token or
    /// falling back to the authorization-code flow if spotify rejects it
    ///
    /// # Errors
    /// if neither refreshing nor authorizing works
    pub fn ensure_authorized(&mut self, input: &mut impl BufRead) -> Result<(), ApiError> {
        if self.is_authorized() {
            match self.access_token() {
                Ok(_) => return Ok(()),
                Err(ApiError::Authorization(reason)) => {
                    warn!("cached spotify token is unusable: {reason}");
                }
                Err(e) => return Err(e),
            }
        }
        self.authorize(input)
    }

    /// runs the authorization-code flow on the terminal
    ///
    /// # Errors
    /// if reading the redirect url fails or spotify refuses the code
    pub fn authorize(&mut self, input: &mut impl BufRead) -> Result<(), ApiError> {
        let url = authorize_url(&self.credentials)?;
        println!("Go to the following URL: {url}");
        print!("Enter the URL you were redirected to: ");
        std::io::stdout()
            .flush()
            .map_err(|e| ApiError::Authorization(e.to_string()))?;
        let mut redirected = String::new();
        input
            .read_line(&mut redirected)
            .map_err(|e| ApiError::Authorization(e.to_string()))?;
        let code = code_from_redirect(&redirected)?;
        let token = self.request_token(
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ],
            None,
        )?;
        info!("authorized with spotify");
        self.store(token)
    }

    fn store(&mut self, token: Token) -> Result<(), ApiError> {
        self.cache.save(&token)?;
        self.token = Some(token);
        Ok(())
    }

    fn request_token(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<String>,
    ) -> Result<Token, ApiError> {
        let basic = STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));
        let response: TokenResponse = self
            .agent
            .post(&self.token_url)
            .set("Authorization", &format!("Basic {basic}"))
            .send_form(form)?
            .into_json()
            .map_err(ApiError::Decode)?;
        Ok(response.into_token(now(), previous_refresh))
    }

    fn access_token(&mut self) -> Result<String, ApiError> {
        let Some(token) = &self.token else {
            return Err(ApiError::Authorization("not authorized".to_string()));
        };
        if !token.is_expired(now()) {
            return Ok(token.access_token.clone());
        }
        let Some(refresh_token) = token.refresh_token.clone() else {
            self.token = None;
            return Err(ApiError::Authorization(
                "token expired and there is no refresh token".to_string(),
            ));
        };
        debug!("refreshing spotify access token");
        let refreshed = self.request_token(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
            Some(refresh_token.clone()),
        );
        let token = match refreshed {
            Ok(token) => token,
            // revoked or otherwise invalid refresh token
            Err(ApiError::Status {
                status: 400 | 401,
                message,
            }) => {
                self.token = None;
                return Err(ApiError::Authorization(format!(
                    "refresh rejected: {message}"
                )));
            }
            Err(e) => return Err(e),
        };
        let access_token = token.access_token.clone();
        self.store(token)?;
        Ok(access_token)
    }

    fn bearer(&mut self) -> Result<String, ApiError> {
        Ok(format!("Bearer {}", self.access_token()?))
    }
}

impl PlayerApi for SpotifyClient {
    fn devices(&mut self) -> Result<Vec<Device>, ApiError> {
        let bearer = self.bearer()?;
        let response: DevicesResponse = self
            .agent
            .get(&format!("{}/me/player/devices", self.api_base))
            .set("Authorization", &bearer)
            .call()?
            .into_json()
            .map_err(ApiError::Decode)?;
        Ok(into_devices(response))
    }

    fn start_playback(&mut self, device_id: &str, context: &str) -> Result<(), ApiError> {
        let bearer = self.bearer()?;
        let uri = context_uri(context);
        // single tracks aren't contexts and have to be sent as a list of uris
        let body = if uri.starts_with("spotify:track:") {
            serde_json::json!({ "uris": [uri] })
        } else {
            serde_json::json!({ "context_uri": uri })
        };
        self.agent
            .put(&format!("{}/me/player/play", self.api_base))
            .query("device_id", device_id)
            .set("Authorization", &bearer)
            .send_json(body)?;
        Ok(())
    }

    fn set_volume(&mut self, device_id: &str, volume_percent: i32) -> Result<(), ApiError> {
        let bearer = self.bearer()?;
        self.agent
            .put(&format!("{}/me/player/volume", self.api_base))
            .query("volume_percent", &volume_percent.to_string())
            .query("device_id", device_id)
            .set("Authorization", &bearer)
            .send_string("")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Read, net::TcpListener, thread::JoinHandle};

    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "spotify_alarm_token_{}_{name}",
            std::process::id()
        ))
    }

    /// answers a single http request with `status` and a json `body`, returning the raw request
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            let header_end = loop {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "connection closed before the headers ended");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let length: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map_or(0, |value| value.trim().parse().unwrap());
            while request.len() < header_end + length {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "connection closed before the body ended");
                request.extend_from_slice(&buf[..n]);
            }
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            String::from_utf8(request).unwrap()
        });
        (base, handle)
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8888/callback".to_string(),
        }
    }

    fn token(expires_at: i64) -> Token {
        Token {
            access_token: "access".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: SCOPE.to_string(),
            expires_at,
            refresh_token: Some("refresh".to_string()),
        }
    }

    #[test]
    fn share_links_become_uris() {
        assert_eq!(
            context_uri(
                "https://open.spotify.com/playlist/4JZXHm8EZqC8Nq4hD28WRu?si=487697d5970e41fd"
            ),
            "spotify:playlist:4JZXHm8EZqC8Nq4hD28WRu"
        );
        assert_eq!(
            context_uri("https://open.spotify.com/intl-de/album/1DFixLWuPkv3KT3TnV35m3"),
            "spotify:album:1DFixLWuPkv3KT3TnV35m3"
        );
    }

    #[test]
    fn other_references_pass_through() {
        for reference in [
            "spotify:playlist:37i9dQZF1EJW5QYMSm7Z0Q",
            "https://example.com/playlist/abc",
            "https://open.spotify.com/",
            "ctx:A",
        ] {
            assert_eq!(context_uri(reference), reference);
        }
    }

    #[test]
    fn authorize_url_carries_client_and_scope() {
        let url = authorize_url(&credentials()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "client".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:8888/callback".to_string()
        )));
        assert!(pairs.contains(&("scope".to_string(), SCOPE.to_string())));
    }

    #[test]
    fn code_is_read_from_redirect() {
        assert_eq!(
            code_from_redirect("http://localhost:8888/callback?code=AQB123&state=x\n").unwrap(),
            "AQB123"
        );
    }

    #[test]
    fn redirect_errors() {
        assert!(matches!(
            code_from_redirect("http://localhost/?error=access_denied"),
            Err(ApiError::Authorization(reason)) if reason == "access_denied"
        ));
        assert!(matches!(
            code_from_redirect("http://localhost/"),
            Err(ApiError::Authorization(_))
        ));
        assert!(matches!(
            code_from_redirect("not a url"),
            Err(ApiError::Authorization(_))
        ));
    }

    #[test]
    fn token_expiry_has_margin() {
        let token = token(1_000);
        assert!(!token.is_expired(900));
        assert!(token.is_expired(950));
        assert!(token.is_expired(2_000));
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"new","token_type":"Bearer","expires_in":3600,"scope":"s"}"#,
        )
        .unwrap();
        let token = response.into_token(100, Some("old-refresh".to_string()));
        assert_eq!(token.expires_at, 3_700);
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn token_cache_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "spotify_alarm_token_cache_{}",
            std::process::id()
        ));
        let cache = TokenCache::new(&path);
        assert_eq!(cache.load(), None);
        cache.save(&token(42)).unwrap();
        assert_eq!(cache.load(), Some(token(42)));
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(cache.load(), None);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn devices_without_id_are_skipped() {
        let response: DevicesResponse = serde_json::from_str(
            r#"{"devices":[
                {"id":"abc","name":"Kitchen","type":"Speaker","is_active":false,"volume_percent":30},
                {"id":null,"name":"Restricted","type":"TV"},
                {"id":"def","name":"Laptop","type":"Computer"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            into_devices(response),
            vec![
                Device {
                    id: "abc".to_string(),
                    name: "Kitchen".to_string(),
                    kind: "Speaker".to_string(),
                },
                Device {
                    id: "def".to_string(),
                    name: "Laptop".to_string(),
                    kind: "Computer".to_string(),
                },
            ]
        );
    }

    #[test]
    fn corrupt_expiry_does_not_overflow() {
        assert!(token(i64::MIN).is_expired(1_700_000_000));
        assert!(!token(i64::MAX).is_expired(-1));
    }

    #[cfg(unix)]
    #[test]
    fn token_cache_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let path = scratch_path("private");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        TokenCache::new(&path).save(&token(42)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn expired_token_without_refresh_needs_authorization() {
        let path = scratch_path("no_refresh");
        let cache = TokenCache::new(&path);
        cache
            .save(&Token {
                refresh_token: None,
                ..token(0)
            })
            .unwrap();
        let mut client = SpotifyClient::new(credentials(), cache);
        assert!(!client.is_authorized());
        // the code flow runs without touching the network before reading the redirect
        let mut input = b"http://localhost/?error=access_denied\n".as_slice();
        assert!(matches!(
            client.ensure_authorized(&mut input),
            Err(ApiError::Authorization(reason)) if reason == "access_denied"
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn expired_token_is_refreshed_and_cached() {
        let path = scratch_path("refresh");
        let cache = TokenCache::new(&path);
        cache
            .save(&Token {
                refresh_token: Some("old-refresh".to_string()),
                ..token(0)
            })
            .unwrap();
        let (base, server) = serve_once(
            "200 OK",
            r#"{"access_token":"new-access","token_type":"Bearer","expires_in":3600,"scope":"s"}"#,
        );
        let mut client =
            SpotifyClient::with_urls(credentials(), cache, &base, &format!("{base}/api/token"));
        assert!(client.is_authorized());
        assert_eq!(client.access_token().unwrap(), "new-access");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/token "));
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=old-refresh"));
        // base64 of "client:secret"
        assert!(request.contains("Basic Y2xpZW50OnNlY3JldA=="));

        let cached = TokenCache::new(&path).load().unwrap();
        assert_eq!(cached.access_token, "new-access");
        assert_eq!(cached.refresh_token.as_deref(), Some("old-refresh"));
        assert!(cached.expires_at > now());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejected_refresh_falls_back_to_authorization() {
        let path = scratch_path("revoked");
        let cache = TokenCache::new(&path);
        cache.save(&token(0)).unwrap();
        let (base, server) = serve_once("400 Bad Request", r#"{"error":"invalid_grant"}"#);
        let mut client =
            SpotifyClient::with_urls(credentials(), cache, &base, &format!("{base}/api/token"));
        assert!(client.is_authorized());

        let mut input = b"http://localhost/?error=access_denied\n".as_slice();
        assert!(matches!(
            client.ensure_authorized(&mut input),
            Err(ApiError::Authorization(reason)) if reason == "access_denied"
        ));
        assert!(!client.is_authorized());
        assert!(server.join().unwrap().contains("grant_type=refresh_token"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn devices_are_fetched_with_bearer_token() {
        let path = scratch_path("devices");
        let cache = TokenCache::new(&path);
        cache.save(&token(now() + 3_600)).unwrap();
        let (base, server) = serve_once(
            "200 OK",
            r#"{"devices":[
                {"id":"abc","name":"Kitchen","type":"Speaker"},
                {"id":null,"name":"Restricted","type":"TV"}
            ]}"#,
        );
        let mut client = SpotifyClient::with_urls(
            credentials(),
            cache,
            &format!("{base}/v1"),
            &format!("{base}/api/token"),
        );
        let devices = client.devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].to_string(), "Kitchen (Speaker)");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /v1/me/player/devices "));
        assert!(request.contains("Bearer access"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn client_without_cache_is_not_authorized() {
        let cache = TokenCache::new(std::env::temp_dir().join(format!(
            "spotify_alarm_missing_cache_{}",
            std::process::id()
        )));
        let mut client = SpotifyClient::new(credentials(), cache);
        assert!(!client.is_authorized());
        assert!(matches!(
            client.devices(),
            Err(ApiError::Authorization(_))
        ));
    }
}
