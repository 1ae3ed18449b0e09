//! Cookie-authenticated client for the Gemini web application

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName,
    HeaderValue, ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cookies::{CookieCache, CookieJar, CookieStore, set_cookies};
use super::parser::{
    build_request_payload, extract_session_token, looks_like_login_page, parse_stream_generate,
};
use crate::core::config::GeminiConfig;
use crate::core::constants::gemini::{
    COOKIE_PSIDCC, COOKIE_PSIDTS, GENERATE, GOOGLE, HOME, INIT, ROTATE_BODY, ROTATE_COOKIES,
    USER_AGENT,
};
use crate::core::provider::{
    GenerateOptions, ModelInfo, Provider, ProviderError, ProviderResponse, models_for,
};

const PROVIDER_NAME: &str = "gemini";

/// Timeout for StreamGenerate calls
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for page loads during session bootstrap
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

const ROTATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rotation interval used when the configured one is not positive
const FALLBACK_REFRESH_MINUTES: u64 = 30;

/// Longest accepted rotation interval, one week
const MAX_REFRESH_MINUTES: u64 = 7 * 24 * 60;

/// URLs of the Gemini web backend
#[derive(Debug, Clone)]
pub struct GeminiEndpoints {
    pub google: String,
    pub home: String,
    pub init: String,
    pub generate: String,
    pub rotate_cookies: String,
}

impl Default for GeminiEndpoints {
    fn default() -> Self {
        Self {
            google: GOOGLE.to_string(),
            home: HOME.to_string(),
            init: INIT.to_string(),
            generate: GENERATE.to_string(),
            rotate_cookies: ROTATE_COOKIES.to_string(),
        }
    }
}

impl GeminiEndpoints {
    /// Every endpoint on one host, keeping the production paths
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            google: format!("{base}/"),
            home: format!("{base}/"),
            init: format!("{base}/app"),
            generate: format!(
                "{base}/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate"
            ),
            rotate_cookies: format!("{base}/RotateCookies"),
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    /// `SNlM0e` anti-CSRF token sent as `at`
    token: String,
    healthy: bool,
}

/// Gemini web client implementing [`Provider`]
///
/// Cheap to clone; clones share the session, the cookie store and the
/// auto-refresh task.
#[derive(Clone)]
pub struct GeminiWebClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    bootstrap: reqwest::Client,
    endpoints: GeminiEndpoints,
    cookies: Mutex<CookieStore>,
    /// Non-session cookies collected from Google responses
    jar: std::sync::Mutex<CookieJar>,
    session: RwLock<Session>,
    cache: CookieCache,
    refresh_interval: Duration,
    refresh_started: AtomicBool,
    shutdown: CancellationToken,
    /// One StreamGenerate call in flight at a time
    request_lock: Mutex<()>,
}

impl GeminiWebClient {
    pub fn new(config: &GeminiConfig, endpoints: GeminiEndpoints) -> Result<Self, ProviderError> {
        Self::with_refresh_period(config, endpoints, refresh_period(config.refresh_interval))
    }

    fn with_refresh_period(
        config: &GeminiConfig,
        endpoints: GeminiEndpoints,
        refresh_interval: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(generate_headers(&endpoints))
            .build()?;

        let bootstrap = reqwest::Client::builder()
            .timeout(BOOTSTRAP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                bootstrap,
                endpoints,
                cookies: Mutex::new(CookieStore::from_config(config)),
                jar: std::sync::Mutex::new(CookieJar::new()),
                session: RwLock::new(Session::default()),
                cache: CookieCache::new(&config.cookie_cache_dir),
                refresh_interval,
                refresh_started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                request_lock: Mutex::new(()),
            }),
        })
    }

    /// Snapshot of the session cookies
    pub async fn cookies(&self) -> CookieStore {
        self.inner.cookies.lock().await.clone()
    }

    pub async fn rotate_cookies(&self) -> Result<(), ProviderError> {
        self.inner.rotate_cookies().await
    }
}

/// Rotation period for a configured interval in minutes
///
/// Non-positive values fall back to 30 minutes; large ones are capped at a week.
fn refresh_period(minutes: i64) -> Duration {
    let minutes = u64::try_from(minutes)
        .ok()
        .filter(|m| *m > 0)
        .unwrap_or(FALLBACK_REFRESH_MINUTES)
        .min(MAX_REFRESH_MINUTES);
    Duration::from_secs(minutes * 60)
}

impl Inner {
    /// Reconcile configured cookies with the cache, then rotate when only the
    /// PSID is known
    async fn prepare_cookies(&self) {
        let needs_rotation = {
            let mut store = self.cookies.lock().await;
            if !store.psid.is_empty() {
                match self.cache.load(&store.psid) {
                    Some(cached) if !store.psidts.is_empty() && cached != store.psidts => {
                        info!("Config has new __Secure-1PSIDTS, clearing old cache");
                        if let Err(e) = self.cache.clear(&store.psid) {
                            warn!(error = %e, "Failed to clear cookie cache");
                        }
                    }
                    Some(cached) if store.psidts.is_empty() => {
                        store.psidts = cached;
                        info!("Loaded __Secure-1PSIDTS from cache");
                    }
                    _ => {}
                }
            }
            !store.psid.is_empty() && store.psidts.is_empty()
        };

        if needs_rotation {
            info!("Only __Secure-1PSID provided, attempting to obtain __Secure-1PSIDTS via rotation");
            match self.rotate_cookies().await {
                Ok(()) => info!("Obtained __Secure-1PSIDTS via rotation"),
                Err(e) => info!(
                    error = %e,
                    "Rotation failed, proceeding with just __Secure-1PSID"
                ),
            }
        }
    }

    fn absorb(&self, cookies: Vec<(String, String)>) {
        self.jar
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(cookies);
    }

    /// Collected cookies plus the session cookies, which always win
    fn cookie_header(&self, store: &CookieStore) -> String {
        let mut jar = self.jar.lock().unwrap_or_else(|e| e.into_inner()).clone();
        jar.extend(store.pairs());
        jar.header()
    }

    async fn refresh_session_token(&self) -> Result<(), ProviderError> {
        // NID and friends; the page loads still work without them
        match self.bootstrap.get(&self.endpoints.google).send().await {
            Ok(resp) => self.absorb(set_cookies(resp.headers())),
            Err(e) => debug!(error = %e, "Failed to prefetch google.com cookies"),
        }

        let store = self.cookies.lock().await.clone();

        let home = self
            .bootstrap
            .get(&self.endpoints.home)
            .query(&[("hl", "en")])
            .headers(navigation_headers())
            .header(COOKIE, self.cookie_header(&store))
            .send()
            .await;
        if let Ok(resp) = home {
            self.absorb(set_cookies(resp.headers()));
        }

        let mut headers = navigation_headers();
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("same-origin"),
        );
        let resp = self
            .bootstrap
            .get(&self.endpoints.init)
            .query(&[("hl", "en")])
            .headers(headers)
            .header(REFERER, self.endpoints.home.as_str())
            .header(COOKIE, self.cookie_header(&store))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to reach gemini app: {e}")))?;

        let body = resp.text().await?;
        let Some(token) = extract_session_token(&body) else {
            let message = if looks_like_login_page(&body) {
                "cookies invalid. Please provide __Secure-1PSIDTS in addition to __Secure-1PSID"
            } else {
                "SNlM0e not found"
            };
            info!("Authentication failed: {}", message);
            return Err(ProviderError::Authentication(message.to_string()));
        };

        let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
        session.token = token;
        session.healthy = true;
        Ok(())
    }

    /// Trade the current cookies for a fresh `__Secure-1PSIDTS`
    ///
    /// Holds the cookie store for the whole exchange so concurrent requests
    /// never observe a half-rotated pair.
    async fn rotate_cookies(&self) -> Result<(), ProviderError> {
        let mut store = self.cookies.lock().await;

        let resp = self
            .bootstrap
            .post(&self.endpoints.rotate_cookies)
            .timeout(ROTATE_TIMEOUT)
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, self.cookie_header(&store))
            .body(ROTATE_BODY)
            .send()
            .await
            .map_err(|e| ProviderError::Rotation(format!("failed to call rotation endpoint: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ProviderError::Rotation(format!(
                "unexpected status {}",
                status.as_u16()
            )));
        }

        let mut rotated = false;
        let mut others = Vec::new();
        for (name, value) in set_cookies(resp.headers()) {
            match name.as_str() {
                COOKIE_PSIDTS => {
                    store.psidts = value;
                    store.updated_at = Some(Utc::now());
                    rotated = true;
                }
                COOKIE_PSIDCC => store.psidcc = value,
                _ => others.push((name, value)),
            }
        }
        self.absorb(others);

        if !rotated {
            return Err(ProviderError::Rotation(
                "no new __Secure-1PSIDTS cookie received".to_string(),
            ));
        }

        if let Err(e) = self.cache.save(&store.psid, &store.psidts) {
            warn!(error = %e, "Failed to save cookies to cache");
        }
        info!("Cookies rotated successfully");
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let _guard = self.request_lock.lock().await;

        let token = self
            .session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .token
            .clone();
        if token.is_empty() {
            return Err(ProviderError::NotInitialized);
        }

        debug!(
            model = options.model_or_default(),
            prompt_chars = prompt.len(),
            "Sending StreamGenerate request"
        );

        let store = self.cookies.lock().await.clone();
        let payload = build_request_payload(prompt);
        let resp = self
            .http
            .post(&self.endpoints.generate)
            .query(&[("at", token.as_str())])
            .header(COOKIE, self.cookie_header(&store))
            .form(&[("at", token.as_str()), ("f.req", payload.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        parse_stream_generate(&body)
    }
}

async fn auto_refresh(inner: Arc<Inner>) {
    let period = inner.refresh_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    debug!(interval_secs = period.as_secs(), "Cookie auto-refresh started");

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                debug!("Cookie auto-refresh stopped");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = inner.rotate_cookies().await {
                    error!(error = %e, "Failed to rotate cookies");
                }
            }
        }
    }
}

fn generate_headers(endpoints: &GeminiEndpoints) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(origin) = HeaderValue::from_str(endpoints.home.trim_end_matches('/')) {
        headers.insert(ORIGIN, origin);
    }
    if let Ok(referer) = HeaderValue::from_str(&endpoints.home) {
        headers.insert(REFERER, referer);
    }
    headers.insert(
        HeaderName::from_static("x-same-domain"),
        HeaderValue::from_static("1"),
    );
    headers
}

/// Headers of a top-level browser navigation
fn navigation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://gemini.google.com"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    for (name, value) in [
        (
            "sec-ch-ua",
            r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
        ("x-same-domain", "1"),
    ] {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

#[async_trait]
impl Provider for GeminiWebClient {
    async fn init(&self) -> Result<(), ProviderError> {
        let inner = &self.inner;
        inner.prepare_cookies().await;

        let mut result = inner.refresh_session_token().await;
        if let Err(e) = &result {
            debug!(error = %e, "Initial session token fetch failed, attempting cookie rotation");
            match inner.rotate_cookies().await {
                Ok(()) => result = inner.refresh_session_token().await,
                Err(rotation) => debug!(error = %rotation, "Cookie rotation failed"),
            }
        }
        result?;

        {
            let store = inner.cookies.lock().await;
            if let Err(e) = inner.cache.save(&store.psid, &store.psidts) {
                warn!(error = %e, "Failed to save cookies to cache");
            }
        }

        info!("Gemini client initialized successfully");

        if !inner.refresh_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(auto_refresh(inner.clone()));
        }
        Ok(())
    }

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.inner.generate(prompt, options).await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.inner.shutdown.cancel();
        self.inner
            .session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .healthy = false;
        Ok(())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_healthy(&self) -> bool {
        self.inner
            .session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .healthy
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        models_for(PROVIDER_NAME)
    }
}
