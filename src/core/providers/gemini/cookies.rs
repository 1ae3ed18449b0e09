//! Session cookies, the cookie jar and the on-disk PSIDTS cache

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

use crate::core::config::GeminiConfig;
use crate::core::constants::gemini::{COOKIE_PSID, COOKIE_PSIDCC, COOKIE_PSIDTS};

/// Strip whitespace, surrounding quotes and a trailing `;` pasted along with
/// a cookie value
pub fn clean_cookie(value: &str) -> String {
    let value = value.trim().trim_matches('"').trim_matches('\'');
    value.strip_suffix(';').unwrap_or(value).to_string()
}

/// The three `__Secure-1PSID*` cookies that authenticate the session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CookieStore {
    #[serde(rename = "__Secure-1PSID")]
    pub psid: String,
    #[serde(rename = "__Secure-1PSIDTS")]
    pub psidts: String,
    #[serde(rename = "__Secure-1PSIDCC")]
    pub psidcc: String,
    /// Last time rotation handed out a fresh PSIDTS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CookieStore {
    pub fn from_config(config: &GeminiConfig) -> Self {
        Self {
            psid: clean_cookie(&config.psid),
            psidts: clean_cookie(&config.psidts),
            psidcc: clean_cookie(&config.psidcc),
            updated_at: None,
        }
    }

    /// Non-empty session cookies as `(name, value)` pairs
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            (COOKIE_PSID, self.psid.as_str()),
            (COOKIE_PSIDTS, self.psidts.as_str()),
            (COOKIE_PSIDCC, self.psidcc.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}

/// Extract `(name, value)` from a `Set-Cookie` header, ignoring attributes
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let first = header.split(';').next()?;
    let (name, value) = first.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Every `Set-Cookie` of a response, parsed
pub fn set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

/// Name → value cookie map rendered as a single `Cookie` header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieJar(BTreeMap<String, String>);

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn extend<I, K, V>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in cookies {
            self.insert(name, value);
        }
    }

    /// `name=value; name=value`, sorted by name
    pub fn header(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Per-account PSIDTS cache
///
/// One file per `__Secure-1PSID`, named after its SHA-256 so the PSID itself
/// never lands on disk.
#[derive(Debug, Clone)]
pub struct CookieCache {
    dir: PathBuf,
}

impl CookieCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, psid: &str) -> PathBuf {
        let digest = Sha256::digest(psid.as_bytes());
        self.dir.join(format!("{:x}.txt", digest))
    }

    /// Cached PSIDTS for `psid`; missing or blank files yield `None`
    pub fn load(&self, psid: &str) -> Option<String> {
        if psid.is_empty() {
            return None;
        }
        let contents = fs::read_to_string(self.path_for(psid)).ok()?;
        let psidts = contents.trim();
        (!psidts.is_empty()).then(|| psidts.to_string())
    }

    /// Persist `psidts`; a no-op when either cookie is empty
    pub fn save(&self, psid: &str, psidts: &str) -> io::Result<()> {
        if psid.is_empty() || psidts.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(psid);
        fs::write(&path, psidts)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(file = %path.display(), "Saved __Secure-1PSIDTS to local cache");
        Ok(())
    }

    pub fn clear(&self, psid: &str) -> io::Result<()> {
        if psid.is_empty() {
            return Ok(());
        }
        let path = self.path_for(psid);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "Cleared cookie cache");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;

    #[test]
    fn test_clean_cookie() {
        assert_eq!(clean_cookie("  \"abc\"  "), "abc");
        assert_eq!(clean_cookie("'abc'"), "abc");
        assert_eq!(clean_cookie("abc;"), "abc");
        assert_eq!(clean_cookie(""), "");
    }

    #[test]
    fn test_store_from_config_cleans_values() {
        let config = GeminiConfig {
            psid: " \"g.a000\" ".to_string(),
            psidts: "sidts;".to_string(),
            ..GeminiConfig::default()
        };
        let store = CookieStore::from_config(&config);
        assert_eq!(store.psid, "g.a000");
        assert_eq!(store.psidts, "sidts");
        assert_eq!(
            store.pairs(),
            vec![(COOKIE_PSID, "g.a000"), (COOKIE_PSIDTS, "sidts")]
        );
    }

    #[test]
    fn test_store_serializes_with_browser_names() {
        let store = CookieStore {
            psid: "a".to_string(),
            psidts: "b".to_string(),
            psidcc: String::new(),
            updated_at: None,
        };
        assert_eq!(
            serde_json::to_value(&store).unwrap(),
            serde_json::json!({
                "__Secure-1PSID": "a",
                "__Secure-1PSIDTS": "b",
                "__Secure-1PSIDCC": ""
            })
        );
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("__Secure-1PSIDTS=new; Path=/; Secure; HttpOnly"),
            Some(("__Secure-1PSIDTS".to_string(), "new".to_string()))
        );
        assert_eq!(parse_set_cookie("garbage"), None);
        assert_eq!(parse_set_cookie("=value"), None);
    }

    #[test]
    fn test_set_cookies_reads_every_header() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("NID=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("AEC=2"));
        assert_eq!(
            set_cookies(&headers),
            vec![
                ("NID".to_string(), "1".to_string()),
                ("AEC".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_jar_header_overrides_duplicates() {
        let mut jar = CookieJar::new();
        jar.insert("NID", "old");
        jar.extend([("NID", "new"), ("AEC", "x")]);
        assert_eq!(jar.header(), "AEC=x; NID=new");
    }

    #[test]
    fn test_cache_path_is_psid_hash() {
        let cache = CookieCache::new("/tmp/cookies");
        assert_eq!(
            cache.path_for("abc"),
            PathBuf::from(
                "/tmp/cookies/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.txt"
            )
        );
    }

    #[test]
    fn test_cache_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let cache = CookieCache::new(dir.path().join("nested"));

        assert_eq!(cache.load("psid"), None);
        cache.save("psid", "sidts-1").unwrap();
        assert_eq!(cache.load("psid").as_deref(), Some("sidts-1"));
        assert_eq!(cache.load("other"), None);

        cache.clear("psid").unwrap();
        assert_eq!(cache.load("psid"), None);
        cache.clear("psid").unwrap();
    }

    #[test]
    fn test_cache_ignores_blank_values() {
        let dir = TempDir::new().unwrap();
        let cache = CookieCache::new(dir.path());

        cache.save("psid", "").unwrap();
        assert!(!cache.path_for("psid").exists());

        fs::write(cache.path_for("psid"), "  \n").unwrap();
        assert_eq!(cache.load("psid"), None);
    }
}
