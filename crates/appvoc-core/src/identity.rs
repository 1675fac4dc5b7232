//! Request identity: rotating browser headers and outbound proxies.

use std::sync::{Arc, Mutex};

use crate::error::AppError;

/// An ordered set of HTTP header name/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header(Vec<(String, String)>);

impl Header {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Supplies the header for the next request.
pub trait HeaderSource: Send + Sync + Clone {
    fn next_header(&self) -> Header;
}

// ---------------------------------------------------------------------------
// HeaderRotator
// ---------------------------------------------------------------------------

/// Rotates through a fixed pool of browser fingerprints, never handing out
/// the same header twice in a row.
#[derive(Clone)]
pub struct HeaderRotator {
    pool: Arc<[Header]>,
    last: Arc<Mutex<Option<usize>>>,
}

impl HeaderRotator {
    /// Rotator over the built-in desktop browser headers.
    pub fn browser() -> Self {
        Self::new(browser_headers())
    }

    pub fn new(pool: Vec<Header>) -> Self {
        Self {
            pool: pool.into(),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl HeaderSource for HeaderRotator {
    fn next_header(&self) -> Header {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned header rotator");
            poisoned.into_inner()
        });

        match self.pool.len() {
            0 => Header::default(),
            1 => {
                *last = Some(0);
                self.pool[0].clone()
            }
            len => {
                let idx = loop {
                    let candidate = rand::random_range(0..len);
                    if Some(candidate) != *last {
                        break candidate;
                    }
                };
                *last = Some(idx);
                self.pool[idx].clone()
            }
        }
    }
}

/// Fixed header for storefront-scoped endpoints (ratings, reviews).
#[derive(Debug, Clone)]
pub struct StorefrontHeader {
    header: Header,
}

impl StorefrontHeader {
    /// US storefront.
    pub fn us() -> Self {
        Self::new("143441-1,29")
    }

    pub fn new(storefront: &str) -> Self {
        Self {
            header: Header::from_pairs([("X-Apple-Store-Front", storefront)]),
        }
    }
}

impl Default for StorefrontHeader {
    fn default() -> Self {
        Self::us()
    }
}

impl HeaderSource for StorefrontHeader {
    fn next_header(&self) -> Header {
        self.header.clone()
    }
}

// ---------------------------------------------------------------------------
// ProxyPool
// ---------------------------------------------------------------------------

/// Pool of outbound proxy URLs. Each request draws one uniformly at random;
/// an empty pool means direct connections.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Arc<[String]>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies: proxies.into(),
        }
    }

    /// A pool that never proxies.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Build the pool from the `WEBSHARE_*` environment variables.
    ///
    /// - `WEBSHARE_USER`, `WEBSHARE_PWD`, `WEBSHARE_DNS`, `WEBSHARE_PORT`
    ///
    /// If none are set the pool is empty; a partial set is a configuration
    /// error.
    pub fn from_env() -> Result<Self, AppError> {
        let vars = ["WEBSHARE_USER", "WEBSHARE_PWD", "WEBSHARE_DNS", "WEBSHARE_PORT"];
        let values: Vec<Option<String>> = vars.iter().map(|v| std::env::var(v).ok()).collect();

        if values.iter().all(Option::is_none) {
            return Ok(Self::direct());
        }

        let missing: Vec<&str> = vars
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Incomplete proxy configuration, missing: {}",
                missing.join(", ")
            )));
        }

        let values: Vec<String> = values.into_iter().flatten().collect();
        let port: u16 = values[3].parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid WEBSHARE_PORT '{}'", values[3]))
        })?;

        Ok(Self::new(vec![format!(
            "http://{}:{}@{}:{}",
            values[0], values[1], values[2], port
        )]))
    }

    pub fn pick(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = rand::random_range(0..self.proxies.len());
        Some(self.proxies[idx].as_str())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in browser headers
// ---------------------------------------------------------------------------

const CHROMIUM_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const FIREFOX_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

fn chromium(sec_ch_ua: &str, user_agent: &str) -> Header {
    Header::from_pairs([
        ("authority", "www.apple.com"),
        ("accept", CHROMIUM_ACCEPT),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("sec-ch-ua", sec_ch_ua),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
        ("user-agent", user_agent),
    ])
}

fn firefox(user_agent: &str) -> Header {
    Header::from_pairs([
        ("User-Agent", user_agent),
        ("Accept", FIREFOX_ACCEPT),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ])
}

/// Desktop Chrome, Firefox, Edge and Opera fingerprints.
pub fn browser_headers() -> Vec<Header> {
    vec![
        chromium(
            r#""Google Chrome";v="111", "Not(A:Brand";v="8", "Chromium";v="111""#,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
        ),
        chromium(
            r#""Google Chrome";v="110", "Not(A:Brand";v="8", "Chromium";v="110""#,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
        ),
        firefox("Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/111.0"),
        firefox("Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/110.0"),
        firefox("Mozilla/5.0 (Windows NT 10.0; rv:111.0) Gecko/20100101 Firefox/111.0"),
        chromium(
            r#""Microsoft Edge";v="111", "Not(A:Brand";v="8", "Chromium";v="111""#,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36 Edg/111.0.1661.62",
        ),
        chromium(
            r#""Microsoft Edge";v="110", "Not(A:Brand";v="8", "Chromium";v="110""#,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36 Edg/110.0.1587.63",
        ),
        firefox("Mozilla/5.0 (Windows NT 10.0; rv:102.0) Gecko/20100101 Firefox/102.0"),
        chromium(
            r#""Not?A_Brand";v="99", "Opera";v="97", "Chromium";v="111""#,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36 OPR/97.0.0.0",
        ),
    ]
}
