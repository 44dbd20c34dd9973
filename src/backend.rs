use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::warn;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

pub const LINKS_PATH: &str = "/api/links";
pub const PROXY_PATH: &str = "/proxy";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} returned an empty body")]
    EmptyBody { url: String },
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            bail!("backend base url required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
                .build()
                .context("build backend HTTP client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single attempt at `GET /api/links`. Retrying is the caller's job.
    pub fn links(&self) -> Result<LinkMap> {
        let url = format!("{}{}", self.base_url, LINKS_PATH);
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("request {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { url, status }.into());
        }

        let body = response
            .text()
            .with_context(|| format!("read body of {url}"))?;
        serde_json::from_str(&body).with_context(|| format!("decode links from {url}"))
    }

    pub fn proxy_url(&self, display_id: &str) -> String {
        proxy_url(&self.base_url, display_id)
    }

    pub fn frame(&self, url: &str) -> Result<FramePayload> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("request {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status,
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .with_context(|| format!("read body of {url}"))?
            .to_vec();
        if bytes.is_empty() {
            return Err(BackendError::EmptyBody {
                url: url.to_string(),
            }
            .into());
        }

        Ok(FramePayload {
            url: url.to_string(),
            content_type,
            bytes,
        })
    }
}

pub fn proxy_url(base_url: &str, display_id: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        PROXY_PATH,
        utf8_percent_encode(display_id, PATH_SEGMENT)
    )
}

#[derive(Debug, Clone)]
pub struct FramePayload {
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Display id to URL mapping in the key order of the response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMap {
    entries: Vec<(String, String)>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (id, url) in pairs {
            map.insert(id.into(), url.into());
        }
        map
    }

    /// Repeated ids keep their first position and take the latest URL.
    pub fn insert(&mut self, id: String, url: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = url;
        } else {
            self.entries.push((id, url));
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, url)| url.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(id, url)| (id.as_str(), url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for LinkMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LinkMapVisitor;

        impl<'de> Visitor<'de> for LinkMapVisitor {
            type Value = LinkMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping display ids to urls")
            }

            fn visit_map<A>(self, mut access: A) -> Result<LinkMap, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut map = LinkMap::new();
                while let Some((id, url)) = access.next_entry::<String, String>()? {
                    map.insert(id, url);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(LinkMapVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(&self, op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        self.run_with(thread::sleep, op)
    }

    /// Calls `op` with the 1-based attempt number until it succeeds or the
    /// attempts run out, sleeping a fixed delay between attempts.
    pub fn run_with<T>(
        &self,
        mut sleep: impl FnMut(Duration),
        mut op: impl FnMut(u32) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!("attempt {attempt}/{attempts} failed: {err:#}");
                    last_err = Some(err);
                    if attempt < attempts {
                        sleep(self.delay);
                    }
                }
            }
        }
        match last_err {
            Some(err) => Err(err.context(format!("gave up after {attempts} attempts"))),
            None => bail!("retry loop made no attempts"),
        }
    }
}
