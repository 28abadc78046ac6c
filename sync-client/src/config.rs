//! Pipeline and endpoint configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use feedsync_core::{RetryPolicy, DEFAULT_MAX_RETAINED};
use feedsync_types::PayloadShape;
use serde::{Deserialize, Serialize};

/// Default polling period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(30);

/// Tunables of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Delay before the first tick.
    pub initial_delay: Duration,
    /// Time between ticks.
    pub poll_period: Duration,
    /// Attempt limit and backoff unit.
    pub retry: RetryPolicy,
    /// Maximum number of items kept in [`feedsync_types::SyncState`].
    pub max_retained: usize,
    /// Age after which a cached response is revalidated. `None` never expires.
    pub cache_ttl: Option<Duration>,
    /// Assumed connectivity until the caller reports otherwise.
    pub start_online: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            poll_period: DEFAULT_POLL_PERIOD,
            retry: RetryPolicy::default(),
            max_retained: DEFAULT_MAX_RETAINED,
            cache_ttl: None,
            start_online: true,
        }
    }
}

impl PipelineConfig {
    /// Set the delay before the first tick.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the polling period.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, max_attempts: u32, backoff_unit: Duration) -> Self {
        self.retry = RetryPolicy::new(max_attempts, backoff_unit);
        self
    }

    /// Set the retention limit.
    pub fn with_max_retained(mut self, max_retained: usize) -> Self {
        self.max_retained = max_retained;
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the initial connectivity assumption.
    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }
}

/// Where the credential goes in a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPlacement {
    /// `Authorization: Bearer <credential>`
    #[default]
    BearerHeader,
    /// `?<name>=<credential>`
    QueryParam {
        /// Query parameter name
        name: String,
    },
}

fn default_newer_param() -> Option<String> {
    Some("since_id".to_string())
}

/// One remote collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Absolute URL without query string.
    pub url: String,

    /// Fixed query parameters sent on every request.
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Credential placement.
    #[serde(default)]
    pub credential: CredentialPlacement,

    /// Parameter carrying `max_seen_id` (ask for newer items only).
    #[serde(default = "default_newer_param")]
    pub newer_param: Option<String>,

    /// Parameter carrying `min_seen_id` (older-page boundary).
    #[serde(default)]
    pub older_param: Option<String>,

    /// Layout of the response body.
    #[serde(default)]
    pub payload: PayloadShape,

    /// Send `If-Modified-Since` with the last `Last-Modified` value seen.
    #[serde(default)]
    pub conditional: bool,
}

const TWITTER_API: &str = "https://api.twitter.com/1.1";
const GITHUB_API: &str = "https://api.github.com";
const WEATHER_API: &str = "http://api.openweathermap.org/data/2.5";

impl Endpoint {
    /// A bearer-authenticated endpoint returning a bare array, cursored by `since_id`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: BTreeMap::new(),
            credential: CredentialPlacement::BearerHeader,
            newer_param: default_newer_param(),
            older_param: None,
            payload: PayloadShape::Array,
            conditional: false,
        }
    }

    /// Add a fixed query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Send the credential as a query parameter instead of a header.
    pub fn with_credential_param(mut self, name: impl Into<String>) -> Self {
        self.credential = CredentialPlacement::QueryParam { name: name.into() };
        self
    }

    /// Set both cursor parameter names. `None` omits that bound.
    pub fn with_cursor_params(mut self, newer: Option<&str>, older: Option<&str>) -> Self {
        self.newer_param = newer.map(str::to_string);
        self.older_param = older.map(str::to_string);
        self
    }

    /// Read items from an envelope field instead of a bare array.
    pub fn with_envelope(mut self, field: impl Into<String>) -> Self {
        self.payload = PayloadShape::envelope(field);
        self
    }

    /// Enable `If-Modified-Since` conditional requests.
    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    /// Tweets posted by one user.
    pub fn user_timeline(screen_name: &str) -> Self {
        Self::new(format!("{}/statuses/user_timeline.json", TWITTER_API))
            .with_query("screen_name", screen_name)
            .with_query("contributor_details", "false")
            .with_query("count", "100")
            .with_query("include_rts", "true")
    }

    /// Tweets from the members of a list.
    pub fn list_timeline(owner_screen_name: &str, slug: &str) -> Self {
        Self::new(format!("{}/lists/statuses.json", TWITTER_API))
            .with_query("owner_screen_name", owner_screen_name)
            .with_query("slug", slug)
    }

    /// Public events of a repository (`owner/name`), revalidated by `Last-Modified`.
    pub fn repo_events(repo: &str) -> Self {
        Self::new(format!("{}/repos/{}/events", GITHUB_API, repo))
            .with_cursor_params(None, None)
            .with_conditional(true)
    }

    /// Current weather in cities matching `city`.
    pub fn city_weather(city: &str) -> Self {
        Self::weather().with_query("q", city)
    }

    /// Current weather around a coordinate.
    pub fn coordinate_weather(lat: f64, lon: f64) -> Self {
        Self::weather()
            .with_query("lat", lat.to_string())
            .with_query("lon", lon.to_string())
    }

    fn weather() -> Self {
        Self::new(format!("{}/find", WEATHER_API))
            .with_query("units", "metric")
            .with_credential_param("appid")
            .with_cursor_params(None, None)
            .with_envelope("list")
    }
}
