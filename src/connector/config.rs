use crate::core::{EnrichError, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_stream_timeout_ms() -> u64 {
    5_000
}

fn default_capacity() -> usize {
    30
}

/// Settings of one HTTP enrichment connector.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    pub endpoint: String,

    /// Body template, see [`RequestTemplate`](crate::connector::template::RequestTemplate).
    #[serde(default)]
    pub request_pattern: String,

    /// Input columns supplying the template arguments, in order. Accepts a
    /// JSON list or a comma separated string.
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub request_variables: Vec<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long one call may stay in flight before it is timed out.
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,

    #[serde(default, rename = "type")]
    pub output_schema_name: Option<String>,

    #[serde(default)]
    pub fail_on_errors: bool,

    #[serde(default = "default_capacity", rename = "capacity")]
    pub max_concurrent_calls: usize,
}

impl ConnectorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_pattern: String::new(),
            request_variables: Vec::new(),
            headers: HashMap::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stream_timeout_ms: default_stream_timeout_ms(),
            output_schema_name: None,
            fail_on_errors: false,
            max_concurrent_calls: default_capacity(),
        }
    }

    pub fn with_request(
        mut self,
        pattern: impl Into<String>,
        variables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.request_pattern = pattern.into();
        self.request_variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_output_schema(mut self, name: impl Into<String>) -> Self {
        self.output_schema_name = Some(name.into());
        self
    }

    pub fn with_fail_on_errors(mut self, fail_on_errors: bool) -> Self {
        self.fail_on_errors = fail_on_errors;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.max_concurrent_calls = capacity;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    /// Rejects settings the connector cannot start with. Template and column
    /// problems are left to each record.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.endpoint).map_err(|e| {
            EnrichError::configuration(format!(
                "Endpoint '{}' is not a valid URL: {}",
                self.endpoint, e
            ))
        })?;

        for (name, value) in &self.headers {
            reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| {
                    EnrichError::configuration(format!("Header name '{}' is invalid", name))
                })?;
            reqwest::header::HeaderValue::from_str(value).map_err(|_| {
                EnrichError::configuration(format!("Header '{}' has an invalid value", name))
            })?;
        }

        if self.connect_timeout_ms == 0 || self.stream_timeout_ms == 0 {
            return Err(EnrichError::configuration("Timeouts must be greater than zero"));
        }
        if self.max_concurrent_calls == 0 {
            return Err(EnrichError::configuration("Capacity must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Variables {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_variables<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = match Variables::deserialize(deserializer)? {
        Variables::List(names) => names,
        Variables::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

/// File-level configuration of the enrichment stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
    pub connector: ConnectorConfig,
}

impl StageConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StageConfig = serde_json::from_str(json)?;
        config.connector.validate()?;
        Ok(config)
    }

    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&contents)
    }
}
