//! Connection options.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Connection options for PostgreSQL.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Unix socket path. Takes precedence over `host` when set.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Password for authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Application name to report to the server.
    ///
    /// Default: `None`
    pub application_name: Option<String>,

    /// Additional startup parameters.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,

    /// Upper bound on every blocking read from the server.
    ///
    /// A read that times out leaves the connection unusable, since its
    /// position in the response stream is no longer known.
    ///
    /// Default: `None` (wait forever)
    pub read_timeout: Option<Duration>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            socket: None,
            user: String::new(),
            database: None,
            password: None,
            application_name: None,
            params: Vec::new(),
            read_timeout: None,
        }
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&param2=value2&..]`
    ///
    /// Supported query parameters:
    /// - `application_name`: application name
    /// - `socket`: Unix socket path
    /// - `read_timeout_ms`: read timeout in milliseconds
    /// - `sslmode`: `disable`, `allow` or `prefer` (TLS is never used);
    ///   `require`, `verify-ca` and `verify-full` are rejected
    ///
    /// Other parameters are sent to the server as startup parameters.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql", "pg"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5432),
            user: url.username().to_string(),
            password: url.password().map(|s| s.to_string()),
            database: url
                .path()
                .strip_prefix('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "sslmode" => match value.as_ref() {
                    "disable" | "allow" | "prefer" => {}
                    "require" | "verify-ca" | "verify-full" => {
                        return Err(Error::Unsupported(format!(
                            "sslmode={} (TLS is not supported)",
                            value
                        )));
                    }
                    _ => {
                        return Err(Error::InvalidUsage(format!(
                            "Invalid sslmode: {}",
                            value
                        )));
                    }
                },
                "application_name" => {
                    opts.application_name = Some(value.to_string());
                }
                "socket" => {
                    opts.socket = Some(value.to_string());
                }
                "read_timeout_ms" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid read_timeout_ms: {}", value))
                    })?;
                    opts.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

impl TryFrom<String> for Opts {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}
