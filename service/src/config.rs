//! Service configuration.
//!
//! Every option can be set as a CLI flag or through its environment
//! variable, the way the service is configured on a serverless runtime.
//! Database and topic specifiers accept either a bare id or the
//! fully-qualified `projects/{p}/...` form; a qualified specifier
//! carries its own project id.

use clap::Parser;
use std::time::Duration;

/// Runtime configuration.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "firesync",
    about = "Replicates document mutations between databases over a pub/sub topic"
)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Project id the service runs under.
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", default_value = "firesync")]
    pub project_id: String,

    /// Region the service runs in.
    #[arg(long, env = "GOOGLE_CLOUD_REGION", default_value = "local")]
    pub region: String,

    /// Unique identifier of this instance.
    #[arg(long, env = "CLOUD_RUN_INSTANCE_ID", default_value = "local")]
    pub instance_id: String,

    /// Revision of the service being run.
    #[arg(long, env = "K_REVISION", default_value = "local")]
    pub revision: String,

    /// Configuration that created the revision.
    #[arg(long, env = "K_CONFIGURATION", default_value = "local")]
    pub configuration: String,

    /// Database to propagate from: bare id or
    /// `projects/{project}/databases/{database}`.
    #[arg(long, env = "DATABASE", default_value = "(default)")]
    pub database: String,

    /// Topic to propagate to: bare id or
    /// `projects/{project}/topics/{topic}`.
    #[arg(long, env = "TOPIC", default_value = "firesync")]
    pub topic: String,

    /// Per-request timeout.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// How long the server may drain in-flight requests on shutdown.
    #[arg(long, env = "GRACEFUL_SHUTDOWN_TIMEOUT", default_value = "8s", value_parser = parse_duration)]
    pub shutdown_timeout: Duration,

    /// How long tombstones remain before the TTL sweeper may collect
    /// them.
    #[arg(long, env = "TOMBSTONE_TTL", default_value = "24h", value_parser = parse_duration)]
    pub tombstone_ttl: Duration,

    /// Log verbosity: trace, debug, info, warn, or error.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Acknowledge accepted intakes with plain 200s instead of
    /// semantically correct status codes. Needed for push-delivery
    /// emulators that treat anything else as a nack.
    #[arg(long, env = "FORCE_HTTP200_ACK", default_value_t = false)]
    pub force_http200_ack: bool,
}

impl Config {
    /// Bare database id.
    #[must_use]
    pub fn database_id(&self) -> &str {
        bare_id(&self.database)
    }

    /// Project hosting the database.
    #[must_use]
    pub fn database_project_id(&self) -> &str {
        specifier_project(&self.database).unwrap_or(&self.project_id)
    }

    /// Bare topic id.
    #[must_use]
    pub fn topic_id(&self) -> &str {
        bare_id(&self.topic)
    }

    /// Project hosting the topic.
    #[must_use]
    pub fn topic_project_id(&self) -> &str {
        specifier_project(&self.topic).unwrap_or(&self.project_id)
    }

    /// Source coordinates of this replica,
    /// `projects/{project}/databases/{database}`.
    #[must_use]
    pub fn source(&self) -> String {
        format!(
            "projects/{}/databases/{}",
            self.database_project_id(),
            self.database_id()
        )
    }

    /// Tombstone TTL as a chrono duration for timestamp arithmetic.
    #[must_use]
    pub fn tombstone_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.tombstone_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }
}

/// Strips the qualified prefix off a database or topic specifier.
fn bare_id(specifier: &str) -> &str {
    if specifier.starts_with("projects/") {
        match specifier.rsplit_once('/') {
            Some((_, id)) => id,
            None => specifier,
        }
    } else {
        specifier
    }
}

/// Project id carried by a qualified specifier, if any. A specifier
/// with a `projects/` prefix but no further segment carries none.
fn specifier_project(specifier: &str) -> Option<&str> {
    let rest = specifier.strip_prefix("projects/")?;
    rest.find('/').map(|idx| &rest[..idx])
}

/// Parses compact durations: `500ms`, `10s`, `5m`, `24h`, `7d`.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let unit_start = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration: {raw}"))?;
    let (value, unit) = raw.split_at(unit_start);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid number in duration: {raw}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        "d" => Ok(Duration::from_secs(value * 86400)),
        _ => Err(format!("unknown duration unit: {unit}")),
    }
}
