//! Process configuration.
//!
//! Built once at process entry with [`Config::from_env`] and passed by
//! reference to the jobs. Nothing else in the workspace reads the
//! environment. Tests use [`Config::from_lookup`] with a map.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ProjectSlug, TableName};

pub const ENV_TABLE_NAME: &str = "NC_TABLE_NAME";
pub const ENV_PROJECT_SLUG: &str = "NC_PROJECT_SLUG";
pub const ENV_XC_KEY: &str = "NC_XC_KEY";
pub const ENV_PROTOCOL: &str = "NC_PROTOCOL";
pub const ENV_HOST: &str = "NC_HOST";
pub const ENV_ROW_LIMIT: &str = "NC_ROW_LIMIT";
pub const ENV_JSON_FILE: &str = "JSON_FILE";
pub const ENV_OBJECT_PK: &str = "NC_OBJECT_PK";
pub const ENV_OBJECT_DATE_FIELD: &str = "NC_OBJECT_DATE_FIELD";
pub const ENV_SOURCE_URL_FIELD: &str = "NC_SOURCE_URL_FIELD";
pub const ENV_METRIC_FIELD: &str = "NC_METRIC_FIELD";
pub const ENV_REPLACE_MODE: &str = "NC_REPLACE_MODE";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TABLESYNC_HTTP_TIMEOUT_SECS";

const DEFAULT_PROTOCOL: &str = "http";
const DEFAULT_HOST: &str = "127.0.0.1:8080";
const DEFAULT_ROW_LIMIT: u32 = 50_000;
const DEFAULT_JSON_FILE: &str = "tools.json";
const DEFAULT_OBJECT_PK: &str = "id";
const DEFAULT_OBJECT_DATE_FIELD: &str = "updated_at";
const DEFAULT_SOURCE_URL_FIELD: &str = "GitHub URL";
const DEFAULT_METRIC_FIELD: &str = "GitHub Stars";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// How the merge result is written back to the remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplaceMode {
    /// Bulk-delete every fetched row, then bulk-insert the merge result.
    /// The table is empty between the two calls.
    #[default]
    DeleteInsert,
    /// Bulk-update rows that exist remotely, bulk-insert new ones, then
    /// delete remote rows missing from the merge result.
    Upsert,
}

impl fmt::Display for ReplaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaceMode::DeleteInsert => write!(f, "delete-insert"),
            ReplaceMode::Upsert => write!(f, "upsert"),
        }
    }
}

impl FromStr for ReplaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete-insert" | "replace" => Ok(Self::DeleteInsert),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!(
                "unknown replace mode '{other}'; expected: delete-insert, upsert"
            )),
        }
    }
}

/// Everything the merge and enrichment jobs need to know about their
/// environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub table: TableName,
    pub project: ProjectSlug,
    /// Sent verbatim as the `xc-auth` header.
    pub auth_token: String,
    pub protocol: String,
    pub host: String,
    pub row_limit: u32,
    pub snapshot_path: PathBuf,
    pub pk_field: String,
    pub date_field: String,
    pub source_url_field: String,
    pub metric_field: String,
    pub replace_mode: ReplaceMode,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub http_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("table", &self.table)
            .field("project", &self.project)
            .field("auth_token", &"[REDACTED]")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("row_limit", &self.row_limit)
            .field("snapshot_path", &self.snapshot_path)
            .field("pk_field", &self.pk_field)
            .field("date_field", &self.date_field)
            .field("source_url_field", &self.source_url_field)
            .field("metric_field", &self.metric_field)
            .field("replace_mode", &self.replace_mode)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("github_api_url", &self.github_api_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));
        let or_default = |var: &'static str, default: &str| {
            get(var).unwrap_or_else(|| default.to_string())
        };

        let table = TableName::from(required(ENV_TABLE_NAME)?);
        let project = ProjectSlug::from(required(ENV_PROJECT_SLUG)?);
        let auth_token = required(ENV_XC_KEY)?;

        let row_limit = match get(ENV_ROW_LIMIT) {
            Some(raw) => parse_positive::<u32>(ENV_ROW_LIMIT, &raw)?,
            None => DEFAULT_ROW_LIMIT,
        };
        let http_timeout = match get(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_positive::<u64>(ENV_HTTP_TIMEOUT_SECS, &raw)?),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };
        let replace_mode = match get(ENV_REPLACE_MODE) {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: ENV_REPLACE_MODE,
                value: raw.clone(),
                reason,
            })?,
            None => ReplaceMode::default(),
        };

        Ok(Self {
            table,
            project,
            auth_token,
            protocol: or_default(ENV_PROTOCOL, DEFAULT_PROTOCOL),
            host: or_default(ENV_HOST, DEFAULT_HOST),
            row_limit,
            snapshot_path: PathBuf::from(or_default(ENV_JSON_FILE, DEFAULT_JSON_FILE)),
            pk_field: or_default(ENV_OBJECT_PK, DEFAULT_OBJECT_PK),
            date_field: or_default(ENV_OBJECT_DATE_FIELD, DEFAULT_OBJECT_DATE_FIELD),
            source_url_field: or_default(ENV_SOURCE_URL_FIELD, DEFAULT_SOURCE_URL_FIELD),
            metric_field: or_default(ENV_METRIC_FIELD, DEFAULT_METRIC_FIELD),
            replace_mode,
            github_token: get(ENV_GITHUB_TOKEN),
            github_api_url: or_default(ENV_GITHUB_API_URL, DEFAULT_GITHUB_API_URL)
                .trim_end_matches('/')
                .to_string(),
            http_timeout,
        })
    }

    /// `{protocol}://{host}/nc/{project}/api/v1`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}/nc/{}/api/v1",
            self.protocol,
            self.host.trim_end_matches('/'),
            self.project
        )
    }
}

fn parse_positive<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let value: T = raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_mode_parses_both_spellings() {
        assert_eq!("upsert".parse::<ReplaceMode>(), Ok(ReplaceMode::Upsert));
        assert_eq!(
            "Delete-Insert".parse::<ReplaceMode>(),
            Ok(ReplaceMode::DeleteInsert)
        );
        assert_eq!("replace".parse::<ReplaceMode>(), Ok(ReplaceMode::DeleteInsert));
        assert!("merge".parse::<ReplaceMode>().is_err());
    }

    #[test]
    fn replace_mode_display_roundtrips() {
        for mode in [ReplaceMode::DeleteInsert, ReplaceMode::Upsert] {
            assert_eq!(mode.to_string().parse::<ReplaceMode>(), Ok(mode));
        }
    }

    #[test]
    fn parse_positive_rejects_zero_and_garbage() {
        assert_eq!(parse_positive::<u32>("X", "10"), Ok(10));
        assert!(matches!(
            parse_positive::<u32>("X", "0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse_positive::<u32>("X", "ten"),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
