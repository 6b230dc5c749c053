//! Remote table access.
//!
//! [`RemoteStore`] is the seam the merge and enrichment jobs talk through;
//! [`HttpStore`] implements it against the REST API:
//!
//! ```text
//! GET    {base}/{table}?limit=N     -> {"list": [record, ...]}
//! DELETE {base}/bulk/{table}        body: [{pk: value}, ...]
//! POST   {base}/bulk/{table}        body: [record, ...]
//! PATCH  {base}/bulk/{table}        body: [record, ...]
//! PATCH  {base}/{table}/{row_id}    body: partial record
//! ```
//!
//! Every request carries the `xc-auth` token header.

use serde::{Deserialize, Serialize};
use url::Url;

use tablesync_core::{Collection, Config, Record, TableName};

use crate::error::RemoteError;

/// Header carrying the static API token.
pub const AUTH_HEADER: &str = "xc-auth";

/// Operations the jobs need from the remote table.
pub trait RemoteStore {
    /// Every row of the table, up to the configured row limit.
    fn list(&self) -> Result<Collection, RemoteError>;

    /// Delete the rows addressed by `selectors` (`{pk: value}` objects).
    fn bulk_delete(&self, selectors: &[Record]) -> Result<(), RemoteError>;

    /// Insert `records` as new rows.
    fn bulk_insert(&self, records: &[Record]) -> Result<(), RemoteError>;

    /// Overwrite existing rows, matched by primary key.
    fn bulk_update(&self, records: &[Record]) -> Result<(), RemoteError>;

    /// Update only the given `fields` of the row whose primary key reads
    /// `row_id`.
    fn patch(&self, row_id: &str, fields: &Record) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    list: Collection,
}

/// [`RemoteStore`] over HTTP with a blocking `ureq` agent.
#[derive(Clone)]
pub struct HttpStore {
    agent: ureq::Agent,
    base_url: String,
    table: TableName,
    auth_token: String,
    row_limit: u32,
}

impl HttpStore {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.http_timeout)
            .build();
        Self {
            agent,
            base_url: config.base_url(),
            table: config.table.clone(),
            auth_token: config.auth_token.clone(),
            row_limit: config.row_limit,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    fn bulk_url(&self) -> String {
        format!("{}/bulk/{}", self.base_url, self.table)
    }

    fn row_url(&self, row_id: &str) -> Result<String, RemoteError> {
        let table_url = self.table_url();
        let invalid = |reason: String| RemoteError::Transport {
            method: "PATCH",
            url: table_url.clone(),
            message: reason,
        };
        let mut url = Url::parse(&table_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot hold path segments".to_string()))?
            .push(row_id);
        Ok(url.into())
    }

    fn send<T: Serialize + ?Sized>(
        &self,
        method: &'static str,
        url: &str,
        body: &T,
    ) -> Result<(), RemoteError> {
        tracing::debug!(method, url, "remote request");
        self.agent
            .request(method, url)
            .set(AUTH_HEADER, &self.auth_token)
            .send_json(body)
            .map_err(|e| RemoteError::from_ureq(method, url, e))?;
        Ok(())
    }
}

impl RemoteStore for HttpStore {
    fn list(&self) -> Result<Collection, RemoteError> {
        let url = self.table_url();
        tracing::debug!(url = %url, limit = self.row_limit, "fetching remote table");
        let response = self
            .agent
            .get(&url)
            .set(AUTH_HEADER, &self.auth_token)
            .query("limit", &self.row_limit.to_string())
            .call()
            .map_err(|e| RemoteError::from_ureq("GET", &url, e))?;
        let body: ListResponse = response.into_json().map_err(|e| RemoteError::Payload {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(body.list)
    }

    fn bulk_delete(&self, selectors: &[Record]) -> Result<(), RemoteError> {
        self.send("DELETE", &self.bulk_url(), selectors)
    }

    fn bulk_insert(&self, records: &[Record]) -> Result<(), RemoteError> {
        self.send("POST", &self.bulk_url(), records)
    }

    fn bulk_update(&self, records: &[Record]) -> Result<(), RemoteError> {
        self.send("PATCH", &self.bulk_url(), records)
    }

    fn patch(&self, row_id: &str, fields: &Record) -> Result<(), RemoteError> {
        let url = self.row_url(row_id)?;
        self.send("PATCH", &url, fields)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
