use parking_lot::RwLock;
use serde::Deserialize;

use crate::{backend::Backend, codec::encode_batch, config::InfluxConfig, BackendError, DataPoint};

/// Client for the InfluxDB 1.x HTTP API.
///
/// Blocking I/O
#[derive(Debug)]
pub struct InfluxClient {
    agent: ureq::Agent,
    base_url: String,
    username: String,
    password: String,
    database: RwLock<Option<String>>,
}
impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            database: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
    pub fn database(&self) -> Option<String> {
        self.database.read().clone()
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}/{}", self.base_url, path);
        let req = self.agent.request(method, &url);
        if self.username.is_empty() {
            return req;
        }
        req.query("u", &self.username).query("p", &self.password)
    }

    fn show(&self, statement: &str) -> Result<QueryResponse, BackendError> {
        let resp = self.request("GET", "query").query("q", statement).call();
        decode_query(resp)
    }
    fn execute(&self, statement: &str) -> Result<QueryResponse, BackendError> {
        let resp = self.request("POST", "query").send_form(&[("q", statement)]);
        decode_query(resp)
    }
}
impl Backend for InfluxClient {
    fn write_points(&self, points: &[DataPoint]) -> Result<(), BackendError> {
        let database = self.database().ok_or(BackendError::NoDatabase)?;
        let body = encode_batch(points);
        self.request("POST", "write")
            .query("db", &database)
            .query("precision", "ms")
            .send_string(&body)
            .map_err(backend_error)?;
        Ok(())
    }

    fn database_exists(&self, name: &str) -> Result<bool, BackendError> {
        let resp = self.show("SHOW DATABASES")?;
        let exists = resp
            .results
            .iter()
            .flat_map(|r| &r.series)
            .flat_map(|s| &s.values)
            .any(|row| row.first().map(String::as_str) == Some(name));
        Ok(exists)
    }

    fn create_database(&self, name: &str) -> Result<(), BackendError> {
        let statement = format!("CREATE DATABASE \"{}\"", name.replace('"', "\\\""));
        self.execute(&statement)?;
        Ok(())
    }

    fn switch_database(&self, name: &str) -> Result<(), BackendError> {
        *self.database.write() = Some(name.to_owned());
        Ok(())
    }
}

fn decode_query(resp: Result<ureq::Response, ureq::Error>) -> Result<QueryResponse, BackendError> {
    let resp: QueryResponse = resp
        .map_err(backend_error)?
        .into_json()
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    if let Some(err) = resp.results.iter().find_map(|r| r.error.as_ref()) {
        return Err(BackendError::Query(err.clone()));
    }
    Ok(resp)
}

fn backend_error(err: ureq::Error) -> BackendError {
    match err {
        ureq::Error::Status(status, resp) => BackendError::Status {
            status,
            body: resp.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => BackendError::Transport(transport.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<String>>,
}
