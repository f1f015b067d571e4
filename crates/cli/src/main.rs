//! IssueBridge CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Wire observability**: configure `tracing-subscriber` with a JSON layer
//!    and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OpenTelemetry OTLP
//!    exporter. All `tracing` spans and structured events emitted by every
//!    crate in the workspace flow through this subscriber.
//! 2. **Load configuration** from `ISSUEBRIDGE_*` environment variables
//!    ([`protocol::ToolkitConfig::from_env`]).
//! 3. **Construct infrastructure**: the `reqwest` transport and the session
//!    store selected by `ISSUEBRIDGE_PERSISTENCE`, injected into the engine's
//!    `QueryExecutor`, `ResponseCache` and `SessionManager`.
//! 4. **Run one request**: the GraphQL document comes from the first argument
//!    (or stdin when absent or `-`), variables from the optional second
//!    argument. Response `data` is printed to stdout as JSON.
//!
//! `--session-id` (or `ISSUEBRIDGE_SESSION_ID`) resumes a persisted session; its context
//! and id carry over between invocations. Expired sessions are discarded and
//! replaced.

mod telemetry;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use engine::{QueryExecutor, ResponseCache, SessionManager};
use http_transport::ReqwestTransport;
use protocol::{Request, SessionConfig, SessionId, SessionStore, ToolkitConfig};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

/// Run one GraphQL request against the issue tracker.
#[derive(Parser, Debug)]
#[command(name = "issuebridge", version, about, long_about = None)]
struct Cli {
    /// GraphQL document; read from stdin when absent or `-`.
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Operation variables as a JSON object.
    #[arg(value_name = "VARIABLES_JSON", value_parser = parse_variables)]
    variables: Option<Value>,

    /// Persisted session to resume.
    #[arg(long, env = "ISSUEBRIDGE_SESSION_ID", value_name = "UUID")]
    session_id: Option<SessionId>,
}

fn parse_variables(raw: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| format!("not valid JSON: {err}"))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("must be a JSON object".to_string())
    }
}

impl Cli {
    async fn request(&self) -> Result<Request> {
        let query = match self.query.as_deref() {
            Some(query) if query != "-" => query.to_string(),
            _ => {
                let mut buffer = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .context("failed to read query from stdin")?;
                buffer
            }
        };
        if query.trim().is_empty() {
            bail!("empty GraphQL document");
        }

        let is_mutation = query.trim_start().starts_with("mutation");
        let variables = self
            .variables
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let request = Request::new(query).with_variables(variables);
        Ok(if is_mutation {
            request
        } else {
            request.cacheable()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = telemetry::init()?;
    let outcome = run(cli).await;
    if let Err(err) = &outcome {
        error!(error = %format!("{err:#}"), "issuebridge failed");
    }
    telemetry.shutdown();
    outcome
}

async fn run(cli: Cli) -> Result<()> {
    let config = ToolkitConfig::from_env().context("invalid configuration")?;

    let transport = Arc::new(ReqwestTransport::new(&config.executor)?);
    let store = session_store::from_config(&config.session.persistence);
    let session = Arc::new(open_session(cli.session_id, store, &config.session).await?);
    let cache = Arc::new(ResponseCache::new(&config.cache));
    let executor = QueryExecutor::new(&config.executor, transport)
        .with_cache(cache)
        .with_session(Arc::clone(&session));

    let request = cli.request().await?;
    info!(
        session_id = %session.id(),
        operation = %request.operation_name(),
        "executing request"
    );
    let result = executor.execute(&request).await;

    session
        .persist()
        .await
        .context("failed to persist session")?;
    let stats = session.operation_stats();
    info!(
        session_id = %session.id(),
        total = stats.total,
        successful = stats.successful,
        failed = stats.failed,
        "session saved"
    );

    let response = result.with_context(|| format!("{} failed", request.operation_name()))?;
    let data = response.data.unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

/// Resumes session `id` if it is stored and has not expired, otherwise starts
/// a new session on `store`.
async fn open_session(
    id: Option<SessionId>,
    store: Arc<dyn SessionStore>,
    config: &SessionConfig,
) -> Result<SessionManager> {
    let Some(id) = id else {
        return Ok(SessionManager::with_store(store));
    };

    match SessionManager::restore(id, Arc::clone(&store)).await? {
        Some(session) if !session.is_expired(config.max_age) => Ok(session),
        Some(expired) => {
            warn!(session_id = %id, "stored session expired; starting a new one");
            expired.discard().await?;
            Ok(SessionManager::with_store(store))
        }
        None => {
            warn!(session_id = %id, "no stored session; starting a new one");
            Ok(SessionManager::with_store(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("issuebridge").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn queries_are_cacheable_and_mutations_are_not() {
        let query = parse(&["query Viewer { viewer { id } }"])
            .unwrap()
            .request()
            .await
            .unwrap();
        assert!(query.is_cacheable());
        assert_eq!(query.operation_name().as_str(), "Viewer");
        assert_eq!(query.variables(), &json!({}));

        let mutation = parse(&[
            "mutation Archive($id: String!) { issueArchive(id: $id) { success } }",
            r#"{"id": "ISS-1"}"#,
        ])
        .unwrap()
        .request()
        .await
        .unwrap();
        assert!(!mutation.is_cacheable());
        assert_eq!(mutation.variables(), &json!({"id": "ISS-1"}));
    }

    #[test]
    fn dash_is_accepted_as_the_query() {
        let cli = parse(&["-", "{}"]).unwrap();
        assert_eq!(cli.query.as_deref(), Some("-"));
        assert_eq!(cli.variables, Some(json!({})));
    }

    #[test]
    fn variables_must_be_a_json_object() {
        assert!(parse(&["{ viewer { id } }", "[1, 2]"]).is_err());
        assert!(parse(&["{ viewer { id } }", "not json"]).is_err());
        assert!(parse(&["{ viewer { id } }", "{}", "extra"]).is_err());
    }

    #[test]
    fn session_id_must_be_a_uuid() {
        let id = SessionId::new();
        let cli = parse(&["--session-id", &id.to_string(), "{ viewer { id } }"]).unwrap();
        assert_eq!(cli.session_id, Some(id));

        assert!(parse(&["--session-id", "yesterday", "{ viewer { id } }"]).is_err());
    }

    #[test]
    fn help_is_reported_as_an_error_kind_not_an_exit() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
