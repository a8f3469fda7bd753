//! One iteration of the agent CRUD script: ping the service, create an agent, read it back and
//! list agents with a random filter.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

use http_client_instrumented::prelude::{HttpClient, HttpResponse, TransportError};
use rand::Rng;
use serde::Deserialize;
use surge_runner::prelude::{CheckRecorder, IterationState, TargetConfig};

pub const PING_PATH: &str = "/api/v1/health/ping";
pub const AGENTS_PATH: &str = "/api/v1/agents";

/// Key of the created agent's id in the iteration state.
pub const AGENT_ID_KEY: &str = "agent_id";

pub const PING_SUCCEEDED: &str = "ping succeeded";
pub const CREATE_STATUS_IS_201: &str = "create status is 201";
pub const AGENT_ID_EXTRACTED: &str = "agent id extracted";
pub const GET_STATUS_IS_200: &str = "get status is 200";
pub const LIST_STATUS_IS_200: &str = "list status is 200";
pub const LIST_IS_NON_EMPTY: &str = "list is non-empty";

/// A random dotted-quad, every octet uniform in `[0, 255]`.
pub fn random_ipv4<R: Rng + ?Sized>(rng: &mut R) -> String {
    Ipv4Addr::new(rng.gen(), rng.gen(), rng.gen(), rng.gen()).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query parameters for the list step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub ip_address: String,
    pub sort_by: &'static str,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            page: rng.gen_range(1..=10),
            page_size: rng.gen_range(1..=20),
            ip_address: random_ipv4(rng),
            sort_by: "id",
            order: if rng.gen_bool(0.5) {
                SortOrder::Asc
            } else {
                SortOrder::Desc
            },
        }
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("page", &self.page.to_string())
            .append_pair("page_size", &self.page_size.to_string())
            .append_pair("ip_address", &self.ip_address)
            .append_pair("sort_by", self.sort_by)
            .append_pair("order", self.order.as_str())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CreateAgentResponse {
    agent: CreatedAgent,
}

#[derive(Debug, Deserialize)]
struct CreatedAgent {
    id: AgentId,
}

/// Agent ids are strings or numbers depending on the backing store.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgentId {
    Text(String),
    Number(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Create response is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Create response has no agent.id")]
    MissingId,
}

/// Pull `agent.id` out of a create response body.
pub fn extract_agent_id(body: &str) -> Result<String, ExtractError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let response: CreateAgentResponse =
        serde_json::from_value(value).map_err(|_| ExtractError::MissingId)?;

    match response.agent.id {
        AgentId::Text(id) if id.trim().is_empty() => Err(ExtractError::MissingId),
        AgentId::Text(id) => Ok(id),
        AgentId::Number(id) => Ok(id.to_string()),
    }
}

/// The number of agents in a list response, either a bare JSON array or the API's
/// `{"data": {"agents": [...]}}` envelope. `None` if the body has neither shape.
pub fn list_len(body: &str) -> Option<usize> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .as_array()
        .or_else(|| value.pointer("/data/agents").and_then(|a| a.as_array()))
        .map(|agents| agents.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ping,
    Create,
    ReadBack,
    List,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Ping => "ping",
            Step::Create => "create",
            Step::ReadBack => "read-back",
            Step::List => "list",
        };
        f.write_str(name)
    }
}

/// A step that got no response at all. The rest of the iteration is skipped.
#[derive(Debug, thiserror::Error)]
#[error("The {step} step failed: {source}")]
pub struct StepError {
    pub step: Step,
    #[source]
    pub source: TransportError,
}

fn headers(target: &TargetConfig) -> [(&str, &str); 2] {
    [
        ("Content-Type", "application/json"),
        ("API-Key", target.api_key.as_str()),
    ]
}

/// Transport errors are recorded as a failed check for the step, then end the iteration.
fn record_transport<T>(
    checks: &CheckRecorder,
    check: &str,
    step: Step,
    result: Result<T, TransportError>,
) -> Result<T, StepError> {
    result.map_err(|source| {
        checks.record(check, false);
        StepError { step, source }
    })
}

/// Call the health endpoint. Any response counts as the service being reachable, the status is
/// only logged.
pub async fn ping(
    client: &dyn HttpClient,
    target: &TargetConfig,
    checks: &CheckRecorder,
) -> Result<HttpResponse, StepError> {
    let result = client.get(&target.url(PING_PATH), &headers(target)).await;
    let response = record_transport(checks, PING_SUCCEEDED, Step::Ping, result)?;
    checks.record(PING_SUCCEEDED, true);

    if response.is_success() {
        log::debug!("Ping returned {} in {:?}", response.status, response.elapsed);
    } else {
        log::info!(
            "Ping returned {} in {:?}, continuing",
            response.status,
            response.elapsed
        );
    }

    Ok(response)
}

async fn create_agent<R: Rng + ?Sized>(
    client: &dyn HttpClient,
    target: &TargetConfig,
    checks: &CheckRecorder,
    state: &mut IterationState,
    rng: &mut R,
) -> Result<(), StepError> {
    let body = serde_json::json!({ "ip_address": random_ipv4(rng) }).to_string();
    let result = client
        .post(&target.url(AGENTS_PATH), &headers(target), body)
        .await;
    let response = record_transport(checks, CREATE_STATUS_IS_201, Step::Create, result)?;
    checks.record(CREATE_STATUS_IS_201, response.status == 201);

    match extract_agent_id(&response.body) {
        Ok(id) => {
            checks.record(AGENT_ID_EXTRACTED, true);
            state.insert(AGENT_ID_KEY, id);
        }
        Err(e) => {
            checks.record(AGENT_ID_EXTRACTED, false);
            log::debug!("Create returned {}: {e}", response.status);
        }
    }

    Ok(())
}

/// The URL of a single agent, with the id percent-encoded as one path segment.
pub fn agent_url(target: &TargetConfig, id: &str) -> Option<String> {
    let mut url = url::Url::parse(&target.url(AGENTS_PATH)).ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().push(id);
    Some(url.into())
}

async fn read_back(
    client: &dyn HttpClient,
    target: &TargetConfig,
    checks: &CheckRecorder,
    state: &IterationState,
) -> Result<(), StepError> {
    let Some(id) = state.get_str(AGENT_ID_KEY) else {
        log::debug!("No agent id, skipping the read-back step");
        return Ok(());
    };

    let Some(url) = agent_url(target, id) else {
        log::warn!("Cannot build a read-back URL from base {}", target.base_url);
        checks.record(GET_STATUS_IS_200, false);
        return Ok(());
    };
    let result = client.get(&url, &headers(target)).await;
    let response = record_transport(checks, GET_STATUS_IS_200, Step::ReadBack, result)?;
    checks.record(GET_STATUS_IS_200, response.status == 200);

    Ok(())
}

async fn list_agents<R: Rng + ?Sized>(
    client: &dyn HttpClient,
    target: &TargetConfig,
    checks: &CheckRecorder,
    rng: &mut R,
) -> Result<(), StepError> {
    let query = ListQuery::random(rng);
    let url = format!("{}?{}", target.url(AGENTS_PATH), query.to_query_string());
    let result = client.get(&url, &headers(target)).await;
    let response = record_transport(checks, LIST_STATUS_IS_200, Step::List, result)?;

    checks.record(LIST_STATUS_IS_200, response.status == 200);
    checks.record(
        LIST_IS_NON_EMPTY,
        list_len(&response.body).is_some_and(|len| len > 0),
    );

    Ok(())
}

/// Run the four steps in order. Failed checks are recorded and never end the iteration early, only
/// a step that gets no response does.
pub async fn run_iteration<R: Rng + ?Sized>(
    client: &dyn HttpClient,
    target: &TargetConfig,
    checks: &CheckRecorder,
    state: &mut IterationState,
    rng: &mut R,
) -> Result<(), StepError> {
    ping(client, target, checks).await?;
    create_agent(client, target, checks, state, rng).await?;
    read_back(client, target, checks, state).await?;
    list_agents(client, target, checks, rng).await?;

    Ok(())
}
