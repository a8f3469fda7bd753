use std::time::Duration;

use agent_crud::{
    random_ipv4, run_iteration, ListQuery, Step, AGENT_ID_EXTRACTED, AGENT_ID_KEY,
    CREATE_STATUS_IS_201, GET_STATUS_IS_200, LIST_IS_NON_EMPTY, LIST_STATUS_IS_200,
    PING_SUCCEEDED,
};
use async_trait::async_trait;
use http_client_instrumented::prelude::{HttpClient, HttpResponse, TransportError};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use surge_runner::prelude::{CheckRecorder, CheckTally, IterationState, TargetConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    method: &'static str,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

#[derive(Debug, Clone)]
enum Canned {
    Respond(u16, &'static str),
    Refuse,
}

impl Canned {
    fn to_result(&self, url: &str) -> Result<HttpResponse, TransportError> {
        match self {
            Canned::Respond(status, body) => Ok(HttpResponse::new(*status, *body)),
            Canned::Refuse => Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Routes requests to canned responses and remembers every call.
#[derive(Debug)]
struct MockHttpClient {
    ping: Canned,
    create: Canned,
    get: Canned,
    list: Canned,
    calls: Mutex<Vec<Call>>,
}

impl MockHttpClient {
    fn healthy() -> Self {
        Self {
            ping: Canned::Respond(200, r#"{"message":"pong"}"#),
            create: Canned::Respond(201, r#"{"agent":{"id":"abc123"}}"#),
            get: Canned::Respond(200, r#"{"agent":{"id":"abc123"}}"#),
            list: Canned::Respond(200, r#"{"data":{"agents":[{"id":"abc123"}]}}"#),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, method: &'static str, url: &str, headers: &[(&str, &str)], body: Option<String>) {
        self.calls.lock().push(Call {
            method,
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        });
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        self.record("GET", url, headers, None);

        let canned = if url.ends_with("/api/v1/health/ping") {
            &self.ping
        } else if url.contains('?') {
            &self.list
        } else {
            &self.get
        };
        canned.to_result(url)
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        self.record("POST", url, headers, Some(body));
        self.create.to_result(url)
    }
}

fn target() -> TargetConfig {
    TargetConfig {
        base_url: "http://api.test".to_string(),
        api_key: "secret".to_string(),
        request_timeout: Duration::from_secs(1),
    }
}

fn tally(passes: u64, fails: u64) -> Option<CheckTally> {
    Some(CheckTally { passes, fails })
}

async fn iterate(client: &MockHttpClient, checks: &CheckRecorder) -> (IterationState, Result<(), Step>) {
    let mut state = IterationState::default();
    let mut rng = StdRng::seed_from_u64(7);
    let result = run_iteration(client, &target(), checks, &mut state, &mut rng)
        .await
        .map_err(|e| e.step);
    (state, result)
}

#[tokio::test]
async fn full_iteration_runs_every_step_in_order() {
    let client = MockHttpClient::healthy();
    let checks = CheckRecorder::new();

    let (state, result) = iterate(&client, &checks).await;

    assert_eq!(Ok(()), result);
    assert_eq!(Some("abc123"), state.get_str(AGENT_ID_KEY));

    let calls = client.calls();
    let methods = calls.iter().map(|c| c.method).collect::<Vec<_>>();
    assert_eq!(vec!["GET", "POST", "GET", "GET"], methods);
    assert_eq!("http://api.test/api/v1/health/ping", calls[0].url);
    assert_eq!("http://api.test/api/v1/agents", calls[1].url);
    assert!(calls[3].url.starts_with("http://api.test/api/v1/agents?page="));
    assert!(calls[3].url.contains("sort_by=id"));

    for call in &calls {
        assert!(call
            .headers
            .contains(&("API-Key".to_string(), "secret".to_string())));
        assert!(call
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    let body: serde_json::Value = serde_json::from_str(calls[1].body.as_deref().unwrap()).unwrap();
    let ip = body["ip_address"].as_str().unwrap();
    assert_eq!(4, ip.split('.').count());

    let summary = checks.snapshot();
    for name in [
        PING_SUCCEEDED,
        CREATE_STATUS_IS_201,
        AGENT_ID_EXTRACTED,
        GET_STATUS_IS_200,
        LIST_STATUS_IS_200,
        LIST_IS_NON_EMPTY,
    ] {
        assert_eq!(tally(1, 0), summary.get(name), "{name}");
    }
}

#[tokio::test]
async fn read_back_targets_the_created_agent() {
    let client = MockHttpClient::healthy();
    let checks = CheckRecorder::new();

    iterate(&client, &checks).await.1.unwrap();

    assert_eq!("http://api.test/api/v1/agents/abc123", client.calls()[2].url);
}

#[tokio::test]
async fn read_back_escapes_the_agent_id() {
    let mut client = MockHttpClient::healthy();
    client.create = Canned::Respond(201, r#"{"agent":{"id":"a/b c"}}"#);
    let checks = CheckRecorder::new();

    iterate(&client, &checks).await.1.unwrap();

    assert_eq!("http://api.test/api/v1/agents/a%2Fb%20c", client.calls()[2].url);
    assert_eq!(tally(1, 0), checks.snapshot().get(GET_STATUS_IS_200));
}

#[tokio::test]
async fn numeric_agent_id_is_read_back() {
    let mut client = MockHttpClient::healthy();
    client.create = Canned::Respond(201, r#"{"agent":{"id":18446744073709551615}}"#);
    let checks = CheckRecorder::new();

    let (state, result) = iterate(&client, &checks).await;

    assert_eq!(Ok(()), result);
    assert_eq!(Some("18446744073709551615"), state.get_str(AGENT_ID_KEY));
    assert_eq!(
        "http://api.test/api/v1/agents/18446744073709551615",
        client.calls()[2].url
    );
}

#[tokio::test]
async fn missing_agent_id_skips_the_read_back() {
    let mut client = MockHttpClient::healthy();
    client.create = Canned::Respond(201, r#"{"message":"created"}"#);
    let checks = CheckRecorder::new();

    let (state, result) = iterate(&client, &checks).await;

    assert_eq!(Ok(()), result);
    assert_eq!(None, state.get(AGENT_ID_KEY));

    let calls = client.calls();
    assert_eq!(3, calls.len());
    assert!(calls[2].url.contains('?'), "expected the list call, got {}", calls[2].url);

    let summary = checks.snapshot();
    assert_eq!(tally(1, 0), summary.get(CREATE_STATUS_IS_201));
    assert_eq!(tally(0, 1), summary.get(AGENT_ID_EXTRACTED));
    assert_eq!(None, summary.get(GET_STATUS_IS_200));
    assert_eq!(tally(1, 0), summary.get(LIST_STATUS_IS_200));
}

#[tokio::test]
async fn failed_checks_do_not_stop_the_iteration() {
    let mut client = MockHttpClient::healthy();
    client.ping = Canned::Respond(503, "unavailable");
    client.create = Canned::Respond(400, r#"{"error":"bad request"}"#);
    client.list = Canned::Respond(404, r#"{"message":"no agents found"}"#);
    let checks = CheckRecorder::new();

    let (_, result) = iterate(&client, &checks).await;

    assert_eq!(Ok(()), result);
    assert_eq!(3, client.calls().len());

    let summary = checks.snapshot();
    assert_eq!(tally(1, 0), summary.get(PING_SUCCEEDED));
    assert_eq!(tally(0, 1), summary.get(CREATE_STATUS_IS_201));
    assert_eq!(tally(0, 1), summary.get(LIST_STATUS_IS_200));
    assert_eq!(tally(0, 1), summary.get(LIST_IS_NON_EMPTY));
}

#[tokio::test]
async fn transport_error_on_ping_aborts_the_iteration() {
    let mut client = MockHttpClient::healthy();
    client.ping = Canned::Refuse;
    let checks = CheckRecorder::new();

    let (_, result) = iterate(&client, &checks).await;

    assert_eq!(Err(Step::Ping), result);
    assert_eq!(1, client.calls().len());
    assert_eq!(tally(0, 1), checks.snapshot().get(PING_SUCCEEDED));
    assert_eq!(None, checks.snapshot().get(CREATE_STATUS_IS_201));
}

#[tokio::test]
async fn transport_error_on_read_back_skips_the_list() {
    let mut client = MockHttpClient::healthy();
    client.get = Canned::Refuse;
    let checks = CheckRecorder::new();

    let (_, result) = iterate(&client, &checks).await;

    assert_eq!(Err(Step::ReadBack), result);
    assert_eq!(3, client.calls().len());
    assert_eq!(tally(0, 1), checks.snapshot().get(GET_STATUS_IS_200));
    assert_eq!(None, checks.snapshot().get(LIST_STATUS_IS_200));
}

#[test]
fn random_ipv4_has_four_octets() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..1_000 {
        let ip = random_ipv4(&mut rng);
        let octets = ip.split('.').collect::<Vec<_>>();
        assert_eq!(4, octets.len(), "{ip}");
        for octet in octets {
            // Parsing as u8 proves the octet is in [0, 255]
            octet.parse::<u8>().unwrap();
        }
    }
}

#[test]
fn random_list_query_stays_in_range() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut orders = std::collections::HashSet::new();

    for _ in 0..1_000 {
        let query = ListQuery::random(&mut rng);
        assert!((1..=10).contains(&query.page));
        assert!((1..=20).contains(&query.page_size));
        assert_eq!("id", query.sort_by);
        orders.insert(query.order.as_str());
    }

    assert_eq!(2, orders.len());
}
