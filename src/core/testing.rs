//! Fakes and fixtures shared by unit tests.

use crate::core::error::Result;
use crate::core::io::{InputSource, OutputSink};
use crate::core::models::{Fields, Identity, LookupInputs, LookupResult, Record, RunSummary, WorkUnit};
use crate::core::pipeline::ConfirmationGate;
use crate::core::record_store::RecordStore;
use crate::lookup::{Lookup, LookupService, RemoteResponse, RequestSpec, Sleeper, Transport, TransportError};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => Record::from_map(map),
        other => panic!("test records must be objects, got {}", other),
    }
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("test fields must be an object, got {}", other),
    }
}

/// Four already enriched, one with no usable input, five eligible.
pub fn ten_records() -> Vec<Record> {
    vec![
        record(json!({"website": "alpha.test", "email": "a@alpha.test"})),
        record(json!({"website": "bravo.test"})),
        record(json!({"company_website": "https://charlie.test/about"})),
        record(json!({"website": "delta.test", "Email": "d@delta.test"})),
        record(json!({"notes": "walk-in, no site"})),
        record(json!({"domain": "www.echo.test"})),
        record(json!({"website": "foxtrot.test", "contact_email": "f@foxtrot.test"})),
        record(json!({"companyWebsite": "golf.test"})),
        record(json!({"website": "hotel.test", "email": ["h@hotel.test"]})),
        record(json!({"website": "india.test", "phone": "555-0109"})),
    ]
}

pub fn ten_record_store() -> RecordStore {
    RecordStore::new("leads.json", ten_records(), "_row_id")
}

pub fn unit_for(domain: &str) -> WorkUnit {
    WorkUnit {
        identity: Identity::from_key(domain),
        position: 0,
        inputs: LookupInputs {
            website: Some(format!("https://{}/", domain)),
            domain: Some(domain.to_string()),
            company_name: None,
        },
    }
}

pub fn units_for(n: usize) -> Vec<WorkUnit> {
    (0..n)
        .map(|i| WorkUnit {
            identity: Identity::from_position(i),
            position: i,
            inputs: LookupInputs {
                website: Some(format!("https://lead{}.test/", i)),
                domain: Some(format!("lead{}.test", i)),
                company_name: None,
            },
        })
        .collect()
}

/// Deterministic success naming the unit it was produced for.
pub fn echo_result(unit: &WorkUnit) -> LookupResult {
    let target = unit.inputs.domain.as_deref().unwrap_or("unknown.test");
    LookupResult::success(fields(json!({
        "echo_identity": unit.identity.as_str(),
        "email": format!("contact@{}", target),
    })))
}

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// Replays canned transport results in order.
pub struct ScriptedService {
    script: Mutex<VecDeque<std::result::Result<RemoteResponse, TransportError>>>,
    calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(script: Vec<std::result::Result<RemoteResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, _unit: &WorkUnit) -> std::result::Result<RemoteResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
    }

    fn interpret(&self, _unit: &WorkUnit, body: &str) -> LookupResult {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) if map.is_empty() => LookupResult::not_found(),
            Ok(Value::Object(map)) => LookupResult::success(map),
            Ok(_) => LookupResult::permanent("unexpected body shape"),
            Err(e) => LookupResult::permanent(format!("malformed body: {}", e)),
        }
    }
}

/// Always answers with the same result.
pub struct FixedLookup {
    result: LookupResult,
    calls: AtomicUsize,
}

impl FixedLookup {
    pub fn new(result: LookupResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for FixedLookup {
    async fn lookup(&self, _unit: &WorkUnit) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

#[derive(Default)]
pub struct EchoLookup {
    calls: AtomicUsize,
    phone: Option<String>,
}

impl EchoLookup {
    pub fn with_phone(phone: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            phone: Some(phone.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for EchoLookup {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut result = echo_result(unit);
        if let (LookupResult::Success { fields }, Some(phone)) = (&mut result, &self.phone) {
            fields.insert("phone".into(), json!(phone));
        }
        result
    }
}

/// Counts how many lookups overlap. Each call holds its slot for 10ms.
#[derive(Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    cancel_on_first: Option<CancellationToken>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_on_first_call(mut self, token: CancellationToken) -> Self {
        self.cancel_on_first = Some(token);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for ConcurrencyGauge {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(ref token) = self.cancel_on_first {
                token.cancel();
            }
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        echo_result(unit)
    }
}

/// Panics for one identity, echoes for the rest.
pub struct PanicOn(pub Identity);

#[async_trait]
impl Lookup for PanicOn {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        if unit.identity == self.0 {
            panic!("lookup exploded for {}", unit.identity);
        }
        echo_result(unit)
    }
}

/// Echoes, but the first call replaces the checkpoint directory with a
/// regular file so every later flush fails.
pub struct BreakDirOnCall {
    dir: PathBuf,
    calls: AtomicUsize,
}

impl BreakDirOnCall {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for BreakDirOnCall {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::fs::remove_dir_all(&self.dir).unwrap();
            std::fs::write(&self.dir, "").unwrap();
        }
        echo_result(unit)
    }
}

/// Echoes until the n-th call, which never returns.
pub struct HangOnCall {
    hang_on: usize,
    calls: AtomicUsize,
    reached: Notify,
}

impl HangOnCall {
    pub fn new(hang_on: usize) -> Self {
        Self {
            hang_on,
            calls: AtomicUsize::new(0),
            reached: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once the hanging call has started.
    pub async fn reached(&self) {
        self.reached.notified().await
    }
}

#[async_trait]
impl Lookup for HangOnCall {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.hang_on {
            self.reached.notify_one();
            return futures::future::pending::<LookupResult>().await;
        }
        echo_result(unit)
    }
}

pub struct FixedGate {
    answer: bool,
    seen: Mutex<Option<RunSummary>>,
}

impl FixedGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            seen: Mutex::new(None),
        }
    }

    pub fn seen(&self) -> Option<RunSummary> {
        self.seen.lock().clone()
    }
}

impl ConfirmationGate for FixedGate {
    fn confirm(&self, summary: &RunSummary) -> bool {
        *self.seen.lock() = Some(summary.clone());
        self.answer
    }
}

pub struct MemorySource {
    id: String,
    records: Vec<Record>,
    loads: AtomicUsize,
}

impl MemorySource {
    pub fn new(id: &str, records: Vec<Record>) -> Self {
        Self {
            id: id.to_string(),
            records,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl InputSource for MemorySource {
    fn source_id(&self) -> String {
        self.id.clone()
    }

    fn load(&self) -> Result<Vec<Record>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

pub struct MemorySink {
    id: String,
    emitted: Mutex<Option<Vec<Record>>>,
}

impl MemorySink {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            emitted: Mutex::new(None),
        }
    }

    pub fn emitted(&self) -> Option<Vec<Record>> {
        self.emitted.lock().clone()
    }
}

impl OutputSink for MemorySink {
    fn destination_id(&self) -> String {
        self.id.clone()
    }

    fn emit(&self, records: &[Record]) -> Result<()> {
        *self.emitted.lock() = Some(records.to_vec());
        Ok(())
    }
}

/// Answers by method and URL, then by URL alone; the last queued response
/// repeats. Unreachable URLs fail to connect and unknown URLs get a 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, VecDeque<RemoteResponse>>>,
    unreachable: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RequestSpec>>,
}

impl RoutedTransport {
    pub fn route(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.push(url.to_string(), RemoteResponse::new(status, body))
    }

    pub fn route_method(self, method: reqwest::Method, url: &str, status: u16) -> Self {
        self.push(format!("{} {}", method, url), RemoteResponse::new(status, ""))
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.unreachable.lock().insert(url.to_string());
        self
    }

    fn push(self, key: String, response: RemoteResponse) -> Self {
        self.routes.lock().entry(key).or_default().push_back(response);
        self
    }

    pub fn requests_to(&self, url: &str) -> Vec<RequestSpec> {
        self.requests.lock().iter().filter(|r| r.url == url).cloned().collect()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn send(&self, spec: &RequestSpec) -> std::result::Result<RemoteResponse, TransportError> {
        self.requests.lock().push(spec.clone());
        if self.unreachable.lock().contains(&spec.url) {
            return Err(TransportError::Connect(format!("{} refused", spec.url)));
        }
        let mut routes = self.routes.lock();
        let keyed = format!("{} {}", spec.method, spec.url);
        let key = if routes.contains_key(&keyed) { keyed } else { spec.url.clone() };
        let response = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| RemoteResponse::new(404, "")))
    }
}
