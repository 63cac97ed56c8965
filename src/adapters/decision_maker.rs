//! Decision-maker discovery: the about/legal page extractors, a web search
//! source and a people search source, stacked into a waterfall.

use super::{required, Credentials};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::models::{Fields, Identity, LookupResult, WorkUnit};
use crate::lookup::{
    CallOutcome, Caller, HttpTransport, Lookup, RequestSpec, Sleeper, TokioSleeper, Transport, Waterfall,
    WaterfallStep, CONFIDENCE_FIELD,
};
use crate::utils::html::{clean_text, find_candidate_pages, truncate_chars};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use url::Url;

/// Most senior first; the position doubles as the ranking.
pub const DECISION_TITLES: &[&str] = &[
    "owner",
    "founder",
    "ceo",
    "president",
    "managing director",
    "managing partner",
    "principal",
    "director",
    "partner",
    "coo",
    "cfo",
    "cto",
    "cmo",
    "cio",
    "general manager",
    "gm",
];

const MAX_PAGE_CHARS: usize = 6000;

const EXTRACT_SYSTEM_PROMPT: &str =
    "Extract the most likely decision maker (owner/founder/executive) from the text. Return JSON only.";

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid json object pattern"));

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Index of the most senior decision title found in `title`, matched on
/// whole words.
pub fn title_rank(title: &str) -> Option<usize> {
    let words = words(title);
    DECISION_TITLES.iter().position(|candidate| {
        let needle: Vec<&str> = candidate.split(' ').collect();
        words
            .windows(needle.len())
            .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
    })
}

pub fn is_decision_title(title: &str) -> bool {
    title_rank(title).is_some()
}

/// A person some source believes runs the company.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Candidate {
    pub name: String,
    pub title: Option<String>,
    pub linkedin: Option<String>,
    pub company_linkedin: Option<String>,
    pub confidence: Option<f64>,
}

impl Candidate {
    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("decision_maker_name".to_string(), Value::String(self.name));
        let optional = [
            ("decision_maker_title", self.title),
            ("decision_maker_linkedin", self.linkedin),
            ("company_linkedin", self.company_linkedin),
        ];
        for (key, value) in optional {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                fields.insert(key.to_string(), Value::String(v));
            }
        }
        if let Some(confidence) = self.confidence {
            fields.insert(CONFIDENCE_FIELD.to_string(), json!(confidence));
        }
        fields
    }
}

/// `Err` carries a lookup result to hand back as is (a failure or a miss).
pub(crate) type Found = std::result::Result<Option<Candidate>, LookupResult>;

fn finish(found: Found) -> LookupResult {
    match found {
        Ok(Some(candidate)) => LookupResult::success(candidate.into_fields()),
        Ok(None) => LookupResult::not_found(),
        Err(result) => result,
    }
}

fn best_candidate(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().min_by_key(|c| {
        c.title
            .as_deref()
            .and_then(title_rank)
            .unwrap_or(DECISION_TITLES.len())
    })
}

fn company_label(unit: &WorkUnit) -> Option<&str> {
    unit.inputs
        .company_name
        .as_deref()
        .or(unit.inputs.domain.as_deref())
}

fn text_of(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One transport plus the retry/rate-limit contract, shared by every source.
#[derive(Clone)]
pub(crate) struct Remote {
    transport: Arc<dyn Transport>,
    caller: Caller,
}

impl Remote {
    pub(crate) fn new(transport: Arc<dyn Transport>, caller: Caller) -> Self {
        Self { transport, caller }
    }

    async fn fetch(&self, label: &str, spec: RequestSpec) -> CallOutcome {
        let transport = &self.transport;
        let spec = &spec;
        self.caller.execute(label, move || transport.send(spec)).await
    }

    async fn fetch_text(&self, label: &str, spec: RequestSpec) -> std::result::Result<String, LookupResult> {
        match self.fetch(label, spec).await {
            CallOutcome::Completed(response) => Ok(response.body),
            other => Err(other.into_lookup_result(|_| LookupResult::not_found())),
        }
    }

    async fn fetch_json(&self, label: &str, spec: RequestSpec) -> std::result::Result<Value, LookupResult> {
        let body = self.fetch_text(label, spec).await?;
        serde_json::from_str(&body).map_err(|e| LookupResult::permanent(format!("malformed {} body: {}", label, e)))
    }
}

/// Reads the extraction object out of a model reply, tolerating prose
/// around the JSON.
pub(crate) fn parse_extraction(content: &str) -> Option<Candidate> {
    let value: Value = serde_json::from_str(content).ok().or_else(|| {
        JSON_OBJECT
            .find(content)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    })?;
    let name = text_of(value.get("name"))?;
    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .map(|c| c.clamp(0.0, 1.0));
    Some(Candidate {
        name,
        title: text_of(value.get("title")),
        confidence,
        ..Candidate::default()
    })
}

/// Unwraps a chat completion body down to the extraction.
pub(crate) fn parse_chat_reply(body: &str) -> Found {
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| LookupResult::permanent(format!("malformed chat body: {}", e)))?;
    let content = parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| LookupResult::permanent("chat reply has no message content"))?;
    Ok(parse_extraction(content))
}

/// Asks a chat-completions model to pick the decision maker out of page text.
pub struct ChatExtractor {
    remote: Remote,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatExtractor {
    pub(crate) fn new(remote: Remote, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            remote,
            endpoint,
            api_key,
            model,
        }
    }

    fn request(&self, company: &str, source: &str, text: &str) -> RequestSpec {
        let prompt = format!(
            "Company: {}\nSource: {}\nReturn JSON with keys: name, title, confidence (0-1), reason. \
             If no decision maker is found, return name as empty string.\n\nText:\n{}",
            company,
            source,
            truncate_chars(text, MAX_PAGE_CHARS)
        );
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": EXTRACT_SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
        });
        RequestSpec::post_json(&self.endpoint, payload).header("Authorization", format!("Bearer {}", self.api_key))
    }

    pub(crate) async fn extract(&self, company: &str, source: &str, text: &str) -> Found {
        let label = format!("chat {}", company);
        let body = self.remote.fetch_text(&label, self.request(company, source, text)).await?;
        parse_chat_reply(&body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    About,
    Legal,
}

impl PageKind {
    fn prompt_label(&self) -> &'static str {
        match self {
            PageKind::About => "about/contact",
            PageKind::Legal => "terms/legal",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CandidatePages {
    about: Vec<String>,
    legal: Vec<String>,
}

#[derive(Default)]
struct LinkCache {
    entries: HashMap<Identity, CandidatePages>,
    order: VecDeque<Identity>,
}

/// Homepage links per unit, fetched once and shared by the about and legal
/// page sources. Holds at most `capacity` units; the oldest is evicted first.
pub(crate) struct HomepageLinks {
    remote: Remote,
    capacity: usize,
    cache: Mutex<LinkCache>,
}

impl HomepageLinks {
    pub(crate) fn new(remote: Remote, capacity: usize) -> Self {
        Self {
            remote,
            capacity: capacity.max(1),
            cache: Mutex::new(LinkCache::default()),
        }
    }

    async fn pages(&self, unit: &WorkUnit, base: &Url, website: &str) -> std::result::Result<CandidatePages, LookupResult> {
        let cached = self.cache.lock().entries.get(&unit.identity).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let homepage = self.remote.fetch_text(&unit.label(), RequestSpec::get(website)).await?;
        let (about, legal) = find_candidate_pages(base, &homepage);
        let pages = CandidatePages { about, legal };

        let mut cache = self.cache.lock();
        if cache.entries.insert(unit.identity.clone(), pages.clone()).is_none() {
            cache.order.push_back(unit.identity.clone());
        }
        while cache.order.len() > self.capacity {
            if let Some(oldest) = cache.order.pop_front() {
                cache.entries.remove(&oldest);
            }
        }
        Ok(pages)
    }
}

/// Follows links from the homepage to about or legal pages and runs the
/// extractor over each until one names someone.
pub struct PageSource {
    kind: PageKind,
    max_pages: usize,
    homepage: Arc<HomepageLinks>,
    remote: Remote,
    extractor: Arc<ChatExtractor>,
}

impl PageSource {
    pub(crate) fn new(
        kind: PageKind,
        max_pages: usize,
        homepage: Arc<HomepageLinks>,
        remote: Remote,
        extractor: Arc<ChatExtractor>,
    ) -> Self {
        Self {
            kind,
            max_pages,
            homepage,
            remote,
            extractor,
        }
    }

    async fn find(&self, unit: &WorkUnit) -> Found {
        let Some(website) = unit.inputs.website.as_deref() else {
            return Ok(None);
        };
        let base = Url::parse(website).map_err(|e| LookupResult::permanent(format!("bad website '{}': {}", website, e)))?;
        let label = unit.label();
        let found = self.homepage.pages(unit, &base, website).await?;
        let pages = match self.kind {
            PageKind::About => found.about,
            PageKind::Legal => found.legal,
        };
        if pages.is_empty() {
            tracing::debug!(target: "waterfall", "[{}] No {} pages linked", label, self.kind.prompt_label());
            return Ok(None);
        }

        let company = company_label(unit).unwrap_or("Unknown");
        let mut answered = false;
        let mut last_failure: Option<LookupResult> = None;
        for page in pages.into_iter().take(self.max_pages) {
            let html = match self.remote.fetch_text(&label, RequestSpec::get(&page)).await {
                Ok(html) => html,
                Err(result) => {
                    tracing::debug!(target: "waterfall", "[{}] Skipping page {}: {:?}", label, page, result);
                    continue;
                }
            };
            let text = clean_text(&html);
            if text.is_empty() {
                continue;
            }
            match self.extractor.extract(company, self.kind.prompt_label(), &text).await {
                Ok(Some(candidate)) => return Ok(Some(candidate)),
                Ok(None) => answered = true,
                Err(failure) => last_failure = Some(failure),
            }
        }
        match last_failure {
            Some(failure) if !answered => Err(failure),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Lookup for PageSource {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        finish(self.find(unit).await)
    }
}

/// Person candidates (`linkedin.com/in` results titled "Name - Role") that
/// hold a decision title, plus the first company page seen.
pub(crate) fn parse_search_items(items: &[Value]) -> (Vec<Candidate>, Option<String>) {
    let mut candidates = Vec::new();
    let mut company_linkedin = None;
    for item in items {
        let Some(url) = text_of(item.get("url")) else {
            continue;
        };
        if url.contains("linkedin.com/company") {
            company_linkedin.get_or_insert(url);
            continue;
        }
        if !url.contains("linkedin.com/in") {
            continue;
        }
        let title = text_of(item.get("title")).unwrap_or_default();
        let parts: Vec<&str> = title.split(" - ").map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 || !is_decision_title(parts[1]) {
            continue;
        }
        candidates.push(Candidate {
            name: parts[0].to_string(),
            title: Some(parts[1].to_string()),
            linkedin: Some(url),
            ..Candidate::default()
        });
    }
    (candidates, company_linkedin)
}

/// Items of a finished task, `None` while it is still queued.
fn ready_items(body: &Value) -> Option<Vec<Value>> {
    let result = body.pointer("/tasks/0/result")?.as_array()?;
    Some(
        result
            .first()
            .and_then(|r| r.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    )
}

/// Organic web search run as a posted task that is polled until ready.
pub struct SearchSource {
    remote: Remote,
    endpoint: String,
    login: String,
    password: String,
    poll_attempts: u32,
    poll_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl SearchSource {
    pub(crate) fn new(remote: Remote, endpoint: String, login: String, password: String) -> Self {
        Self {
            remote,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            login,
            password,
            poll_attempts: 10,
            poll_interval: Duration::from_secs(2),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub(crate) fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts.max(1);
        self.poll_interval = interval;
        self
    }

    pub(crate) fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn keyword(company: &str) -> String {
        format!("\"{}\" owner OR founder OR CEO linkedin", company)
    }

    async fn find(&self, unit: &WorkUnit) -> Found {
        let Some(company) = company_label(unit) else {
            return Ok(None);
        };
        let label = format!("search {}", unit.label());
        let payload = json!([{
            "keyword": Self::keyword(company),
            "location_name": "United States",
            "language_name": "English",
            "device": "desktop",
            "depth": 10,
        }]);
        let post = RequestSpec::post_json(format!("{}/task_post", self.endpoint), payload)
            .basic_auth(&self.login, &self.password);
        let created = self.remote.fetch_json(&label, post).await?;
        let task_id = text_of(created.pointer("/tasks/0/id"))
            .ok_or_else(|| LookupResult::permanent("search task was not created"))?;
        tracing::debug!(target: "waterfall", "[{}] Search task {} posted", label, task_id);

        for attempt in 1..=self.poll_attempts {
            self.sleeper.sleep(self.poll_interval).await;
            let get = RequestSpec::get(format!("{}/task_get/advanced/{}", self.endpoint, task_id))
                .basic_auth(&self.login, &self.password);
            let body = self.remote.fetch_json(&label, get).await?;
            if let Some(items) = ready_items(&body) {
                let (candidates, company_linkedin) = parse_search_items(&items);
                tracing::debug!(target: "waterfall",
                    "[{}] Search ready after {} polls: {} items, {} candidates", label, attempt, items.len(), candidates.len());
                return Ok(best_candidate(candidates).map(|mut c| {
                    c.company_linkedin = company_linkedin;
                    c
                }));
            }
        }
        Err(LookupResult::transient(format!(
            "search task {} not ready after {} polls",
            task_id, self.poll_attempts
        )))
    }
}

#[async_trait]
impl Lookup for SearchSource {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        finish(self.find(unit).await)
    }
}

fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text_of(item.get(*k)))
}

pub(crate) fn parse_person(item: &Value) -> Option<Candidate> {
    let name = first_text(item, &["name", "fullName", "full_name"])?;
    Some(Candidate {
        name,
        title: first_text(item, &["title", "headline", "position", "jobTitle"]),
        linkedin: first_text(item, &["profileUrl", "linkedinUrl", "profile_url", "url"]),
        ..Candidate::default()
    })
}

/// People of a search response that hold a decision title.
pub(crate) fn parse_people(body: &Value) -> Vec<Candidate> {
    let items = match body {
        Value::Array(items) => Some(items),
        Value::Object(obj) => ["data", "items", "results"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array)),
        _ => None,
    };
    items
        .into_iter()
        .flatten()
        .filter_map(parse_person)
        .filter(|c| c.title.as_deref().is_some_and(is_decision_title))
        .collect()
}

/// Professional-network employee search by company name.
pub struct PeopleSearchSource {
    remote: Remote,
    endpoint: String,
    host: String,
    api_key: String,
}

impl PeopleSearchSource {
    pub(crate) fn new(remote: Remote, endpoint: String, host: String, api_key: String) -> Self {
        Self {
            remote,
            endpoint,
            host,
            api_key,
        }
    }

    fn keywords(company: &str) -> String {
        let titles: Vec<String> = DECISION_TITLES.iter().map(|t| format!("\"{}\"", t)).collect();
        format!("{} {}", company, titles.join(" OR "))
    }

    async fn find(&self, unit: &WorkUnit) -> Found {
        let Some(company) = company_label(unit) else {
            return Ok(None);
        };
        let label = format!("people {}", unit.label());
        let request = RequestSpec::get(&self.endpoint)
            .header("x-rapidapi-host", &self.host)
            .header("x-rapidapi-key", &self.api_key)
            .query("keywords", Self::keywords(company))
            .query("start", "0");
        let body = self.remote.fetch_json(&label, request).await?;
        Ok(best_candidate(parse_people(&body)))
    }
}

#[async_trait]
impl Lookup for PeopleSearchSource {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        finish(self.find(unit).await)
    }
}

/// About pages, then legal pages, then web search, then people search.
pub fn build_waterfall(
    config: &Config,
    credentials: &Credentials,
    transport: HttpTransport,
    caller: Caller,
) -> Result<Waterfall> {
    let remote = Remote::new(Arc::new(transport), caller);
    let extractor = Arc::new(ChatExtractor::new(
        remote.clone(),
        config.chat_endpoint.clone(),
        required(&credentials.openai_api_key, "OPENAI_API_KEY")?,
        config.chat_model.clone(),
    ));
    let search = SearchSource::new(
        remote.clone(),
        config.search_endpoint.clone(),
        required(&credentials.search_login, "DATAFORSEO_LOGIN")?,
        required(&credentials.search_password, "DATAFORSEO_PASSWORD")?,
    )
    .with_polling(config.search_poll_attempts, config.search_poll_interval);
    let people = PeopleSearchSource::new(
        remote.clone(),
        config.people_search_endpoint.clone(),
        config.people_search_host.clone(),
        required(&credentials.people_search_key, "RAPIDAPI_KEY")?,
    );

    // Units in flight never exceed the concurrency limit.
    let homepage = Arc::new(HomepageLinks::new(remote.clone(), config.max_concurrency * 2));

    let steps = vec![
        WaterfallStep::new(
            "about_page",
            Arc::new(PageSource::new(
                PageKind::About,
                config.max_about_pages,
                homepage.clone(),
                remote.clone(),
                extractor.clone(),
            )),
            config.about_page_confidence,
        ),
        WaterfallStep::new(
            "terms_page",
            Arc::new(PageSource::new(PageKind::Legal, config.max_legal_pages, homepage, remote, extractor)),
            config.legal_page_confidence,
        ),
        WaterfallStep::new("linkedin_search", Arc::new(search), config.search_confidence),
        WaterfallStep::new("linkedin_people", Arc::new(people), config.people_search_confidence),
    ];
    Ok(Waterfall::new(steps, config.confidence_threshold)
        .with_output_keys("decision_maker_source", "decision_maker_confidence"))
}
