//! The behavior-override engine for server creation.
//!
//! Test authors inject custom, criteria-matched creation behaviors through a
//! [`BehaviorRegistry`], or force one directly through magic metadata keys on
//! the request (see [`metadata_override`]). Everything here is registered
//! imperatively at setup; there are no load-time side effects.

use std::{collections::HashMap, rc::Rc, time::Duration};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    collection::RegionalServerCollection,
    error::BehaviorError,
    request::CreateServerRequest,
    response::{status, ApiResponse, UrlResolver},
    server::ServerStatus,
};

/// A creation behavior: the observable effect of handling one simulated
/// creation request (status code, payload, entity mutation).
pub type CreateBehavior =
    Rc<dyn Fn(&mut RegionalServerCollection, &CreateServerRequest, &UrlResolver) -> ApiResponse>;

/// Turns a criterion configuration value into a [`Criterion`].
type CriterionFactory = Box<dyn Fn(&Value) -> Result<Criterion, BehaviorError>>;

/// Turns a parameter bundle into an executable behavior.
type BehaviorFactory = Box<dyn Fn(&Map<String, Value>) -> Result<CreateBehavior, BehaviorError>>;

/// Post-creation tweak applied to a freshly created server, identified by id.
type CreationHook = Rc<dyn Fn(&mut RegionalServerCollection, &str)>;

/// A named predicate over a single extracted request attribute; the atomic
/// unit of matching.
pub struct Criterion {
    name: String,
    predicate: Box<dyn Fn(&Value) -> bool>,
}

impl Criterion {
    /// Creates a criterion from a name and a predicate over the attribute
    /// value extracted under that name.
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The attribute name this criterion inspects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the criterion against an attribute bundle.
    ///
    /// A missing attribute evaluates as `null`, never as an error.
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        let value = attributes.get(&self.name).unwrap_or(&Value::Null);
        (self.predicate)(value)
    }
}

impl std::fmt::Debug for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criterion").field("name", &self.name).finish()
    }
}

/// True if the regex matches starting at the beginning of `text`.
fn match_at_start(regex: &Regex, text: &str) -> bool {
    regex.find(text).is_some_and(|found| found.start() == 0)
}

/// A criterion matching a regular expression against a string attribute.
///
/// Missing attributes and non-string values match against the empty string.
pub fn regex_criterion(
    name: impl Into<String>,
    pattern: &str,
) -> Result<Criterion, BehaviorError> {
    let name = name.into();
    let regex = Regex::new(pattern).map_err(|error| BehaviorError::InvalidPattern {
        criterion: name.clone(),
        detail: error.to_string(),
    })?;
    Ok(Criterion::new(name, move |value| {
        match_at_start(&regex, value.as_str().unwrap_or(""))
    }))
}

/// A criterion matching per-key regular expressions against a metadata
/// mapping.
///
/// Satisfied only if every configured key/value-regex pair matches; missing
/// keys count as matching against the empty string.
pub fn metadata_criterion(pairs: &Map<String, Value>) -> Result<Criterion, BehaviorError> {
    let mut compiled = Vec::with_capacity(pairs.len());
    for (key, pattern) in pairs {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| BehaviorError::InvalidPattern {
                criterion: "metadata".to_string(),
                detail: format!("pattern for key `{key}` must be a string"),
            })?;
        let regex = Regex::new(pattern).map_err(|error| BehaviorError::InvalidPattern {
            criterion: "metadata".to_string(),
            detail: error.to_string(),
        })?;
        compiled.push((key.clone(), regex));
    }
    Ok(Criterion::new("metadata", move |value| {
        let entries = value.as_object();
        compiled.iter().all(|(key, regex)| {
            let text = entries
                .and_then(|map| map.get(key))
                .and_then(Value::as_str)
                .unwrap_or("");
            match_at_start(regex, text)
        })
    }))
}

/// Everything registered for one simulated event type: named criterion
/// factories, named behavior creators, and the single default behavior.
///
/// Populated imperatively at setup (see [`server_creation`]); registries for
/// individual collections are built on top of a shared description.
pub struct EventDescription {
    name: String,
    criteria: HashMap<String, CriterionFactory>,
    creators: HashMap<String, BehaviorFactory>,
    default_behavior: Option<CreateBehavior>,
}

impl EventDescription {
    /// Creates an empty description for the named event type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            criteria: HashMap::new(),
            creators: HashMap::new(),
            default_behavior: None,
        }
    }

    /// The event type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a named criterion factory.
    pub fn register_criterion(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Value) -> Result<Criterion, BehaviorError> + 'static,
    ) {
        self.criteria.insert(name.into(), Box::new(factory));
    }

    /// Registers the default behavior, replacing any previous one. Exactly
    /// one default is expected per event.
    pub fn register_default(&mut self, behavior: CreateBehavior) {
        self.default_behavior = Some(behavior);
    }

    /// Registers a named behavior creator.
    pub fn register_creator(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Map<String, Value>) -> Result<CreateBehavior, BehaviorError> + 'static,
    ) {
        self.creators.insert(name.into(), Box::new(factory));
    }

    /// Builds a criterion through the named factory.
    pub fn criterion(&self, name: &str, value: &Value) -> Result<Criterion, BehaviorError> {
        let factory = self
            .criteria
            .get(name)
            .ok_or_else(|| BehaviorError::UnknownCriterion(name.to_string()))?;
        factory(value)
    }

    /// Instantiates a behavior through the named creator.
    ///
    /// Misconfigured parameters fail here, at creation time, rather than
    /// producing confusing behavior at dispatch time.
    pub fn create_behavior(
        &self,
        creator: &str,
        parameters: &Map<String, Value>,
    ) -> Result<CreateBehavior, BehaviorError> {
        let factory = self
            .creators
            .get(creator)
            .ok_or_else(|| BehaviorError::UnknownCreator(creator.to_string()))?;
        factory(parameters)
    }

    /// The registered default behavior, if any.
    pub fn default_behavior(&self) -> Option<CreateBehavior> {
        self.default_behavior.clone()
    }
}

impl std::fmt::Debug for EventDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDescription")
            .field("name", &self.name)
            .field("criteria", &self.criteria.keys())
            .field("creators", &self.creators.keys())
            .finish()
    }
}

struct BehaviorEntry {
    criteria: Vec<Criterion>,
    behavior: CreateBehavior,
}

/// An ordered set of registered behaviors for one event type, scoped to one
/// regional collection.
///
/// Dispatch is deterministic first-match-wins: entries are scanned in
/// registration order and the first whose criteria all hold is selected;
/// registration order is the tie-break, not specificity or recency.
pub struct BehaviorRegistry {
    event: Rc<EventDescription>,
    entries: Vec<BehaviorEntry>,
}

impl BehaviorRegistry {
    /// Creates an empty registry for the given event description.
    pub fn new(event: Rc<EventDescription>) -> Self {
        Self {
            event,
            entries: Vec::new(),
        }
    }

    /// The event description this registry dispatches for.
    pub fn event(&self) -> &Rc<EventDescription> {
        &self.event
    }

    /// Appends a behavior qualified by the given criteria.
    pub fn register(&mut self, criteria: Vec<Criterion>, behavior: CreateBehavior) {
        self.entries.push(BehaviorEntry { criteria, behavior });
    }

    /// Selects the behavior for an attribute bundle, falling back to the
    /// event's default behavior when no registered entry matches.
    pub fn behavior_for_attributes(
        &self,
        attributes: &Map<String, Value>,
    ) -> Result<CreateBehavior, BehaviorError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry
                .criteria
                .iter()
                .all(|criterion| criterion.matches(attributes))
            {
                debug!(event = %self.event.name, index, "registered behavior matched");
                return Ok(entry.behavior.clone());
            }
        }
        self.event
            .default_behavior()
            .ok_or_else(|| BehaviorError::NoDefaultBehavior(self.event.name.clone()))
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("event", &self.event.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// The default creation behavior: validate, create, insert, respond 202.
pub fn default_create_behavior() -> CreateBehavior {
    create_with_hook(None)
}

/// The default creation behavior with a post-creation tweak.
///
/// The hook runs after entity construction and collection insertion but
/// before the response payload is produced, so mutations it makes (status,
/// metadata, scheduled transitions) are reflected in the response. Building
/// overrides on top of the default this way guarantees identical addressing,
/// id generation, and response shape regardless of which override is
/// selected.
pub fn default_with_hook(
    hook: impl Fn(&mut RegionalServerCollection, &str) + 'static,
) -> CreateBehavior {
    create_with_hook(Some(Rc::new(hook)))
}

fn create_with_hook(hook: Option<CreationHook>) -> CreateBehavior {
    Rc::new(move |collection, request, absolutize_url| {
        let server_id = match collection.create_server(request) {
            Ok(server_id) => server_id,
            Err(error) => return ApiResponse::fault(status::BAD_REQUEST, &error.to_string()),
        };
        if let Some(hook) = &hook {
            hook(collection, &server_id);
        }
        collection.creation_response(&server_id, absolutize_url)
    })
}

/// A behavior that fails fast with the given code and message; the server is
/// never created or added to the collection.
fn fail_behavior(code: u16, message: String) -> CreateBehavior {
    Rc::new(move |_collection, _request, _absolutize_url| ApiResponse::fault(code, &message))
}

/// A behavior that creates the server in `BUILD` status and schedules the
/// transition to `ACTIVE` after `duration`.
fn building_behavior(duration: Duration) -> CreateBehavior {
    default_with_hook(move |collection, server_id| {
        if let Some(server) = collection.server_by_id_mut(server_id) {
            server.status = ServerStatus::Build;
        }
        collection.schedule_status(server_id, ServerStatus::Active, duration);
    })
}

/// A behavior that creates the server directly in `ERROR` status.
fn error_status_behavior() -> CreateBehavior {
    default_with_hook(|collection, server_id| {
        if let Some(server) = collection.server_by_id_mut(server_id) {
            server.status = ServerStatus::Error;
        }
    })
}

/// The fully populated event description for server creation: the built-in
/// criteria (`server_name`, `metadata`), the default creation behavior, and
/// the `fail`/`build`/`error` behavior creators.
pub fn server_creation() -> Rc<EventDescription> {
    let mut event = EventDescription::new("server_creation");

    event.register_criterion("server_name", |value| {
        let pattern = value.as_str().ok_or_else(|| BehaviorError::InvalidPattern {
            criterion: "server_name".to_string(),
            detail: "pattern must be a string".to_string(),
        })?;
        regex_criterion("server_name", pattern)
    });
    event.register_criterion("metadata", |value| {
        let pairs = value.as_object().ok_or_else(|| BehaviorError::InvalidPattern {
            criterion: "metadata".to_string(),
            detail: "expected an object mapping metadata keys to value patterns".to_string(),
        })?;
        metadata_criterion(pairs)
    });

    event.register_default(default_create_behavior());

    event.register_creator("fail", |parameters| {
        let code = parameters.get("code").and_then(Value::as_u64).unwrap_or(500) as u16;
        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Server creation failed.")
            .to_string();
        Ok(fail_behavior(code, message))
    });
    event.register_creator("build", |parameters| {
        let seconds = parameters
            .get("duration")
            .and_then(Value::as_f64)
            .ok_or_else(|| BehaviorError::MissingParameter {
                creator: "build".to_string(),
                parameter: "duration".to_string(),
            })?;
        let duration =
            Duration::try_from_secs_f64(seconds).map_err(|error| BehaviorError::InvalidParameters {
                creator: "build".to_string(),
                detail: error.to_string(),
            })?;
        Ok(building_behavior(duration))
    });
    event.register_creator("error", |_parameters| Ok(error_status_behavior()));

    Rc::new(event)
}

/// Examines creation-request metadata for the recognized override keys and,
/// if one is present, instantiates the corresponding behavior directly.
///
/// Evaluated in fixed priority order: `create_server_failure`,
/// `server_building`, `server_error`. An override always wins over
/// registered criteria-based behaviors, even when one of those would also
/// match; this is the quick escape hatch available without registering a
/// named behavior.
pub fn metadata_override(
    event: &EventDescription,
    metadata: &HashMap<String, String>,
) -> Result<Option<CreateBehavior>, BehaviorError> {
    if let Some(raw) = metadata.get("create_server_failure") {
        let parameters: Map<String, Value> =
            serde_json::from_str(raw).map_err(|error| BehaviorError::InvalidParameters {
                creator: "fail".to_string(),
                detail: error.to_string(),
            })?;
        return event.create_behavior("fail", &parameters).map(Some);
    }
    if let Some(raw) = metadata.get("server_building") {
        let seconds: f64 = raw.parse().map_err(|_| BehaviorError::InvalidParameters {
            creator: "build".to_string(),
            detail: format!("`{raw}` is not a number of seconds"),
        })?;
        let mut parameters = Map::new();
        parameters.insert("duration".to_string(), seconds.into());
        return event.create_behavior("build", &parameters).map(Some);
    }
    if metadata.contains_key("server_error") {
        return event.create_behavior("error", &Map::new()).map(Some);
    }
    Ok(None)
}

/// The attribute bundle registered criteria are evaluated against.
pub(crate) fn creation_attributes(
    tenant_id: &str,
    request: &CreateServerRequest,
) -> Map<String, Value> {
    let mut attributes = Map::new();
    attributes.insert("tenant_id".to_string(), Value::from(tenant_id));
    attributes.insert(
        "server_name".to_string(),
        Value::from(request.server.name.as_str()),
    );
    attributes.insert(
        "metadata".to_string(),
        serde_json::to_value(&request.server.metadata).unwrap_or(Value::Null),
    );
    attributes
}
