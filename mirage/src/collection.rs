//! Server collections, scoped per tenant and region, and the session that
//! owns them.
//!
//! All dispatch and mutation happen synchronously within the call handling a
//! single simulated request; the only asynchrony is simulated time, advanced
//! explicitly through [`ComputeSession::advance`].

use std::{collections::HashMap, rc::Rc, time::Duration};

use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::{
    behavior::{
        creation_attributes, metadata_override, server_creation, BehaviorRegistry, CreateBehavior,
        Criterion, EventDescription,
    },
    clock::VirtualClock,
    entropy::{Entropy, SeededEntropy},
    error::ValidationError,
    request::CreateServerRequest,
    response::{status, ApiResponse, UrlResolver},
    server::{Address, DiskConfig, Server, ServerStatus, PUBLIC_IPV6},
    transition::StatusTransition,
};

/// An ordered set of servers in one region, for one tenant.
///
/// Owns its servers exclusively and carries its own behavior registry, so
/// behavior registrations are scoped per region and tenant, never global.
#[derive(Debug)]
pub struct RegionalServerCollection {
    tenant_id: String,
    region_name: String,
    clock: VirtualClock,
    entropy: Entropy,
    servers: Vec<Server>,
    behavior_registry: BehaviorRegistry,
}

impl RegionalServerCollection {
    pub(crate) fn new(
        tenant_id: String,
        region_name: String,
        clock: VirtualClock,
        entropy: Entropy,
        event: Rc<EventDescription>,
    ) -> Self {
        Self {
            tenant_id,
            region_name,
            clock,
            entropy,
            servers: Vec::new(),
            behavior_registry: BehaviorRegistry::new(event),
        }
    }

    /// The tenant owning this collection.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The region this collection lives in.
    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    /// The servers currently in the collection, in insertion order.
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Linear lookup by server identity.
    pub fn server_by_id(&self, server_id: &str) -> Option<&Server> {
        self.servers
            .iter()
            .find(|server| server.server_id == server_id)
    }

    /// Mutable lookup by server identity.
    pub fn server_by_id_mut(&mut self, server_id: &str) -> Option<&mut Server> {
        self.servers
            .iter_mut()
            .find(|server| server.server_id == server_id)
    }

    /// The event description this collection dispatches creation requests
    /// against; use it to build criteria and behaviors for
    /// [`RegionalServerCollection::register_behavior`].
    pub fn event(&self) -> &Rc<EventDescription> {
        self.behavior_registry.event()
    }

    /// Registers a criteria-qualified creation behavior on this collection.
    pub fn register_behavior(&mut self, criteria: Vec<Criterion>, behavior: CreateBehavior) {
        self.behavior_registry.register(criteria, behavior);
    }

    /// Handles a server creation request.
    ///
    /// Resolution order: metadata override first, then registry dispatch,
    /// then the registered default. The resolved behavior executes against
    /// this collection and produces the response.
    pub fn request_creation(
        &mut self,
        request: &CreateServerRequest,
        absolutize_url: &UrlResolver,
    ) -> ApiResponse {
        let behavior = match metadata_override(self.event(), &request.server.metadata) {
            Ok(Some(behavior)) => {
                debug!(region = %self.region_name, "metadata override selected the creation behavior");
                behavior
            }
            Ok(None) => {
                let attributes = creation_attributes(&self.tenant_id, request);
                match self.behavior_registry.behavior_for_attributes(&attributes) {
                    Ok(behavior) => behavior,
                    Err(error) => {
                        return ApiResponse::fault(status::INTERNAL_ERROR, &error.to_string())
                    }
                }
            }
            Err(error) => return ApiResponse::fault(status::BAD_REQUEST, &error.to_string()),
        };
        behavior(self, request, absolutize_url)
    }

    /// Constructs a server from a creation request and appends it.
    ///
    /// This is the only pathway that creates servers. Creation either fully
    /// succeeds (entity added, id returned) or fully fails (nothing added).
    pub(crate) fn create_server(
        &mut self,
        request: &CreateServerRequest,
    ) -> Result<String, ValidationError> {
        let spec = &request.server;
        let disk_config = DiskConfig::parse(spec.disk_config.as_deref())?;
        let now = self.clock.now();

        let mut entropy = self.entropy.borrow_mut();
        let server_id = loop {
            let tag = entropy.server_tag();
            let candidate = format!("test-server{tag}-id-{tag}");
            if self
                .servers
                .iter()
                .all(|server| server.server_id != candidate)
            {
                break candidate;
            }
        };
        let private_ips = vec![Address::v4(format!(
            "10.180.{}.{}",
            entropy.ip_octet(),
            entropy.ip_octet()
        ))];
        let public_ips = vec![
            Address::v4(format!("198.101.241.{}", entropy.ip_octet())),
            Address::v6(PUBLIC_IPV6),
        ];
        let admin_password = entropy.admin_password();
        drop(entropy);

        debug!(server_id = %server_id, region = %self.region_name, "creating server");
        self.servers.push(Server {
            server_id: server_id.clone(),
            server_name: spec.name.clone(),
            metadata: spec.metadata.clone(),
            creation_time: now,
            update_time: now,
            public_ips,
            private_ips,
            status: ServerStatus::Active,
            flavor_ref: spec.flavor_ref.clone(),
            image_ref: spec.image_ref.clone(),
            disk_config,
            admin_password,
        });
        Ok(server_id)
    }

    /// The 202 creation response for a freshly created server.
    pub(crate) fn creation_response(
        &self,
        server_id: &str,
        absolutize_url: &UrlResolver,
    ) -> ApiResponse {
        match self.server_by_id(server_id) {
            Some(server) => ApiResponse::json(
                status::ACCEPTED,
                server.creation_response_json(&self.tenant_id, absolutize_url),
            ),
            None => ApiResponse::not_found(),
        }
    }

    /// Schedules a status change for a server in this collection.
    pub fn schedule_status(&self, server_id: &str, target: ServerStatus, delay: Duration) {
        self.clock.call_later(
            delay,
            StatusTransition {
                tenant_id: self.tenant_id.clone(),
                region_name: self.region_name.clone(),
                server_id: server_id.to_string(),
                target,
            },
        );
    }

    /// Applies a fired transition, if its target still exists and is still
    /// building. Firing against a deleted or settled server is a no-op.
    pub(crate) fn apply_transition(&mut self, transition: &StatusTransition) {
        match self.server_by_id_mut(&transition.server_id) {
            Some(server) if server.status == ServerStatus::Build => {
                server.status = transition.target;
                trace!(
                    server_id = %transition.server_id,
                    status = transition.target.as_str(),
                    "applied scheduled transition"
                );
            }
            Some(_) => trace!(
                server_id = %transition.server_id,
                "ignoring transition for a server that is not building"
            ),
            None => trace!(
                server_id = %transition.server_id,
                "transition target no longer exists"
            ),
        }
    }

    /// The detail payload for an individual server, or 404.
    pub fn request_read(&self, server_id: &str, absolutize_url: &UrlResolver) -> ApiResponse {
        match self.server_by_id(server_id) {
            Some(server) => ApiResponse::json(
                status::OK,
                json!({"server": server.detail_json(&self.tenant_id, absolutize_url)}),
            ),
            None => ApiResponse::not_found(),
        }
    }

    /// The address payload for an individual server, or 404.
    pub fn request_ips(&self, server_id: &str) -> ApiResponse {
        match self.server_by_id(server_id) {
            Some(server) => {
                ApiResponse::json(status::OK, json!({"addresses": server.addresses_json()}))
            }
            None => ApiResponse::not_found(),
        }
    }

    /// Lists servers whose name contains `name_filter`, in insertion order.
    ///
    /// The empty filter matches everything.
    pub fn request_list(
        &self,
        include_details: bool,
        name_filter: &str,
        absolutize_url: &UrlResolver,
    ) -> ApiResponse {
        let servers: Vec<Value> = self
            .servers
            .iter()
            .filter(|server| server.server_name.contains(name_filter))
            .map(|server| {
                if include_details {
                    server.detail_json(&self.tenant_id, absolutize_url)
                } else {
                    server.brief_json(&self.tenant_id, absolutize_url)
                }
            })
            .collect();
        ApiResponse::json(status::OK, json!({"servers": servers}))
    }

    /// Deletes a server by id.
    ///
    /// If the server's metadata carries a `delete_server_failure` descriptor
    /// with a positive remaining count, the count is decremented and
    /// persisted back, and a transient 500 is reported without removing the
    /// server. At zero the deletion proceeds normally.
    pub fn request_delete(&mut self, server_id: &str) -> ApiResponse {
        let Some(index) = self
            .servers
            .iter()
            .position(|server| server.server_id == server_id)
        else {
            return ApiResponse::not_found();
        };
        if let Some(remaining) = self.decrement_delete_failure(index) {
            debug!(server_id, remaining, "simulated transient delete failure");
            return ApiResponse::empty(status::INTERNAL_ERROR);
        }
        self.servers.remove(index);
        debug!(server_id, region = %self.region_name, "deleted server");
        ApiResponse::empty(status::NO_CONTENT)
    }

    /// Decrements the `delete_server_failure` counter if present and
    /// positive, persisting it back into metadata. Returns the remaining
    /// count when a transient failure should be reported.
    fn decrement_delete_failure(&mut self, index: usize) -> Option<u64> {
        let raw = self.servers[index].metadata.get("delete_server_failure")?;
        let mut descriptor: Map<String, Value> = serde_json::from_str(raw).ok()?;
        let times = descriptor.get("times").and_then(Value::as_u64).unwrap_or(0);
        if times == 0 {
            return None;
        }
        let remaining = times - 1;
        descriptor.insert("times".to_string(), remaining.into());
        self.servers[index].metadata.insert(
            "delete_server_failure".to_string(),
            Value::Object(descriptor).to_string(),
        );
        Some(remaining)
    }
}

/// All the regional collections a single tenant owns.
#[derive(Debug)]
pub struct GlobalServerCollections {
    tenant_id: String,
    clock: VirtualClock,
    entropy: Entropy,
    event: Rc<EventDescription>,
    regional_collections: HashMap<String, RegionalServerCollection>,
}

impl GlobalServerCollections {
    pub(crate) fn new(
        tenant_id: String,
        clock: VirtualClock,
        entropy: Entropy,
        event: Rc<EventDescription>,
    ) -> Self {
        Self {
            tenant_id,
            clock,
            entropy,
            event,
            regional_collections: HashMap::new(),
        }
    }

    /// The regional collection for the named region, created lazily on first
    /// access and persisting for the lifetime of the session.
    pub fn collection_for_region(&mut self, region_name: &str) -> &mut RegionalServerCollection {
        self.regional_collections
            .entry(region_name.to_string())
            .or_insert_with(|| {
                trace!(tenant = %self.tenant_id, region = region_name, "creating regional collection");
                RegionalServerCollection::new(
                    self.tenant_id.clone(),
                    region_name.to_string(),
                    self.clock.clone(),
                    self.entropy.clone(),
                    self.event.clone(),
                )
            })
    }

    pub(crate) fn region_mut(&mut self, region_name: &str) -> Option<&mut RegionalServerCollection> {
        self.regional_collections.get_mut(region_name)
    }
}

/// A whole simulated compute service: the virtual clock, the entropy source,
/// and every tenant's collections.
///
/// Owned explicitly by the caller; there is no ambient global state. Dropping
/// the session drops everything, including pending transitions.
#[derive(Debug)]
pub struct ComputeSession {
    clock: VirtualClock,
    entropy: Entropy,
    event: Rc<EventDescription>,
    tenants: HashMap<String, GlobalServerCollections>,
}

impl ComputeSession {
    /// Creates a session with the default seed (0).
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Creates a session whose entropy source is seeded for reproducible
    /// server generation.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_parts(
            VirtualClock::new(),
            SeededEntropy::new(seed).into_handle(),
            server_creation(),
        )
    }

    /// Creates a session from explicit parts, for callers that need a custom
    /// entropy source or an extended event description.
    pub fn with_parts(clock: VirtualClock, entropy: Entropy, event: Rc<EventDescription>) -> Self {
        Self {
            clock,
            entropy,
            event,
            tenants: HashMap::new(),
        }
    }

    /// The session's virtual clock.
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// The event description shared by every collection in this session.
    pub fn event(&self) -> &Rc<EventDescription> {
        &self.event
    }

    /// The collections owned by the given tenant, created on first access.
    pub fn tenant(&mut self, tenant_id: &str) -> &mut GlobalServerCollections {
        self.tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                GlobalServerCollections::new(
                    tenant_id.to_string(),
                    self.clock.clone(),
                    self.entropy.clone(),
                    self.event.clone(),
                )
            })
    }

    /// Advances simulated time by `duration`, firing every transition that
    /// comes due.
    ///
    /// Transitions fire in nondecreasing time order, FIFO among those
    /// scheduled for the same instant, with the clock set to each
    /// transition's instant while it is applied. Transitions whose target
    /// server, region, or tenant no longer exists are dropped silently.
    pub fn advance(&mut self, duration: Duration) {
        let deadline = self.clock.now() + duration;
        while let Some(transition) = self.clock.pop_due(deadline) {
            let Some(tenant) = self.tenants.get_mut(&transition.tenant_id) else {
                trace!(tenant = %transition.tenant_id, "transition tenant unknown");
                continue;
            };
            let Some(region) = tenant.region_mut(&transition.region_name) else {
                trace!(region = %transition.region_name, "transition region unknown");
                continue;
            };
            region.apply_transition(&transition);
        }
        self.clock.advance_to(deadline);
    }
}

impl Default for ComputeSession {
    fn default() -> Self {
        Self::new()
    }
}
