//! The simulated server entity and its JSON payloads.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{error::ValidationError, response::UrlResolver};

/// Fixed public IPv6 literal assigned to every server.
pub(crate) const PUBLIC_IPV6: &str = "2001:4800:780e:0510:d87b:9cbc:ff04:513a";

/// Lifecycle status of a simulated server.
///
/// The only transition a running server ever makes is `BUILD` to `ACTIVE`,
/// driven by a scheduled transition; `ACTIVE` and `ERROR` are otherwise set
/// at creation and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server is up.
    Active,
    /// Server is still building; will become `ACTIVE` on a scheduled
    /// transition.
    Build,
    /// Server failed; terminal.
    Error,
}

impl ServerStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Build => "BUILD",
            ServerStatus::Error => "ERROR",
        }
    }
}

/// Disk configuration mode of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskConfig {
    /// Automatic partitioning (the default).
    #[default]
    Auto,
    /// Manual partitioning.
    Manual,
}

impl DiskConfig {
    /// Parses the optional `OS-DCF:diskConfig` request field.
    ///
    /// Absent or empty values default to `AUTO`; anything other than `AUTO`
    /// or `MANUAL` is a validation failure.
    pub fn parse(value: Option<&str>) -> Result<Self, ValidationError> {
        match value {
            None | Some("") => Ok(DiskConfig::Auto),
            Some("AUTO") => Ok(DiskConfig::Auto),
            Some("MANUAL") => Ok(DiskConfig::Manual),
            Some(other) => Err(ValidationError::InvalidDiskConfig(other.to_string())),
        }
    }

    /// Wire representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskConfig::Auto => "AUTO",
            DiskConfig::Manual => "MANUAL",
        }
    }
}

/// A single IP address bound to a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    addr: String,
    version: u8,
}

impl Address {
    /// An IPv4 address.
    pub fn v4(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            version: 4,
        }
    }

    /// An IPv6 address.
    pub fn v6(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            version: 6,
        }
    }

    /// The literal address string.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The `{addr, version}` wire shape.
    pub fn json(&self) -> Value {
        json!({"addr": self.addr, "version": self.version})
    }
}

/// All the mutable state associated with one simulated server.
///
/// Servers are created only through the creation-request pathway on a
/// regional collection, mutated in place by behaviors and scheduled
/// transitions, and destroyed only by an explicit delete.
#[derive(Debug, Clone)]
pub struct Server {
    /// Unique identity within the owning collection.
    pub server_id: String,
    /// Display name; list filtering matches against this.
    pub server_name: String,
    /// String-to-string metadata, mutable after creation.
    pub metadata: HashMap<String, String>,
    /// Simulated creation instant.
    pub creation_time: Duration,
    /// Simulated last-update instant; equals `creation_time` at creation.
    pub update_time: Duration,
    /// Public addresses: one IPv4 and one IPv6.
    pub public_ips: Vec<Address>,
    /// Private addresses: one IPv4 from the synthetic `10.180.0.0/16` range.
    pub private_ips: Vec<Address>,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Flavor reference from the creation request.
    pub flavor_ref: String,
    /// Image reference from the creation request, if any.
    pub image_ref: Option<String>,
    /// Disk configuration mode.
    pub disk_config: DiskConfig,
    /// Generated admin password, echoed once in the creation response.
    pub admin_password: String,
}

impl Server {
    /// The `{public, private}` address block.
    pub fn addresses_json(&self) -> Value {
        json!({
            "private": self.private_ips.iter().map(Address::json).collect::<Vec<_>>(),
            "public": self.public_ips.iter().map(Address::json).collect::<Vec<_>>(),
        })
    }

    /// Self and bookmark links for this server.
    ///
    /// Bookmark links omit the version segment and go straight to the tenant
    /// id, so the version prefix appears only on the self link.
    pub fn links_json(&self, tenant_id: &str, absolutize_url: &UrlResolver) -> Value {
        json!([
            {
                "href": absolutize_url(&format!("v2/{}/servers/{}", tenant_id, self.server_id)),
                "rel": "self",
            },
            {
                "href": absolutize_url(&format!("{}/servers/{}", tenant_id, self.server_id)),
                "rel": "bookmark",
            }
        ])
    }

    /// Brief form used by the non-details list operation.
    pub fn brief_json(&self, tenant_id: &str, absolutize_url: &UrlResolver) -> Value {
        json!({
            "name": self.server_name,
            "links": self.links_json(tenant_id, absolutize_url),
            "id": self.server_id,
        })
    }

    /// Long form returned by individual reads and the details list.
    pub fn detail_json(&self, tenant_id: &str, absolutize_url: &UrlResolver) -> Value {
        let image = match &self.image_ref {
            Some(image_ref) => json!({
                "id": image_ref,
                "links": [{
                    "href": absolutize_url(&format!("{tenant_id}/images/{image_ref}")),
                    "rel": "bookmark",
                }],
            }),
            None => json!(""),
        };
        json!({
            // Static simulated fields, constant across all servers.
            "OS-EXT-STS:power_state": 1,
            "OS-EXT-STS:task_state": null,
            "accessIPv4": "198.101.241.238",
            "accessIPv6": PUBLIC_IPV6,
            "key_name": null,
            "hostId": "33ccb6c82f3625748b6f2338f54d8e9df07cc583251e001355569056",
            "progress": 100,
            "user_id": "170454",

            "id": self.server_id,
            "OS-DCF:diskConfig": self.disk_config.as_str(),
            "OS-EXT-STS:vm_state": self.status.as_str(),
            "addresses": self.addresses_json(),
            "created": seconds_to_timestamp(self.creation_time),
            "updated": seconds_to_timestamp(self.update_time),
            "flavor": {
                "id": self.flavor_ref,
                "links": [{
                    "href": absolutize_url(&format!("{}/flavors/{}", tenant_id, self.flavor_ref)),
                    "rel": "bookmark",
                }],
            },
            "image": image,
            "links": self.links_json(tenant_id, absolutize_url),
            "metadata": self.metadata,
            "name": self.server_name,
            "tenant_id": tenant_id,
            "status": self.status.as_str(),
        })
    }

    /// Payload returned for the initial creation of this server.
    pub fn creation_response_json(&self, tenant_id: &str, absolutize_url: &UrlResolver) -> Value {
        json!({
            "server": {
                "OS-DCF:diskConfig": self.disk_config.as_str(),
                "id": self.server_id,
                "links": self.links_json(tenant_id, absolutize_url),
                "adminPass": self.admin_password,
            }
        })
    }
}

/// Formats simulated seconds since the epoch as an ISO-like timestamp.
fn seconds_to_timestamp(time: Duration) -> String {
    let datetime = DateTime::<Utc>::from_timestamp(time.as_secs() as i64, time.subsec_nanos())
        .unwrap_or(DateTime::UNIX_EPOCH);
    datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absolutize(path: &str) -> String {
        format!("http://mirage.test/{path}")
    }

    fn sample_server() -> Server {
        Server {
            server_id: "test-server123-id-123".to_string(),
            server_name: "sample".to_string(),
            metadata: HashMap::new(),
            creation_time: Duration::from_secs(5),
            update_time: Duration::from_secs(5),
            public_ips: vec![Address::v4("198.101.241.7"), Address::v6(PUBLIC_IPV6)],
            private_ips: vec![Address::v4("10.180.3.4")],
            status: ServerStatus::Active,
            flavor_ref: "2".to_string(),
            image_ref: Some("img-1".to_string()),
            disk_config: DiskConfig::Auto,
            admin_password: "secretsecret".to_string(),
        }
    }

    #[test]
    fn disk_config_parsing() {
        assert_eq!(DiskConfig::parse(None), Ok(DiskConfig::Auto));
        assert_eq!(DiskConfig::parse(Some("")), Ok(DiskConfig::Auto));
        assert_eq!(DiskConfig::parse(Some("AUTO")), Ok(DiskConfig::Auto));
        assert_eq!(DiskConfig::parse(Some("MANUAL")), Ok(DiskConfig::Manual));
        assert_eq!(
            DiskConfig::parse(Some("SIDEWAYS")),
            Err(ValidationError::InvalidDiskConfig("SIDEWAYS".to_string()))
        );
    }

    #[test]
    fn timestamps_are_iso_like() {
        assert_eq!(
            seconds_to_timestamp(Duration::from_secs(5)),
            "1970-01-01T00:00:05.000000Z"
        );
    }

    #[test]
    fn links_have_self_and_bookmark() {
        let server = sample_server();
        let links = server.links_json("tenant", &absolutize);
        assert_eq!(
            links[0]["href"],
            "http://mirage.test/v2/tenant/servers/test-server123-id-123"
        );
        assert_eq!(links[0]["rel"], "self");
        assert_eq!(
            links[1]["href"],
            "http://mirage.test/tenant/servers/test-server123-id-123"
        );
        assert_eq!(links[1]["rel"], "bookmark");
    }

    #[test]
    fn detail_carries_status_and_addresses() {
        let server = sample_server();
        let detail = server.detail_json("tenant", &absolutize);
        assert_eq!(detail["status"], "ACTIVE");
        assert_eq!(detail["OS-EXT-STS:vm_state"], "ACTIVE");
        assert_eq!(detail["addresses"]["private"][0]["addr"], "10.180.3.4");
        assert_eq!(detail["addresses"]["public"][1]["version"], 6);
        assert_eq!(detail["created"], "1970-01-01T00:00:05.000000Z");
        assert_eq!(detail["tenant_id"], "tenant");
    }

    #[test]
    fn missing_image_degrades_to_empty_string() {
        let mut server = sample_server();
        server.image_ref = None;
        let detail = server.detail_json("tenant", &absolutize);
        assert_eq!(detail["image"], "");
    }

    #[test]
    fn creation_response_shape() {
        let server = sample_server();
        let payload = server.creation_response_json("tenant", &absolutize);
        assert_eq!(payload["server"]["id"], "test-server123-id-123");
        assert_eq!(payload["server"]["adminPass"], "secretsecret");
        assert_eq!(payload["server"]["OS-DCF:diskConfig"], "AUTO");
    }
}
