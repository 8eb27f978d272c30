use mirage::{ComputeSession, CreateServerRequest, DiskConfig, ServerStatus};
use serde_json::{json, Value};

fn absolutize(path: &str) -> String {
    format!("http://mirage.test/{path}")
}

fn creation_request(name: &str, metadata: Value) -> CreateServerRequest {
    serde_json::from_value(json!({
        "server": {
            "name": name,
            "metadata": metadata,
            "flavorRef": "2",
            "imageRef": "img-1"
        }
    }))
    .expect("request is well formed")
}

#[test]
fn default_creation_is_active_with_unique_ids() {
    let mut session = ComputeSession::with_seed(42);
    let collection = session.tenant("tenant").collection_for_region("ORD");

    let first = collection.request_creation(&creation_request("web-1", json!({})), &absolutize);
    let second = collection.request_creation(&creation_request("web-2", json!({})), &absolutize);
    assert_eq!(first.status, 202);
    assert_eq!(second.status, 202);

    let servers = collection.servers();
    assert_eq!(servers.len(), 2);
    assert_ne!(servers[0].server_id, servers[1].server_id);
    for server in servers {
        assert_eq!(server.status, ServerStatus::Active);
        assert_eq!(server.creation_time, server.update_time);
    }

    // The response names the server that actually landed in the collection.
    let body = first.body.expect("creation response has a body");
    assert_eq!(body["server"]["id"], servers[0].server_id.as_str());
    assert_eq!(
        body["server"]["adminPass"],
        servers[0].admin_password.as_str()
    );
    assert_eq!(body["server"]["OS-DCF:diskConfig"], "AUTO");
}

#[test]
fn read_returns_detail_or_404() {
    let mut session = ComputeSession::new();
    let collection = session.tenant("tenant").collection_for_region("ORD");
    collection.request_creation(&creation_request("web-1", json!({})), &absolutize);
    let server_id = collection.servers()[0].server_id.clone();

    let response = collection.request_read(&server_id, &absolutize);
    assert_eq!(response.status, 200);
    let body = response.body.expect("read response has a body");
    assert_eq!(body["server"]["name"], "web-1");
    assert_eq!(body["server"]["status"], "ACTIVE");
    assert_eq!(body["server"]["tenant_id"], "tenant");
    assert_eq!(
        body["server"]["links"][0]["href"],
        format!("http://mirage.test/v2/tenant/servers/{server_id}")
    );

    let missing = collection.request_read("no-such-server", &absolutize);
    assert_eq!(missing.status, 404);
    assert!(missing.body.is_none());
}

#[test]
fn list_filters_by_name_substring_in_insertion_order() {
    let mut session = ComputeSession::new();
    let collection = session.tenant("tenant").collection_for_region("ORD");
    for name in ["web-1", "db-1", "web-2"] {
        collection.request_creation(&creation_request(name, json!({})), &absolutize);
    }

    let response = collection.request_list(false, "web", &absolutize);
    let body = response.body.expect("list response has a body");
    let names: Vec<&str> = body["servers"]
        .as_array()
        .expect("servers is an array")
        .iter()
        .map(|server| server["name"].as_str().expect("name is a string"))
        .collect();
    assert_eq!(names, vec!["web-1", "web-2"]);

    // Empty filter matches everything, still in insertion order.
    let all = collection.request_list(false, "", &absolutize);
    let body = all.body.expect("list response has a body");
    assert_eq!(body["servers"].as_array().map(Vec::len), Some(3));

    // Brief entries carry only name, links, and id; details carry status.
    assert!(body["servers"][0].get("status").is_none());
    let detailed = collection.request_list(true, "db", &absolutize);
    let body = detailed.body.expect("list response has a body");
    assert_eq!(body["servers"][0]["status"], "ACTIVE");
}

#[test]
fn addresses_are_synthetic_and_read_back() {
    let mut session = ComputeSession::with_seed(7);
    let collection = session.tenant("tenant").collection_for_region("ORD");
    collection.request_creation(&creation_request("web-1", json!({})), &absolutize);
    let server_id = collection.servers()[0].server_id.clone();

    let response = collection.request_ips(&server_id);
    assert_eq!(response.status, 200);
    let body = response.body.expect("addresses response has a body");
    let private = body["addresses"]["private"][0]["addr"]
        .as_str()
        .expect("private address is a string");
    assert!(private.starts_with("10.180."));
    let public = body["addresses"]["public"]
        .as_array()
        .expect("public addresses are an array");
    assert_eq!(public.len(), 2);
    assert_eq!(public[0]["version"], 4);
    assert_eq!(public[1]["version"], 6);

    assert_eq!(collection.request_ips("no-such-server").status, 404);
}

#[test]
fn disk_config_is_validated() {
    let mut session = ComputeSession::new();
    let collection = session.tenant("tenant").collection_for_region("ORD");

    let rejected: CreateServerRequest = serde_json::from_value(json!({
        "server": {
            "name": "weird",
            "flavorRef": "2",
            "imageRef": "img-1",
            "OS-DCF:diskConfig": "SIDEWAYS"
        }
    }))
    .expect("request is well formed");
    let response = collection.request_creation(&rejected, &absolutize);
    assert_eq!(response.status, 400);
    assert!(collection.servers().is_empty());

    let manual: CreateServerRequest = serde_json::from_value(json!({
        "server": {
            "name": "manual",
            "flavorRef": "2",
            "imageRef": "img-1",
            "OS-DCF:diskConfig": "MANUAL"
        }
    }))
    .expect("request is well formed");
    let response = collection.request_creation(&manual, &absolutize);
    assert_eq!(response.status, 202);
    assert_eq!(collection.servers()[0].disk_config, DiskConfig::Manual);
}

#[test]
fn delete_removes_the_server() {
    let mut session = ComputeSession::new();
    let collection = session.tenant("tenant").collection_for_region("ORD");
    collection.request_creation(&creation_request("web-1", json!({})), &absolutize);
    let server_id = collection.servers()[0].server_id.clone();

    let response = collection.request_delete(&server_id);
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
    assert!(collection.servers().is_empty());
    assert_eq!(collection.request_read(&server_id, &absolutize).status, 404);
    assert_eq!(collection.request_delete(&server_id).status, 404);
}

#[test]
fn delete_failure_counter_decrements_then_succeeds() {
    let mut session = ComputeSession::new();
    let collection = session.tenant("tenant").collection_for_region("ORD");
    collection.request_creation(
        &creation_request(
            "flaky",
            json!({"delete_server_failure": "{\"times\": 2}"}),
        ),
        &absolutize,
    );
    let server_id = collection.servers()[0].server_id.clone();

    // Two transient failures, decrementing the persisted counter each time.
    assert_eq!(collection.request_delete(&server_id).status, 500);
    assert_eq!(collection.request_delete(&server_id).status, 500);
    assert_eq!(collection.servers().len(), 1);

    // Third attempt goes through.
    assert_eq!(collection.request_delete(&server_id).status, 204);
    assert!(collection.servers().is_empty());

    let listed = collection.request_list(false, "", &absolutize);
    let body = listed.body.expect("list response has a body");
    assert_eq!(body["servers"].as_array().map(Vec::len), Some(0));
}

#[test]
fn regions_and_tenants_are_isolated() {
    let mut session = ComputeSession::new();

    session
        .tenant("tenant-a")
        .collection_for_region("ORD")
        .request_creation(&creation_request("ord-server", json!({})), &absolutize);

    assert!(session
        .tenant("tenant-a")
        .collection_for_region("DFW")
        .servers()
        .is_empty());
    assert!(session
        .tenant("tenant-b")
        .collection_for_region("ORD")
        .servers()
        .is_empty());
    assert_eq!(
        session
            .tenant("tenant-a")
            .collection_for_region("ORD")
            .servers()
            .len(),
        1
    );
}
