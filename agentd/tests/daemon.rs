//! End-to-end daemon wiring tests: configuration → watcher → sources →
//! managers → servers, against real temp directories and sockets.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use agentd::{Agent, config};
use policy_model::endpoint_manager::EndpointListener;
use policy_model::registry::GroupContext;
use policy_model::uri::{Uri, epg_uri};

struct Dirs {
    _root: tempfile::TempDir,
    endpoints: PathBuf,
    services: PathBuf,
    droplog: PathBuf,
    ids: PathBuf,
    notif_socket: PathBuf,
    config: PathBuf,
}

fn setup_dirs() -> Dirs {
    let root = tempfile::tempdir().unwrap();
    let endpoints = root.path().join("endpoints");
    let services = root.path().join("services");
    let droplog = root.path().join("droplog");
    let ids = root.path().join("ids");
    for dir in [&endpoints, &services, &droplog, &ids] {
        std::fs::create_dir_all(dir).unwrap();
    }
    let notif_socket = root.path().join("notif.sock");
    let config = root.path().join("agent.conf");
    std::fs::write(
        &config,
        format!(
            r#"{{
                "opflex": {{
                    "name": "test-node",
                    "notif": {{"enabled": true, "socket-name": "{notif}"}}
                }},
                "endpoint-sources": {{"filesystem": ["{endpoints}"]}},
                "service-sources": {{"filesystem": ["{services}"]}},
                "drop-log-config-sources": {{"filesystem": ["{droplog}"]}},
                "id-registry": {{"directory": "{ids}"}}
            }}"#,
            notif = notif_socket.display(),
            endpoints = endpoints.display(),
            services = services.display(),
            droplog = droplog.display(),
            ids = ids.display(),
        ),
    )
    .unwrap();
    Dirs {
        _root: root,
        endpoints,
        services,
        droplog,
        ids,
        notif_socket,
        config,
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

fn write_ep(dir: &Path, name: &str, uuid: &str, mac: &str) {
    std::fs::write(
        dir.join(name),
        format!(
            r#"{{"uuid":"{uuid}","mac":"{mac}","ip":["10.0.0.1"],
                "interface-name":"veth0",
                "endpoint-group":"/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/"}}"#
        ),
    )
    .unwrap();
}

struct Recorder(Mutex<Vec<String>>);

impl EndpointListener for Recorder {
    fn endpoint_updated(&self, uuid: &str) {
        self.0.lock().unwrap().push(uuid.to_string());
    }
}

#[tokio::test]
async fn endpoint_file_rewrite_replaces_uuid() {
    let dirs = setup_dirs();
    let cfg = config::load(&dirs.config).unwrap();
    let agent = Agent::new(&cfg);

    agent.policy_registry().set_group_context(
        epg_uri("test", "epg"),
        GroupContext::new(
            Uri::from("/PolicyUniverse/PolicySpace/test/GbpBridgeDomain/bd/"),
            Uri::from("/PolicyUniverse/PolicySpace/test/GbpRoutingDomain/rd/"),
        ),
    );
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    agent.endpoint_manager().register_listener(recorder.clone());

    agent.start().await.unwrap();

    write_ep(&dirs.endpoints, "a.ep", "uuid-1", "10:ff:00:a3:01:00");
    let manager = agent.endpoint_manager().clone();
    wait_until(|| manager.get_endpoint("uuid-1").is_some()).await;

    // rewriting the file with a new uuid removes the old endpoint first
    write_ep(&dirs.endpoints, "a.ep", "uuid-2", "10:ff:00:a3:01:02");
    wait_until(|| manager.get_endpoint("uuid-2").is_some()).await;
    assert!(manager.get_endpoint("uuid-1").is_none());
    assert_eq!(
        manager.endpoints_by_iface("veth0"),
        std::collections::HashSet::from(["uuid-2".to_string()])
    );

    let events = recorder.0.lock().unwrap().clone();
    let last_old = events.iter().rposition(|u| u == "uuid-1").unwrap();
    let new_after_old = events
        .iter()
        .skip(last_old + 1)
        .any(|u| u == "uuid-2");
    assert!(new_after_old, "removal must precede the new update: {events:?}");

    // deleting the file removes the endpoint
    std::fs::remove_file(dirs.endpoints.join("a.ep")).unwrap();
    wait_until(|| manager.get_endpoint("uuid-2").is_none()).await;

    agent.stop().await;
}

#[tokio::test]
async fn service_and_droplog_files_feed_their_managers() {
    let dirs = setup_dirs();
    let cfg = config::load(&dirs.config).unwrap();
    let agent = Agent::new(&cfg);
    agent.start().await.unwrap();

    std::fs::write(
        dirs.services.join("svc.service"),
        br#"{"uuid": "svc-1", "interface-name": "veth-svc",
            "domain-policy-space": "test", "domain-name": "rd"}"#,
    )
    .unwrap();
    let services = agent.service_manager().clone();
    wait_until(|| services.get_service("svc-1").is_some()).await;
    assert!(services.services_by_iface("veth-svc").contains("svc-1"));

    std::fs::write(
        dirs.droplog.join("current.droplogcfg"),
        br#"{"drop-log-enable": true, "drop-log-mode": "flow-based"}"#,
    )
    .unwrap();
    let extra = agent.extra_config_manager().clone();
    wait_until(|| extra.drop_log_config().enabled).await;

    agent.stop().await;
}

#[tokio::test]
async fn ids_survive_an_agent_restart() {
    let dirs = setup_dirs();
    let cfg = config::load(&dirs.config).unwrap();

    let first = {
        let agent = Agent::new(&cfg);
        agent.start().await.unwrap();
        let ids = agent.id_generator();
        ids.init_namespace_bounded("vnid", 1, 1 << 24);
        let id = ids.get_id("vnid", "/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/");
        agent.stop().await;
        id.unwrap()
    };

    let agent = Agent::new(&cfg);
    agent.start().await.unwrap();
    let ids = agent.id_generator();
    ids.init_namespace_bounded("vnid", 1, 1 << 24);
    assert_eq!(
        ids.get_id("vnid", "/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/"),
        Some(first)
    );
    assert!(dirs.ids.join("vnid.id").exists());
    agent.stop().await;
}

#[tokio::test]
async fn notification_socket_serves_subscribers() {
    let dirs = setup_dirs();
    let cfg = config::load(&dirs.config).unwrap();
    let agent = Agent::new(&cfg);
    agent.start().await.unwrap();

    let mut client = UnixStream::connect(&dirs.notif_socket).await.unwrap();
    let subscribe = notif_server::encode(&serde_json::json!({
        "method": "subscribe", "params": {"type": ["virtual-ip"]}, "id": 1,
    }))
    .unwrap();
    client.write_all(&subscribe).await.unwrap();

    let reply = read_frame(&mut client).await;
    assert_eq!(reply, serde_json::json!({"result": {}, "id": 1}));

    let server = agent.notif_server().unwrap();
    let uuids = std::collections::HashSet::from(["uuid-1".to_string()]);
    let mac: mac_address::MacAddress = "10:ff:00:a3:01:00".parse().unwrap();
    server.dispatch_virtual_ip(&uuids, mac, "10.0.0.50");

    let notif = read_frame(&mut client).await;
    assert_eq!(notif["method"], "virtual-ip");
    assert_eq!(notif["params"]["ip"], "10.0.0.50");

    agent.stop().await;
    assert!(!dirs.notif_socket.exists());
}

async fn read_frame(stream: &mut UnixStream) -> serde_json::Value {
    let mut header = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut header))
        .await
        .unwrap()
        .unwrap();
    let len = u32::from_be_bytes(header) as usize;
    let mut body = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut body))
        .await
        .unwrap()
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
