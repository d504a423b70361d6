//! S1 — a discovery client sending `QUERY-SERVICE` over loopback multicast
//! gets back exactly one `discovery-response://` and can register it.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use castanets_core::discovery::{DiscoveryClient, DiscoveryServer};
use castanets_core::provider::ServiceProvider;

const GROUP: &str = "239.255.19.19";

#[tokio::test]
async fn discovery_round_trip_registers_one_entry() {
    let group: Ipv4Addr = GROUP.parse().unwrap();

    let server = DiscoveryServer::bind(group, 0, 9902, 9903, Arc::new(|| "TEST".to_string()))
        .await
        .expect("bind discovery server");
    let server_port = server.socket_port();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let client = DiscoveryClient::bind(group, server_port, false)
        .await
        .expect("bind discovery client");
    client.send_query().await.expect("send query");

    let discovered = tokio::time::timeout(Duration::from_secs(2), client.recv_response())
        .await
        .expect("response arrived before timeout")
        .expect("no transport error")
        .expect("response parsed");

    assert_eq!(discovered.response.service_port, 9902);
    assert_eq!(discovered.response.monitor_port, 9903);
    assert_eq!(discovered.response.capability, "TEST");

    let registry = ServiceProvider::new();
    let added = registry.add_service_info(
        discovered.address,
        discovered.response.service_port,
        discovered.response.monitor_port,
        discovered.response.capability.clone(),
        0,
    );
    assert!(added.is_some());
    assert_eq!(registry.count(), 1);
}
