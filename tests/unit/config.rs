extern crate mesh_node;

use mesh_node::node::node_config::*;
use mesh_node::tests::common::*;

#[test]
fn config_file_roundtrip() {
    let data = setup("config_roundtrip", false);
    let mut config = NodeConfig::new();
    config.address = String::from("0A");
    config.work_dir = data.work_dir.clone();
    config.random_seed = 12345;
    config.radio.mode = RadioMode::Simulated;
    config.aodv = Some(AodvParams {
        rreq_ttl: Some(4),
        route_lifetime: Some(5000),
        discovery_timeout: Some(2000),
        ..Default::default()
    });

    let file = format!("{}/node.toml", &data.work_dir);
    let written = config.write_to_file(&file).expect("Could not write configuration");
    let loaded = NodeConfig::load(&written).expect("Could not load configuration");

    assert_eq!(loaded, config);
    teardown(data);
}

#[test]
fn config_builds_a_node_with_its_routing_params() {
    let mut config = NodeConfig::new();
    config.address = String::from("0B");
    config.radio.mode = RadioMode::Simulated;
    config.aodv = Some(AodvParams {
        rreq_ttl: Some(4),
        ..Default::default()
    });

    let node = config
        .create_node(mesh_node::logging::create_discard_logger())
        .expect("Could not create node");
    assert_eq!(node.get_address(), "0B");
    assert_eq!(node.state().broadcast_id(), 0);
}

#[test]
fn invalid_address_is_rejected() {
    let mut config = NodeConfig::new();
    config.address = String::from("0 1");
    config.radio.mode = RadioMode::Simulated;

    assert!(config
        .create_node(mesh_node::logging::create_discard_logger())
        .is_err());
}
