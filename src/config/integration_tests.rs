// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use crate::config::{load_and_validate_config, HandlerRegistry, TopologyBuilder};
use crate::graph::NodeId;
use crate::stream::Chunk;

/// The sample echo topology loads and answers pings
#[test]
fn test_echo_yaml_round_trip() {
    let config = load_and_validate_config("configs/echo.yaml").unwrap();
    assert_eq!(config.logging.get_filter(), "kinetic_flow=info");

    let root = TopologyBuilder::new(config.engine.clone())
        .build(&config.topology, &HandlerRegistry::new())
        .unwrap();
    let adapter = root.io();

    adapter.write("{\"topic\":\"ping\",\"payload\":[1]}\n");

    let output = String::from_utf8(adapter.read_all().to_vec()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines, vec![r#"{"topic":"pong","payload":[1]}"#]);
}

/// The nested network sample loads with engine overrides and seeded state
#[test]
fn test_network_yaml_loading() {
    let config = load_and_validate_config("configs/network.yaml").unwrap();

    assert_eq!(config.engine.get_high_water_mark(), 64);
    assert_eq!(config.engine.get_max_flows(), 16);
    assert_eq!(config.engine.get_max_line_length(), 16384);
    assert!(config.topology.passive);
    assert_eq!(config.topology.routers.len(), 2);
    assert_eq!(config.topology.routers[0].reactions[0].requires, vec!["module/net"]);

    let root = TopologyBuilder::new(config.engine.clone())
        .build(&config.topology, &HandlerRegistry::new())
        .unwrap();
    assert!(root.contains(&NodeId::from("net-connect")));
    assert!(root.inputs().contains("ws/connect"));
    assert_eq!(root.core().high_water_mark(), 64);
}

/// YAML and TOML renditions of the same router agree
#[test]
fn test_network_toml_matches_yaml() {
    let yaml = load_and_validate_config("configs/network.yaml").unwrap();
    let toml = load_and_validate_config("configs/network.toml").unwrap();

    let from_yaml = &yaml.topology.routers[0];
    let from_toml = &toml.topology.routers[0];
    assert_eq!(from_yaml.id, from_toml.id);
    assert_eq!(from_yaml.state["retries"], from_toml.state["retries"]);
    assert_eq!(from_yaml.reactions[0].consumes, from_toml.reactions[0].consumes);
    assert_eq!(from_yaml.reactions[0].produces, from_toml.reactions[0].produces);
}

/// A connect request waits for its requirement, then the socket leaves the passive root
#[test]
fn test_network_topology_runs() {
    let config = load_and_validate_config("configs/network.yaml").unwrap();
    let root = TopologyBuilder::new(config.engine.clone())
        .build(&config.topology, &HandlerRegistry::new())
        .unwrap();

    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&out);
    root.boundary().tap(move |chunk: &Chunk| {
        if let Some(pulse) = chunk.as_pulse() {
            sink.borrow_mut().push((pulse.topic().to_string(), pulse.value()));
        }
    });

    root.feed("net/connect", [json!("early")]);
    root.feed("module/net", [json!(true)]);
    root.feed("net/connect", [json!("example.org")]);
    root.feed("ws/connect", [json!("a")]);
    root.feed("ws/connect", [json!("b")]);

    let emitted: Vec<_> = out
        .borrow()
        .iter()
        .filter(|(topic, _)| topic == "net/socket" || topic == "ws/sessions")
        .cloned()
        .collect();
    assert_eq!(
        emitted,
        vec![
            ("net/socket".to_string(), json!("example.org")),
            ("ws/sessions".to_string(), json!(["a"])),
            ("ws/sessions".to_string(), json!(["a", "b"])),
        ]
    );
}
