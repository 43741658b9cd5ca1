// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::rc::Rc;

use anyhow::Context;
use kinetic_flow::bridge;
use kinetic_flow::config::{load_and_validate_config, HandlerRegistry, TopologyBuilder};
use kinetic_flow::observability::init_tracing;
use kinetic_flow::stream::{IoAdapter, JsonLineCodec};

fn usage(program: &str) {
    eprintln!("Usage: {} <topology.yaml|topology.toml> [--inspect]", program);
    eprintln!("Example: {} configs/echo.yaml < requests.jsonl", program);
    eprintln!("Inspect: {} configs/network.yaml --inspect", program);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1).filter(|arg| !arg.starts_with("--")) else {
        usage(args.first().map(String::as_str).unwrap_or("kinetic-flow"));
        std::process::exit(1);
    };
    let inspect = args.iter().skip(2).any(|arg| arg == "--inspect");

    let config = load_and_validate_config(path).with_context(|| format!("loading topology from {}", path))?;
    init_tracing(config.logging.get_filter());

    let root = TopologyBuilder::new(config.engine.clone())
        .build(&config.topology, &HandlerRegistry::new())
        .context("building topology")?;

    if inspect {
        println!("{}", serde_json::to_string_pretty(&root.inspect())?);
        return Ok(());
    }

    let adapter = IoAdapter::with_max_line_length(
        root.boundary(),
        Rc::new(JsonLineCodec),
        config.engine.get_max_line_length(),
    );
    bridge::serve(&adapter, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("bridging stdio")?;
    Ok(())
}
