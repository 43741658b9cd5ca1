// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod bridge;     // async byte transport pump
pub mod config;     // config + handler registry
pub mod errors;     // error handling
pub mod graph;      // composition: nodes and elements
pub mod observability;
pub mod pulse;      // the message envelope
pub mod reaction;   // handler leaves
pub mod router;     // hierarchical routing
pub mod stream;     // backpressured pulse streams
