// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod codec;
mod config;
mod graph;
mod stream;

pub use codec::CodecError;
pub use config::{ConfigError, ValidationError};
pub use graph::GraphError;
pub use stream::StreamError;
