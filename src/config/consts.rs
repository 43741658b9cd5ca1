// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Buffered writes a stream accepts before it reports backpressure
pub const DEFAULT_HIGH_WATER_MARK: usize = 100;
/// Destinations a stream may pipe to before a warning is logged
pub const DEFAULT_MAX_FLOWS: usize = 30;
/// Longest newline-delimited frame the io adapter will decode (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;
/// Filter directive used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "kinetic_flow=info";
