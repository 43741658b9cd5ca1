// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for router classification, topology and state events.
//!
//! This module contains message types for logging events related to:
//! * External pulses rejected by capability gating
//! * Children attached to or detached from a router
//! * Capability cache invalidation
//! * Enable/disable transitions and state saves

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An external pulse did not match the router's inputs and was dropped.
///
/// # Log Level
/// `debug!` - Routine gating decision
pub struct PulseDropped<'a> {
    pub router: &'a str,
    pub topic: &'a str,
}

impl Display for PulseDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Router '{}' dropped '{}'", self.router, self.topic)
    }
}

impl StructuredLog for PulseDropped<'_> {
    fn log(&self) {
        tracing::debug!(router = self.router, topic = self.topic, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "pulse_dropped",
            span_name = name,
            router = self.router,
            topic = self.topic,
        )
    }
}

/// A reaction or nested router was attached.
///
/// # Log Level
/// `info!` - Topology change
///
/// # Example
/// ```
/// use kinetic_flow::observability::messages::router::ChildAttached;
///
/// let msg = ChildAttached {
///     router: "link",
///     child: "connect",
///     kind: "reaction",
/// };
///
/// assert_eq!(msg.to_string(), "Router 'link' attached reaction 'connect'");
/// ```
pub struct ChildAttached<'a> {
    pub router: &'a str,
    pub child: &'a str,
    pub kind: &'a str,
}

impl Display for ChildAttached<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Router '{}' attached {} '{}'",
            self.router, self.kind, self.child
        )
    }
}

impl StructuredLog for ChildAttached<'_> {
    fn log(&self) {
        tracing::info!(
            router = self.router,
            child = self.child,
            kind = self.kind,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "child_attached",
            span_name = name,
            router = self.router,
            child = self.child,
            kind = self.kind,
        )
    }
}

/// A reaction or nested router was detached.
///
/// # Log Level
/// `info!` - Topology change
pub struct ChildDetached<'a> {
    pub router: &'a str,
    pub child: &'a str,
}

impl Display for ChildDetached<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Router '{}' detached '{}'", self.router, self.child)
    }
}

impl StructuredLog for ChildDetached<'_> {
    fn log(&self) {
        tracing::info!(router = self.router, child = self.child, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "child_detached",
            span_name = name,
            router = self.router,
            child = self.child,
        )
    }
}

/// The capability cache was invalidated.
///
/// # Log Level
/// `debug!` - Internal bookkeeping
pub struct CacheInvalidated<'a> {
    pub router: &'a str,
}

impl Display for CacheInvalidated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Router '{}' clearing capability cache", self.router)
    }
}

impl StructuredLog for CacheInvalidated<'_> {
    fn log(&self) {
        tracing::debug!(router = self.router, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("cache_invalidated", span_name = name, router = self.router)
    }
}

/// The router was enabled or disabled.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct RouterToggled<'a> {
    pub router: &'a str,
    pub enabled: bool,
}

impl Display for RouterToggled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let state = if self.enabled { "enabled" } else { "disabled" };
        write!(f, "Router '{}' {}", self.router, state)
    }
}

impl StructuredLog for RouterToggled<'_> {
    fn log(&self) {
        tracing::info!(router = self.router, enabled = self.enabled, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "router_toggled",
            span_name = name,
            router = self.router,
            enabled = self.enabled,
        )
    }
}

/// Persisted state changed.
///
/// # Log Level
/// `debug!` - State bookkeeping
pub struct StateSaved<'a> {
    pub router: &'a str,
    pub changed: &'a [String],
    pub fed: bool,
}

impl Display for StateSaved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Router '{}' saved state for [{}]",
            self.router,
            self.changed.join(", ")
        )?;
        if self.fed {
            write!(f, " and fed changes into its core")?;
        }
        Ok(())
    }
}

impl StructuredLog for StateSaved<'_> {
    fn log(&self) {
        tracing::debug!(
            router = self.router,
            changed = ?self.changed,
            fed = self.fed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "state_saved",
            span_name = name,
            router = self.router,
            changed = ?self.changed,
            fed = self.fed,
        )
    }
}
