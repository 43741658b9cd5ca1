// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation for topology integrity.
//!
//! Runs before anything is built, so a bad file never produces a partially
//! attached router tree. Checks accumulate: every problem in the file is
//! reported together.
//!
//! # Checks
//!
//! 1. **Labels**: every router and reaction has a non-empty label
//! 2. **Uniqueness**: explicit ids are unique across the whole tree
//! 3. **Reachability**: a reaction with a handler consumes or requires at least one topic
//!
//! Handler names are not checked here; resolving them needs a
//! `HandlerRegistry` and happens in `TopologyBuilder`.
//!
//! # Example
//! ```rust
//! use kinetic_flow::config::{validate_topology, RouterConfig};
//!
//! let topology: RouterConfig = serde_yaml::from_str("label: root").unwrap();
//! assert!(validate_topology(&topology).is_ok());
//! ```

use std::collections::HashSet;

use crate::config::{ReactionConfig, RouterConfig};
use crate::errors::ValidationError;

/// Validate a router tree, returning every problem found.
pub fn validate_topology(root: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut path = Vec::new();

    walk(root, &mut path, &mut seen_ids, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn walk<'a>(
    router: &'a RouterConfig,
    path: &mut Vec<String>,
    seen_ids: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    if router.label.trim().is_empty() {
        errors.push(ValidationError::MissingLabel { path: path.clone() });
    }
    check_unique(router.id.as_deref(), seen_ids, errors);

    path.push(display_label(&router.label));
    for reaction in &router.reactions {
        check_reaction(reaction, path, seen_ids, errors);
    }
    for nested in &router.routers {
        walk(nested, path, seen_ids, errors);
    }
    path.pop();
}

fn check_reaction<'a>(
    reaction: &'a ReactionConfig,
    path: &[String],
    seen_ids: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    if reaction.label.trim().is_empty() {
        errors.push(ValidationError::MissingLabel { path: path.to_vec() });
    }
    check_unique(reaction.id.as_deref(), seen_ids, errors);

    if reaction.handler.is_some() && reaction.consumes.is_empty() && reaction.requires.is_empty() {
        errors.push(ValidationError::UnreachableReaction {
            reaction: display_label(&reaction.label),
        });
    }
}

fn check_unique<'a>(id: Option<&'a str>, seen_ids: &mut HashSet<&'a str>, errors: &mut Vec<ValidationError>) {
    if let Some(id) = id {
        if !seen_ids.insert(id) {
            errors.push(ValidationError::DuplicateId { id: id.to_string() });
        }
    }
}

fn display_label(label: &str) -> String {
    if label.trim().is_empty() {
        "<unlabeled>".to_string()
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(yaml: &str) -> RouterConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_validate_topology_table_driven() {
        struct TestCase {
            name: &'static str,
            yaml: &'static str,
            expected: Vec<ValidationError>,
        }

        let test_cases = vec![
            TestCase {
                name: "minimal router",
                yaml: "label: root",
                expected: vec![],
            },
            TestCase {
                name: "missing root label",
                yaml: "passive: true",
                expected: vec![ValidationError::MissingLabel { path: vec![] }],
            },
            TestCase {
                name: "missing nested label",
                yaml: r#"
label: root
routers:
  - label: net
    routers:
      - passive: true
"#,
                expected: vec![ValidationError::MissingLabel {
                    path: vec!["root".to_string(), "net".to_string()],
                }],
            },
            TestCase {
                name: "duplicate id across levels",
                yaml: r#"
label: root
reactions:
  - id: shared
    label: a
    consumes: [x]
routers:
  - id: shared
    label: nested
"#,
                expected: vec![ValidationError::DuplicateId { id: "shared".to_string() }],
            },
            TestCase {
                name: "handler without inputs",
                yaml: r#"
label: root
reactions:
  - label: lonely
    handler: echo
    produces: [out]
"#,
                expected: vec![ValidationError::UnreachableReaction { reaction: "lonely".to_string() }],
            },
            TestCase {
                name: "sink without handler is allowed",
                yaml: r#"
label: root
reactions:
  - label: sink
"#,
                expected: vec![],
            },
            TestCase {
                name: "requires alone is enough",
                yaml: r#"
label: root
reactions:
  - label: waiter
    handler: collect
    requires: [module/net]
"#,
                expected: vec![],
            },
        ];

        for case in test_cases {
            let result = validate_topology(&topology(case.yaml));
            let errors = result.err().unwrap_or_default();
            assert_eq!(errors, case.expected, "case '{}'", case.name);
        }
    }

    #[test]
    fn test_error_messages() {
        let errors = validate_topology(&topology(
            r#"
label: root
reactions:
  - label: ""
"#,
        ))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Element under 'root' is missing a label");
    }
}
