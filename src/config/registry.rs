// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::pulse::Pulse;
use crate::reaction::{Context, Handler};

/// Produces a fresh handler for each reaction that names it, so handlers
/// with private accumulators never share them across reactions.
pub type HandlerFactory = Rc<dyn Fn() -> Handler>;

/// Name to handler resolution for configuration-built topologies.
#[derive(Clone)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Registry with no handlers at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with `echo` and `collect`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("echo", echo);
        registry.register("collect", collect);
        registry
    }

    /// Add or replace a handler under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Handler + 'static,
    {
        self.factories.insert(name.into(), Rc::new(factory));
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Handler> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn handler<F>(body: F) -> Handler
where
    F: Fn(&Context<'_>, &Pulse) -> anyhow::Result<()> + 'static,
{
    Rc::new(body)
}

/// Re-send the consumed payload on every produced topic.
fn echo() -> Handler {
    handler(|ctx, pulse| {
        let payload = pulse.payload();
        for topic in &ctx.capabilities().produces {
            ctx.send(topic.clone(), payload.clone());
        }
        Ok(())
    })
}

/// Accumulate consumed values and send the running list on every produced topic.
fn collect() -> Handler {
    let collected = Rc::new(RefCell::new(Vec::new()));
    handler(move |ctx, pulse| {
        let snapshot = {
            let mut collected = collected.borrow_mut();
            collected.extend(pulse.payload());
            Value::Array(collected.clone())
        };
        for topic in &ctx.capabilities().produces {
            ctx.send(topic.clone(), [snapshot.clone()]);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::{Reaction, ReactionDescriptor};
    use serde_json::json;

    fn reaction_with(registry: &HandlerRegistry, name: &str) -> Reaction {
        let mut descriptor = ReactionDescriptor::new(name).consumes(["in"]).produces(["out", "copy"]);
        descriptor.handler = registry.resolve(name);
        Reaction::new(descriptor).unwrap()
    }

    fn fire(reaction: &Reaction, values: Vec<Value>) {
        let pulse = Pulse::new("in");
        pulse.extend(values);
        reaction.route(&pulse);
    }

    #[test]
    fn test_builtin_names() {
        let registry = HandlerRegistry::default();

        assert_eq!(registry.names(), vec!["collect", "echo"]);
        assert!(registry.contains("echo"));
        assert!(registry.resolve("missing").is_none());
        assert!(HandlerRegistry::empty().names().is_empty());
    }

    #[test]
    fn test_echo_sends_on_every_produced_topic() {
        let reaction = reaction_with(&HandlerRegistry::new(), "echo");

        fire(&reaction, vec![json!("hi"), json!(2)]);

        let sent: Vec<_> = reaction
            .output()
            .read_pulses()
            .iter()
            .map(|p| (p.topic().to_string(), p.payload()))
            .collect();
        assert_eq!(
            sent,
            vec![
                ("copy".to_string(), vec![json!("hi"), json!(2)]),
                ("out".to_string(), vec![json!("hi"), json!(2)]),
            ]
        );
    }

    #[test]
    fn test_collect_accumulates_per_reaction() {
        let registry = HandlerRegistry::new();
        let first = reaction_with(&registry, "collect");
        let second = reaction_with(&registry, "collect");

        fire(&first, vec![json!(1)]);
        fire(&first, vec![json!(2)]);
        fire(&second, vec![json!(9)]);

        let last = first.output().read_pulses().pop().unwrap();
        assert_eq!(last.value(), json!([1, 2]));
        let only = second.output().read_pulses().pop().unwrap();
        assert_eq!(only.value(), json!([9]));
    }

    #[test]
    fn test_register_custom_handler() {
        let mut registry = HandlerRegistry::empty();
        registry.register("fail", || handler(|_, _| Err(anyhow::anyhow!("always"))));

        let reaction = reaction_with(&registry, "fail");
        fire(&reaction, vec![]);

        let errors = reaction.output().read_pulses();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].topic(), "error");
    }
}
