//! Tool registry: aggregates built-in tools and dynamic tool-sets, and
//! checks name uniqueness across both.

use crate::error::{Error, Result};
use crate::value::{Parameter, Tool, ToolSet, ToolSpec};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A `Tool` built from a closure, for the common case of registering a
/// handful of ad-hoc functions without writing a dedicated struct.
pub struct ClosureTool<F> {
    spec: ToolSpec,
    handler: F,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

#[async_trait]
impl<F> Tool for ClosureTool<F>
where
    F: Fn(Map<String, Value>) -> HandlerFuture + Send + Sync,
{
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn run(&self, args: Map<String, Value>) -> Result<Value> {
        (self.handler)(args).await
    }
}

/// Fluent builder for a tool's schema and handler, mirroring the teacher's
/// `ToolBuilder`/`tool()` ergonomics but generalized to the spec's nested
/// JSON-Schema-like parameters.
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: BTreeMap<String, Parameter>,
    required: Vec<String>,
}

/// Start building a tool with the given name and description.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolBuilder {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, param: Parameter, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.parameters.insert(name, param);
        self
    }

    /// Finish the tool with a handler. The handler receives the raw argument
    /// map exactly as the provider produced it (post JSON-decode).
    pub fn handler<F, Fut>(self, handler: F) -> Result<Arc<dyn Tool>>
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let spec = ToolSpec {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            required: self.required,
        };
        spec.validate()?;
        let wrapped = move |args: Map<String, Value>| -> HandlerFuture { Box::pin(handler(args)) };
        Ok(Arc::new(ClosureTool {
            spec,
            handler: wrapped,
        }))
    }
}

/// Aggregates built-in tools and dynamic tool-sets behind a single namespace,
/// detecting name conflicts once at construction time rather than on every
/// dispatch.
pub struct ToolRegistry {
    built_ins: BTreeMap<String, Arc<dyn Tool>>,
    tool_sets: Vec<Arc<dyn ToolSet>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            built_ins: BTreeMap::new(),
            tool_sets: Vec::new(),
        }
    }

    /// Build a registry from built-in tools and tool-sets, failing with
    /// `ToolNameConflict` if any two names collide — across built-ins, or
    /// between a built-in and any tool-set's current specs.
    pub async fn build(
        built_ins: Vec<Arc<dyn Tool>>,
        tool_sets: Vec<Arc<dyn ToolSet>>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for t in built_ins {
            let name = t.spec().name.clone();
            if map.insert(name.clone(), t).is_some() {
                return Err(Error::tool_name_conflict(name));
            }
        }

        let mut seen: std::collections::BTreeSet<String> = map.keys().cloned().collect();
        for ts in &tool_sets {
            for spec in ts.specs().await? {
                if !seen.insert(spec.name.clone()) {
                    return Err(Error::tool_name_conflict(spec.name));
                }
            }
        }

        Ok(ToolRegistry {
            built_ins: map,
            tool_sets,
        })
    }

    /// All tool specs currently visible to the LLM: built-ins first, then
    /// each tool-set's specs in registration order.
    pub async fn all_specs(&self) -> Result<Vec<ToolSpec>> {
        let mut specs: Vec<ToolSpec> = self.built_ins.values().map(|t| t.spec()).collect();
        for ts in &self.tool_sets {
            specs.extend(ts.specs().await?);
        }
        Ok(specs)
    }

    /// Run a single named tool call. Built-ins are checked first; if not
    /// found, each tool-set is tried in registration order until one
    /// recognizes the name (detected via its current `specs()`).
    pub async fn run(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        if let Some(t) = self.built_ins.get(name) {
            return t.run(args).await;
        }
        for ts in &self.tool_sets {
            let specs = ts.specs().await?;
            if specs.iter().any(|s| s.name == name) {
                return ts.run(name, args).await;
            }
        }
        Err(Error::invalid_parameter(format!("unknown tool '{name}'")))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParameterType;

    struct EchoToolSet {
        name: String,
    }

    #[async_trait]
    impl ToolSet for EchoToolSet {
        async fn specs(&self) -> Result<Vec<ToolSpec>> {
            Ok(vec![ToolSpec::new(&self.name, "echoes its input")])
        }

        async fn run(&self, _name: &str, args: Map<String, Value>) -> Result<Value> {
            Ok(Value::Object(args))
        }
    }

    fn add_tool() -> Arc<dyn Tool> {
        tool("add", "adds two numbers")
            .param("a", Parameter::new(ParameterType::Number), true)
            .param("b", Parameter::new(ParameterType::Number), true)
            .handler(|args| async move {
                let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(serde_json::json!({ "result": a + b }))
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_registry_runs_built_in_tool() {
        let registry = ToolRegistry::build(vec![add_tool()], vec![]).await.unwrap();
        let mut args = Map::new();
        args.insert("a".into(), serde_json::json!(5));
        args.insert("b".into(), serde_json::json!(3));
        let result = registry.run("add", args).await.unwrap();
        assert_eq!(result["result"], 8.0);
    }

    #[tokio::test]
    async fn test_registry_detects_built_in_conflict() {
        let err = ToolRegistry::build(vec![add_tool(), add_tool()], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNameConflict(_)));
    }

    #[tokio::test]
    async fn test_registry_detects_tool_set_conflict_s2() {
        let set_a = Arc::new(EchoToolSet {
            name: "search".into(),
        });
        let set_b = Arc::new(EchoToolSet {
            name: "search".into(),
        });
        let err = ToolRegistry::build(vec![], vec![set_a, set_b])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNameConflict(_)));
    }

    #[tokio::test]
    async fn test_registry_dispatches_to_tool_set() {
        let set = Arc::new(EchoToolSet {
            name: "echo".into(),
        });
        let registry = ToolRegistry::build(vec![], vec![set]).await.unwrap();
        let mut args = Map::new();
        args.insert("x".into(), serde_json::json!(1));
        let result = registry.run("echo", args).await.unwrap();
        assert_eq!(result["x"], 1);
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_errors() {
        let registry = ToolRegistry::build(vec![], vec![]).await.unwrap();
        let err = registry.run("nope", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
