//! Action registry
//!
//! Name to handler mapping consulted by the engine at dispatch time.
//! Registering an existing name replaces the previous handler.

use super::types::Variables;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One unit of workflow work
///
/// A handler returning an object has it merged into the variable store; any
/// other value is only reported.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(
        &self,
        prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value>;
}

pub type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Adapts a closure into an [`ActionHandler`]
///
/// The closure receives owned copies so the returned future can be `'static`.
pub struct FnAction<F> {
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(String, Map<String, Value>, Variables) -> BoxedFuture + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(String, Map<String, Value>, Variables) -> BoxedFuture + Send + Sync,
{
    async fn call(
        &self,
        prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        (self.func)(prompt.to_string(), params.clone(), variables.clone()).await
    }
}

/// Synchronous closure handler
struct SyncAction<F> {
    func: F,
}

#[async_trait]
impl<F> ActionHandler for SyncAction<F>
where
    F: Fn(&str, &Map<String, Value>, &Variables) -> Result<Value> + Send + Sync,
{
    async fn call(
        &self,
        prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        (self.func)(prompt, params, variables)
    }
}

#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.actions.insert(name.into(), handler);
    }

    /// Registers a plain synchronous function
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&str, &Map<String, Value>, &Variables) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(SyncAction { func }));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_get() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("echo", |prompt, _, _| Ok(json!({ "last": prompt })));

        let handler = registry.get("echo").unwrap();
        let result = handler.call("hi", &Map::new(), &Map::new()).await.unwrap();
        assert_eq!(result, json!({"last": "hi"}));
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("greet", |_, _, _| Ok(json!("first")));
        registry.register_fn("greet", |_, _, _| Ok(json!("second")));

        assert_eq!(registry.len(), 1);
        let result = registry
            .get("greet")
            .unwrap()
            .call("", &Map::new(), &Map::new())
            .await
            .unwrap();
        assert_eq!(result, json!("second"));
    }

    #[tokio::test]
    async fn test_async_closure_handler() {
        let mut registry = ActionRegistry::new();
        registry.register(
            "shout",
            Arc::new(FnAction::new(|prompt: String, _params, _vars| {
                Box::pin(async move { Ok(json!({ "loud": prompt.to_uppercase() })) })
                    as BoxedFuture
            })),
        );

        let result = registry
            .get("shout")
            .unwrap()
            .call("hey", &Map::new(), &Map::new())
            .await
            .unwrap();
        assert_eq!(result["loud"], "HEY");
    }

    #[test]
    fn test_list_names_sorted() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("b", |_, _, _| Ok(Value::Null));
        registry.register_fn("a", |_, _, _| Ok(Value::Null));
        let names: Vec<_> = registry.list_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
