//! Scope
//!
//! A component's single reactive state container: an observable record with a
//! key set fixed at construction and at most one subscriber. Every effective
//! write invokes the subscriber synchronously after the value is committed.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{QuakeError, Result};
use crate::value::{Context, Value};

pub(crate) type Subscriber = Rc<dyn Fn() -> Result<()>>;

struct ScopeInner {
    state: RefCell<Context>,
    subscriber: RefCell<Option<Subscriber>>,
}

/// Cheap handle; clones share the same state and subscriber.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new(initial: Context) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                state: RefCell::new(initial),
                subscriber: RefCell::new(None),
            }),
        }
    }

    /// Builds a scope from any value serializing to a JSON object.
    pub fn from_state<T: Serialize>(state: &T) -> Result<Self> {
        match serde_json::to_value(state)? {
            serde_json::Value::Object(map) => Ok(Self::new(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            )),
            other => Err(QuakeError::InvalidScopeShape {
                found: json_type_name(&other),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().get(key).cloned()
    }

    /// Current state, detached from the scope.
    pub fn snapshot(&self) -> Context {
        self.inner.state.borrow().clone()
    }

    /// Declared keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.state.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Writes `value` under `key`.
    ///
    /// Returns `Ok(false)` when the stored value already equals `value`; no
    /// notification happens in that case. Unknown keys fail with
    /// [`QuakeError::InvalidScopeKey`] and leave the state untouched. Errors
    /// raised by the subscriber propagate to the caller.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        {
            let mut state = self.inner.state.borrow_mut();
            let slot = state.get_mut(key).ok_or_else(|| QuakeError::InvalidScopeKey {
                key: key.to_string(),
            })?;
            if *slot == value {
                return Ok(false);
            }
            *slot = value;
        }
        self.notify()?;
        Ok(true)
    }

    pub fn update<F>(&self, key: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self.get(key).ok_or_else(|| QuakeError::InvalidScopeKey {
            key: key.to_string(),
        })?;
        self.set(key, f(&current))
    }

    /// Installs `f` as the sole subscriber, replacing any previous one.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.subscribe_shared(Rc::new(f));
    }

    pub(crate) fn subscribe_shared(&self, subscriber: Subscriber) {
        *self.inner.subscriber.borrow_mut() = Some(subscriber);
    }

    pub fn unsubscribe(&self) {
        self.inner.subscriber.borrow_mut().take();
    }

    /// Removes `subscriber` unless another one replaced it in the meantime.
    pub(crate) fn unsubscribe_if(&self, subscriber: &Subscriber) {
        let mut slot = self.inner.subscriber.borrow_mut();
        if slot
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, subscriber))
        {
            *slot = None;
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.subscriber.borrow().is_some()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn notify(&self) -> Result<()> {
        // cloned out so the subscriber may re-enter set/subscribe
        let subscriber = self.inner.subscriber.borrow().clone();
        match subscriber {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("state", &self.inner.state.borrow())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter_scope() -> Scope {
        let mut initial = Context::new();
        initial.insert("count".to_string(), Value::from(0));
        initial.insert("label".to_string(), Value::from("x"));
        Scope::new(initial)
    }

    fn counting_subscriber(scope: &Scope) -> Rc<Cell<usize>> {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        scope.subscribe(move || {
            seen.set(seen.get() + 1);
            Ok(())
        });
        calls
    }

    #[test]
    fn test_same_value_notifies_once() {
        let scope = counter_scope();
        let calls = counting_subscriber(&scope);

        assert!(scope.set("count", 1).unwrap());
        assert!(!scope.set("count", 1).unwrap());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let scope = counter_scope();
        let calls = counting_subscriber(&scope);

        let err = scope.set("missing", 1).unwrap_err();
        assert!(matches!(err, QuakeError::InvalidScopeKey { ref key } if key == "missing"));
        assert_eq!(scope.keys(), vec!["count", "label"]);
        assert_eq!(scope.get("missing"), None);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_subscribe_replaces_and_unsubscribe_silences() {
        let scope = counter_scope();
        let first = counting_subscriber(&scope);
        let second = counting_subscriber(&scope);

        scope.set("count", 1).unwrap();
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);

        scope.unsubscribe();
        scope.set("count", 2).unwrap();
        assert_eq!(second.get(), 1);
        assert_eq!(scope.get("count"), Some(Value::from(2)));
    }

    #[test]
    fn test_unsubscribe_if_leaves_replacement_installed() {
        let scope = counter_scope();
        let calls = Rc::new(Cell::new(0));
        let stale: Subscriber = Rc::new(|| Ok(()));
        scope.subscribe_shared(stale.clone());
        let seen = calls.clone();
        scope.subscribe(move || {
            seen.set(seen.get() + 1);
            Ok(())
        });

        scope.unsubscribe_if(&stale);
        scope.set("count", 1).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_subscriber_reads_committed_value() {
        let scope = counter_scope();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let handle = scope.clone();
        let sink = observed.clone();
        scope.subscribe(move || {
            sink.borrow_mut().push(handle.get("label"));
            Ok(())
        });

        scope.update("label", |v| Value::from(format!("{}*", v.to_display_string())))
            .unwrap();
        assert_eq!(*observed.borrow(), vec![Some(Value::from("x*"))]);
    }

    #[test]
    fn test_subscriber_error_propagates() {
        let scope = counter_scope();
        scope.subscribe(|| {
            Err(QuakeError::UnknownComponent {
                tag: "quake-x".into(),
            })
        });
        assert!(scope.set("count", 5).is_err());
        assert_eq!(scope.get("count"), Some(Value::from(5)));
    }

    #[test]
    fn test_from_state() {
        #[derive(Serialize)]
        struct State {
            items: Vec<&'static str>,
            visible: bool,
        }

        let scope = Scope::from_state(&State {
            items: vec!["a"],
            visible: true,
        })
        .unwrap();
        assert_eq!(scope.keys(), vec!["items", "visible"]);

        let err = Scope::from_state(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, QuakeError::InvalidScopeShape { found: "array" }));
    }
}
