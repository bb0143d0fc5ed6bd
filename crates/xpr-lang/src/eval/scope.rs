use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::value::Value;

/// Variable storage consulted for names that are not members of the root.
///
/// Scopes form a chain through [`VariableScope::parent`]; lookups walk it
/// front to back and the first scope defining a name wins.
pub trait VariableScope: Send + Sync + fmt::Debug {
    fn get(&self, name: &str) -> Option<Value>;

    /// Stores `value` in the scope that defines `name`; `false` if none does.
    fn assign(&self, name: &str, value: Value) -> bool;

    /// Defines `name` in this scope.
    fn define(&self, name: &str, value: Value);

    fn parent(&self) -> Option<&Arc<dyn VariableScope>> {
        None
    }

    fn is_resolvable(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assigns where `name` is defined, otherwise defines it here.
    fn set(&self, name: &str, value: Value) {
        if self.is_resolvable(name) {
            self.assign(name, value);
        } else {
            self.define(name, value);
        }
    }
}

/// Map-backed [`VariableScope`]. The parent is fixed at construction, so a
/// chain can never loop back on itself.
#[derive(Default)]
pub struct Scope {
    vars: RwLock<FxHashMap<SmolStr, Value>>,
    parent: Option<Arc<dyn VariableScope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<dyn VariableScope>) -> Self {
        Self {
            vars: RwLock::new(FxHashMap::default()),
            parent: Some(parent),
        }
    }

    pub fn with_vars<K: Into<SmolStr>>(vars: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            vars: RwLock::new(vars.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            parent: None,
        }
    }

    /// Names defined directly in this scope.
    pub fn local_names(&self) -> Vec<SmolStr> {
        self.vars.read().keys().cloned().collect()
    }
}

impl VariableScope for Scope {
    fn get(&self, name: &str) -> Option<Value> {
        match self.vars.read().get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    fn assign(&self, name: &str, value: Value) -> bool {
        let mut vars = self.vars.write();
        if let Some(slot) = vars.get_mut(name) {
            *slot = value;
            return true;
        }
        drop(vars);
        self.parent.as_ref().is_some_and(|parent| parent.assign(name, value))
    }

    fn define(&self, name: &str, value: Value) {
        self.vars.write().insert(name.into(), value);
    }

    fn parent(&self) -> Option<&Arc<dyn VariableScope>> {
        self.parent.as_ref()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("vars", &*self.vars.read())
            .field("parent", &self.parent)
            .finish()
    }
}

/// Variables handed to an evaluation: a name to value mapping or a prepared
/// scope chain.
#[derive(Debug, Clone)]
pub struct Variables(pub(crate) Arc<dyn VariableScope>);

impl Variables {
    pub fn scope(&self) -> &Arc<dyn VariableScope> {
        &self.0
    }
}

impl Default for Variables {
    fn default() -> Self {
        Variables(Arc::new(Scope::new()))
    }
}

impl From<()> for Variables {
    fn from(_: ()) -> Self {
        Variables::default()
    }
}

impl From<Scope> for Variables {
    fn from(scope: Scope) -> Self {
        Variables(Arc::new(scope))
    }
}

impl From<Arc<Scope>> for Variables {
    fn from(scope: Arc<Scope>) -> Self {
        Variables(scope)
    }
}

impl From<&Arc<Scope>> for Variables {
    fn from(scope: &Arc<Scope>) -> Self {
        Variables(scope.clone())
    }
}

impl From<Arc<dyn VariableScope>> for Variables {
    fn from(scope: Arc<dyn VariableScope>) -> Self {
        Variables(scope)
    }
}

impl From<&Arc<dyn VariableScope>> for Variables {
    fn from(scope: &Arc<dyn VariableScope>) -> Self {
        Variables(scope.clone())
    }
}

impl From<FxHashMap<SmolStr, Value>> for Variables {
    fn from(vars: FxHashMap<SmolStr, Value>) -> Self {
        Scope::with_vars(vars).into()
    }
}

impl<K: Into<SmolStr>> From<Vec<(K, Value)>> for Variables {
    fn from(vars: Vec<(K, Value)>) -> Self {
        Scope::with_vars(vars).into()
    }
}

impl<K: Into<SmolStr>, const N: usize> From<[(K, Value); N]> for Variables {
    fn from(vars: [(K, Value); N]) -> Self {
        Scope::with_vars(vars).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn chain() -> (Arc<dyn VariableScope>, Scope) {
        let outer: Arc<dyn VariableScope> = Arc::new(Scope::with_vars([("a", Value::from(1)), ("b", Value::from(2))]));
        let inner = Scope::with_parent(outer.clone());
        inner.define("b", Value::from(20));
        (outer, inner)
    }

    #[rstest]
    #[case("a", Some(Value::from(1)))]
    #[case("b", Some(Value::from(20)))]
    #[case("c", None)]
    fn test_lookup_front_to_back(#[case] name: &str, #[case] expected: Option<Value>) {
        let (_, inner) = chain();
        assert_eq!(inner.get(name), expected);
    }

    #[test]
    fn test_assign_updates_defining_scope() {
        let (outer, inner) = chain();
        assert!(inner.assign("a", Value::from(5)));
        assert_eq!(outer.get("a"), Some(Value::from(5)));
        assert!(!inner.assign("missing", Value::Null));
    }

    #[test]
    fn test_set_defines_unknown_in_front() {
        let (outer, inner) = chain();
        inner.set("c", Value::from(3));
        assert_eq!(inner.get("c"), Some(Value::from(3)));
        assert!(!outer.is_resolvable("c"));
        assert_eq!(inner.local_names().len(), 2);
    }

    #[test]
    fn test_variables_from_pairs() {
        let vars = Variables::from([("x", Value::from(1))]);
        assert!(vars.scope().is_resolvable("x"));
        assert!(vars.scope().parent().is_none());
    }
}
