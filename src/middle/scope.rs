//! Lexical scope tracking for name resolution during lowering

use hashbrown::HashMap;

use crate::{frontend::intern::InternedSymbol, middle::lowering::error::LowerErrorKind};

/// A stack of per-scope binding tables on top of a process wide global table.
///
/// A name may be bound at most once per table, but an inner scope may shadow
/// a binding of any enclosing scope (including the global one).
#[derive(Debug)]
pub struct ScopeStack<R> {
    global_scope: HashMap<InternedSymbol, R>,
    stack: Vec<HashMap<InternedSymbol, R>>,
}

impl<R> Default for ScopeStack<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ScopeStack<R> {
    pub fn new() -> Self {
        Self {
            global_scope: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Creates a new block or function scope
    pub fn push_scope(&mut self) {
        self.stack.push(HashMap::new());
    }

    /// Destroys the current block or function scope
    pub fn pop_scope(&mut self) {
        assert!(
            !self.stack.is_empty(),
            "Attempted to pop a scope from the global context"
        );

        self.stack.pop();
    }

    /// Number of open (non global) scopes
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Binds `symbol` in the current (most nested) scope. Binding a name which
    /// already exists in that same scope leaves the original binding intact.
    pub fn declare(&mut self, symbol: InternedSymbol, binding: R) -> Result<(), LowerErrorKind> {
        let shallow_scope = self
            .stack
            .last_mut()
            .expect("Tried to declare a scoped binding in the global context");

        if shallow_scope.contains_key(&symbol) {
            return Err(LowerErrorKind::Redefinition {
                name: symbol.value().to_owned(),
            });
        }

        shallow_scope.insert(symbol, binding);

        Ok(())
    }

    /// Gets a binding from the global scope
    pub fn get_global_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.global_scope.get(&symbol)
    }

    /// Adds a binding into the global scope which is accessible from all
    /// other scopes
    pub fn declare_global(
        &mut self,
        symbol: InternedSymbol,
        binding: R,
    ) -> Result<(), LowerErrorKind> {
        if self.global_scope.contains_key(&symbol) {
            return Err(LowerErrorKind::Redefinition {
                name: symbol.value().to_owned(),
            });
        }

        self.global_scope.insert(symbol, binding);

        Ok(())
    }

    /// Traverses the scope stack from innermost to outermost looking for a
    /// binding before checking the global scope
    pub fn resolve(&self, symbol: InternedSymbol) -> Result<&R, LowerErrorKind> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(&symbol))
            .or_else(|| self.global_scope.get(&symbol))
            .ok_or_else(|| LowerErrorKind::UndefinedName {
                name: symbol.value().to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> InternedSymbol {
        InternedSymbol::new(name)
    }

    #[test]
    fn inner_scope_shadows_outer_until_popped() {
        let mut scopes = ScopeStack::new();

        scopes.push_scope();
        scopes.declare(sym("x"), "outer").unwrap();

        scopes.push_scope();
        scopes.declare(sym("x"), "inner").unwrap();
        assert_eq!(scopes.resolve(sym("x")), Ok(&"inner"));

        scopes.pop_scope();
        assert_eq!(scopes.resolve(sym("x")), Ok(&"outer"));
    }

    #[test]
    fn redefinition_in_same_scope_keeps_original() {
        let mut scopes = ScopeStack::new();

        scopes.push_scope();
        scopes.declare(sym("x"), 1).unwrap();

        let error = scopes.declare(sym("x"), 2).unwrap_err();

        assert!(matches!(error, LowerErrorKind::Redefinition { ref name } if name == "x"));
        assert_eq!(scopes.resolve(sym("x")), Ok(&1));
    }

    #[test]
    fn globals_are_visible_from_every_scope_and_can_be_shadowed() {
        let mut scopes = ScopeStack::new();

        scopes.declare_global(sym("g"), "global").unwrap();
        assert_eq!(scopes.resolve(sym("g")), Ok(&"global"));

        scopes.push_scope();
        scopes.push_scope();
        assert_eq!(scopes.resolve(sym("g")), Ok(&"global"));

        scopes.declare(sym("g"), "local").unwrap();
        assert_eq!(scopes.resolve(sym("g")), Ok(&"local"));
        assert_eq!(scopes.get_global_binding(sym("g")), Some(&"global"));
    }

    #[test]
    fn global_redefinition_is_rejected() {
        let mut scopes = ScopeStack::new();

        scopes.declare_global(sym("g"), 0).unwrap();

        assert!(matches!(
            scopes.declare_global(sym("g"), 1),
            Err(LowerErrorKind::Redefinition { .. })
        ));
    }

    #[test]
    fn unknown_names_fail_to_resolve() {
        let mut scopes: ScopeStack<()> = ScopeStack::new();
        scopes.push_scope();

        assert_eq!(
            scopes.resolve(sym("missing")),
            Err(LowerErrorKind::UndefinedName {
                name: "missing".to_owned()
            })
        );
    }

    #[test]
    #[should_panic(expected = "Attempted to pop a scope from the global context")]
    fn popping_the_global_context_panics() {
        let mut scopes: ScopeStack<()> = ScopeStack::new();

        scopes.pop_scope();
    }
}
