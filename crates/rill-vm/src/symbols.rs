use hashbrown::HashMap;

/// Where a resolved name lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Slot in the VM's globals array.
    Global,
    /// Slot above the current frame's base pointer.
    Local,
    /// Index into the built-in registry.
    Builtin,
    /// Slot in the current closure's free list.
    Free,
    /// The function currently being compiled, for self-recursion.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One frame of the lexical scope chain.
///
/// `free_symbols` records, in first-seen order, the *outer* symbols this
/// scope captures. The compiler replays that list to push the captured
/// values before emitting `Closure`, so the order here fixes the `GetFree`
/// operands inside the function body.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    pub free_symbols: Vec<Symbol>,
    store: HashMap<String, Symbol>,
    definitions: usize,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Wrap `outer` as the parent of a fresh scope.
    pub fn enclosed(outer: SymbolTable) -> SymbolTable {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Tear a scope apart when the compiler leaves it.
    pub fn into_parts(self) -> (Option<SymbolTable>, Vec<Symbol>) {
        (self.outer.map(|outer| *outer), self.free_symbols)
    }

    /// Number of names defined directly in this scope; the compiled
    /// function's `num_locals`.
    pub fn num_definitions(&self) -> usize {
        self.definitions
    }

    /// Bind `name` to the next index in this scope. Global in the
    /// outermost frame, Local everywhere else. Redefinition overwrites.
    pub fn define(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: if self.outer.is_none() {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            },
            index: self.definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.definitions += 1;
        symbol
    }

    /// Seed a built-in at its registry index. Done once, in the outermost
    /// frame, before user code is compiled.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind the name of the function currently being compiled, so its body
    /// can recurse without capturing itself.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolve `name`, walking outward. A hit in an enclosing frame whose
    /// scope is not directly addressable from here (anything but Global or
    /// Builtin) is promoted: the original symbol joins this frame's
    /// free list and the name rebinds as Free.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let name = original.name.clone();
        self.free_symbols.push(original);
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }
}
