//! Module namespaces and scoped rebinding of their functions.

use mutant_core::{Error, Result};
use mutant_ir::{validate_function, Function};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Serialised form of a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub functions: Vec<Function>,
}

impl ModuleSpec {
    /// Load from JSON (`.json`) or bincode (any other extension)
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let spec: ModuleSpec = if path.extension().map_or(false, |ext| ext == "json") {
            serde_json::from_slice(&bytes)?
        } else {
            bincode::deserialize(&bytes)?
        };
        info!("Loaded module {} from {:?}", spec.name, path);
        Ok(spec)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = if path.extension().map_or(false, |ext| ext == "json") {
            serde_json::to_vec_pretty(self)?
        } else {
            bincode::serialize(self)?
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Validate every function and bind it into a fresh module
    pub fn into_module(self) -> Result<Module> {
        let module = Module::new(&self.name);
        if let Some(doc) = self.doc {
            module.set_doc(doc);
        }
        for function in self.functions {
            validate_function(&function)?;
            module.define(function);
        }
        Ok(module)
    }
}

/// A named collection of functions, bound by name
pub struct Module {
    name: String,
    doc: RwLock<Option<String>>,
    bindings: RwLock<BTreeMap<String, Arc<Function>>>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            doc: RwLock::new(None),
            bindings: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<String> {
        self.doc.read().clone()
    }

    pub fn set_doc(&self, doc: String) {
        *self.doc.write() = Some(doc);
    }

    /// Bind a function under its own name, replacing any previous binding
    pub fn define(&self, function: Function) -> Arc<Function> {
        let function = Arc::new(function);
        self.bindings
            .write()
            .insert(function.name.clone(), Arc::clone(&function));
        function
    }

    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.bindings.read().get(name).cloned()
    }

    /// Functions currently bound, ordered by name
    pub fn functions(&self) -> Vec<(String, Arc<Function>)> {
        self.bindings
            .read()
            .iter()
            .map(|(name, f)| (name.clone(), Arc::clone(f)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Take control of a binding; the original is rebound when the lease drops
    pub fn lease(&self, name: &str) -> Result<Lease<'_>> {
        let original = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("{}.{}", self.name, name)))?;
        Ok(Lease {
            module: self,
            name: name.to_string(),
            original,
        })
    }

    pub fn to_spec(&self) -> ModuleSpec {
        ModuleSpec {
            name: self.name.clone(),
            doc: self.doc(),
            functions: self
                .functions()
                .into_iter()
                .map(|(_, f)| (*f).clone())
                .collect(),
        }
    }

    fn bind(&self, name: &str, function: Arc<Function>) {
        self.bindings.write().insert(name.to_string(), function);
    }
}

/// Exclusive use of one module binding.
///
/// The binding always points back at the original function once the lease
/// is dropped, including during unwinding.
pub struct Lease<'m> {
    module: &'m Module,
    name: String,
    original: Arc<Function>,
}

impl Lease<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original(&self) -> &Arc<Function> {
        &self.original
    }

    /// Make `function` the active implementation behind the leased name
    pub fn install(&mut self, function: Function) -> Arc<Function> {
        let function = Arc::new(function);
        self.module.bind(&self.name, Arc::clone(&function));
        function
    }

    pub fn restore(&self) {
        self.module.bind(&self.name, Arc::clone(&self.original));
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.restore();
        debug!("Restored {}.{}", self.module.name, self.name);
    }
}
