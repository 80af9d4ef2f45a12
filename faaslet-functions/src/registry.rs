//! Function registry and its storage backends
//!
//! The registry owns function identity; the store behind it decides durability.
//! Both stores keep the whole map behind a single lock, registrations being rare.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::function::Function;

/// File name of the persisted registry inside the data directory
pub const REGISTRY_FILE: &str = "functions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("function not found: {0}")]
    NotFound(String),

    #[error("invalid function: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage backend for registered functions
pub trait FunctionStore: Send + Sync {
    /// Insert a function, replacing any entry with the same ID
    fn put(&self, function: Function) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Option<Function>;

    fn list(&self) -> Vec<Function>;
}

/// Non-durable store
#[derive(Debug, Default)]
pub struct MemoryStore {
    functions: Mutex<HashMap<String, Function>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FunctionStore for MemoryStore {
    fn put(&self, function: Function) -> Result<(), StoreError> {
        self.functions.lock().insert(function.id.clone(), function);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Function> {
        self.functions.lock().get(id).cloned()
    }

    fn list(&self) -> Vec<Function> {
        self.functions.lock().values().cloned().collect()
    }
}

/// Store persisted as a JSON object keyed by function ID.
///
/// The file is rewritten in full on every registration.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    functions: Mutex<HashMap<String, Function>>,
}

impl JsonFileStore {
    /// Open the registry file inside `data_dir`, creating the directory if needed.
    ///
    /// A missing or unreadable file yields an empty registry.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let path = data_dir.join(REGISTRY_FILE);
        let functions = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<HashMap<String, Function>>(&data) {
                Ok(functions) => functions,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable function registry");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), functions = functions.len(), "Opened function registry");

        Ok(Self {
            path,
            functions: Mutex::new(functions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, functions: &HashMap<String, Function>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(functions)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl FunctionStore for JsonFileStore {
    fn put(&self, function: Function) -> Result<(), StoreError> {
        let mut functions = self.functions.lock();
        let id = function.id.clone();
        let previous = functions.insert(id.clone(), function);

        if let Err(e) = self.persist(&functions) {
            match previous {
                Some(previous) => functions.insert(id, previous),
                None => functions.remove(&id),
            };
            return Err(e);
        }

        Ok(())
    }

    fn get(&self, id: &str) -> Option<Function> {
        self.functions.lock().get(id).cloned()
    }

    fn list(&self) -> Vec<Function> {
        self.functions.lock().values().cloned().collect()
    }
}

/// Registry of invocable functions
#[derive(Clone)]
pub struct FunctionRegistry {
    store: Arc<dyn FunctionStore>,
}

impl FunctionRegistry {
    pub fn new(store: Arc<dyn FunctionStore>) -> Self {
        Self { store }
    }

    /// Register a function under a freshly generated ID
    pub fn register(
        &self,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> Result<Function, StoreError> {
        let function = Function::new(name, image);
        if function.name.trim().is_empty() {
            return Err(StoreError::Invalid("name must not be empty".to_string()));
        }
        if function.image.trim().is_empty() {
            return Err(StoreError::Invalid("image must not be empty".to_string()));
        }

        self.store.put(function.clone())?;

        info!(
            function_id = %function.id,
            function = %function.name,
            image = %function.image,
            "Registered function"
        );

        Ok(function)
    }

    pub fn get(&self, id: &str) -> Result<Function, StoreError> {
        self.store
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<Function> {
        self.store.list()
    }
}
