//! Algorithm constructors and loaded models.
//!
//! Model files live at `<model_dir>/<algo_name>/<model_id>.json`. A model is
//! loaded on first use and cached by `(algo_name, model_id)` until
//! invalidated, so the same id under two algorithms names two models.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use vigil_rules::{Algorithm, AlgorithmError, Diagnose, DIAG_TREE_ALGORITHM};

use crate::algorithms::{NSigma, NSIGMA_ALGORITHM};

pub type AlgorithmFactory = Box<dyn Fn() -> Box<dyn Algorithm> + Send + Sync>;

/// `(algo_name, model_id)`
type ModelKey = (String, String);

pub struct ModelRegistry {
    model_dir: PathBuf,
    factories: HashMap<String, AlgorithmFactory>,
    cache: RwLock<HashMap<ModelKey, Arc<dyn Algorithm>>>,
}

impl ModelRegistry {
    /// Registry without any algorithms.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            factories: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with `diag_tree` and `nsigma`.
    pub fn builtin(model_dir: impl Into<PathBuf>, sample_period: i64) -> Self {
        let mut registry = Self::new(model_dir);
        registry.register(
            DIAG_TREE_ALGORITHM,
            Box::new(move || -> Box<dyn Algorithm> { Box::new(Diagnose::new(sample_period)) }),
        );
        registry.register(
            NSIGMA_ALGORITHM,
            Box::new(|| -> Box<dyn Algorithm> { Box::new(NSigma::new()) }),
        );
        registry
    }

    pub fn register(&mut self, algo_name: impl Into<String>, factory: AlgorithmFactory) {
        self.factories.insert(algo_name.into(), factory);
    }

    pub fn algorithms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn model_path(&self, algo_name: &str, model_id: &str) -> PathBuf {
        self.model_dir
            .join(algo_name)
            .join(format!("{model_id}.json"))
    }

    /// Cached `algo_name` model `model_id`, loading it on a miss.
    pub async fn get_or_load(
        &self,
        model_id: &str,
        algo_name: &str,
    ) -> Result<Arc<dyn Algorithm>, AlgorithmError> {
        let key: ModelKey = (algo_name.to_string(), model_id.to_string());
        if let Some(model) = self.cache.read().await.get(&key) {
            return Ok(Arc::clone(model));
        }

        let factory = self.factories.get(algo_name).ok_or_else(|| {
            AlgorithmError::InvalidModel(format!("unknown algorithm `{algo_name}`"))
        })?;
        let path = self.model_path(algo_name, model_id);
        let mut algorithm = factory();
        algorithm.load(&path)?;
        info!(
            model_id = %model_id,
            algorithm = %algo_name,
            path = %path.display(),
            "model loaded"
        );

        let model: Arc<dyn Algorithm> = Arc::from(algorithm);
        self.cache
            .write()
            .await
            .insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// Drop a cached model so the next use reloads it.
    pub async fn invalidate(&self, model_id: &str, algo_name: &str) -> bool {
        self.cache
            .write()
            .await
            .remove(&(algo_name.to_string(), model_id.to_string()))
            .is_some()
    }

    pub async fn cached_models(&self) -> usize {
        self.cache.read().await.len()
    }
}
