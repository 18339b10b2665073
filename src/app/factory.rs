use crate::{
    ai::{GeminiClient, TextGenerator},
    app::service::{AppComponents, AppService},
    cache::{CacheStore, FileCache, MemoryCache},
    config::{CacheBackend, Config, EmbeddingProvider},
    jobs, profiles,
    semantic::{Embedder, EmbeddingModel, HashEmbedder, VectorStorage},
    storage,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application factory for creating and configuring application components
pub struct AppFactory;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub jobs_path: PathBuf,
    pub profiles_path: PathBuf,
    pub vectors_path: PathBuf,
    pub cache_path: PathBuf,
    pub models_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        Self {
            jobs_path: base_path.join("jobs.csv"),
            profiles_path: base_path.join("profiles.json"),
            vectors_path: base_path.join("vectors.bin"),
            cache_path: base_path.join("cache"),
            models_path: base_path.join("models"),
            base_path,
        }
    }
}

impl AppFactory {
    /// Build the service with every handle it needs, loading the stored
    /// vector index.
    pub fn create_app_service(paths: &AppPaths) -> Result<AppService> {
        let config = Config::load_with(&paths.base_path)?;

        let embedder = Self::create_embedder(&config, paths)?;
        let vectors = VectorStorage::new(paths.vectors_path.clone());
        let index = vectors
            .load_or_create(&embedder.model_id_hash(), embedder.dimensions())
            .context("Failed to load vector index")?;

        Ok(AppService::new(AppComponents {
            profiles: Arc::new(profiles::BackendJson::load(&paths.profiles_path)?),
            jobs: Arc::new(jobs::BackendCsv::load(&paths.jobs_path)?),
            index: Arc::new(index),
            generator: Self::create_generator(&config)?,
            cache: Self::create_cache(&config, paths)?,
            embedder,
            vectors,
            config,
        }))
    }

    /// Get application paths, creating the base directory
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths::new(base_path))
    }

    pub fn create_embedder(config: &Config, paths: &AppPaths) -> Result<Arc<dyn Embedder>> {
        let embedding = &config.embedding;
        match embedding.provider {
            EmbeddingProvider::Fastembed => {
                log::info!("Initializing embedding model '{}'", embedding.model);
                let model = EmbeddingModel::new(
                    &embedding.model,
                    paths.models_path.clone(),
                    Some(Duration::from_secs(embedding.download_timeout_secs)),
                )?;
                Ok(Arc::new(model))
            }
            EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::new(embedding.dimensions))),
        }
    }

    pub fn create_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
        Ok(Arc::new(GeminiClient::new(&config.ai)?))
    }

    pub fn create_cache(config: &Config, paths: &AppPaths) -> Result<Arc<dyn CacheStore>> {
        match config.cache.backend {
            CacheBackend::File => {
                let store = storage::BackendLocal::new(&paths.cache_path)
                    .context("Failed to create cache directory")?;
                Ok(Arc::new(FileCache::new(store)))
            }
            CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        }
    }

    /// `$JOBMATCH_BASE_PATH`, or `~/.local/share/jobmatch`
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("JOBMATCH_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/jobmatch"))
    }
}
