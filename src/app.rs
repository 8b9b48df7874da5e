//! Assembles the request pipeline from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::ExtensionsConfig;
use crate::errors::WebError;
use crate::ext::{
    cache_extension, favicon_extension, index_extension, listing_extension, markdown_extension,
    Extension,
};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::resolver::Resolver;
use crate::storage::ObjectStore;

/// Extensions enabled by the configuration, in installation order.
///
/// Index resolution wraps the store handlers first, then the favicon
/// fallback, then listings are appended, caching wraps everything
/// resolved so far, and markdown rendering wraps the serve step.
pub fn extensions(config: &ExtensionsConfig, resolver: &Arc<Resolver>) -> Vec<Extension> {
    let mut exts = vec![index_extension(config.index_files())];
    if !config.favicon.is_empty() {
        exts.push(favicon_extension(config.favicon.clone()));
    }
    if config.list_folder {
        exts.push(listing_extension(
            Arc::clone(resolver),
            config.list_folder_objects.clone(),
        ));
    }
    if config.cache_size > 0 {
        exts.push(cache_extension(
            config.cache_size,
            config.max_cache_size,
            Duration::from_secs(config.cache_ttl_seconds),
        ));
    }
    if !config.markdown_template.is_empty() {
        exts.push(markdown_extension(config.markdown_template.clone()));
    }
    exts
}

/// Build the pipeline for a store: resolver handlers first, then every
/// configured extension.
pub fn build_pipeline(
    config: &ExtensionsConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<Pipeline, WebError> {
    let resolver = Arc::new(Resolver::new(store, &config.bucket_name, &config.prefix));
    build_pipeline_with(config, &resolver)
}

/// Build the pipeline around an existing resolver.
pub fn build_pipeline_with(
    config: &ExtensionsConfig,
    resolver: &Arc<Resolver>,
) -> Result<Pipeline, WebError> {
    if !config.bucket_name.is_empty() {
        info!("serving bucket: {}", config.bucket_name);
    }
    if !config.prefix.is_empty() {
        info!("object prefix: {}", config.prefix);
    }

    let mut builder = PipelineBuilder::new();
    builder
        .chain_stat_object(resolver.stat_handler())
        .chain_get_object(resolver.get_handler());
    for ext in extensions(config, resolver) {
        builder.apply_extension(ext)?;
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn test_default_config_installs_index_and_cache() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(Resolver::new(store, "", ""));
        let exts = extensions(&ExtensionsConfig::default(), &resolver);
        assert_eq!(exts.len(), 2);
    }

    #[test]
    fn test_all_extensions_enabled() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(Resolver::new(store, "", ""));
        let config = ExtensionsConfig {
            favicon: "favicon.ico".to_string(),
            list_folder: true,
            markdown_template: "markdown.html".to_string(),
            ..Default::default()
        };
        assert_eq!(extensions(&config, &resolver).len(), 5);
    }

    #[test]
    fn test_cache_disabled_with_zero_size() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(Resolver::new(store, "", ""));
        let config = ExtensionsConfig {
            cache_size: 0,
            ..Default::default()
        };
        assert_eq!(extensions(&config, &resolver).len(), 1);
    }

    #[test]
    fn test_build_pipeline_defaults() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        assert!(build_pipeline(&ExtensionsConfig::default(), store).is_ok());
    }

    #[test]
    fn test_missing_markdown_template_disables_rendering() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        let config = ExtensionsConfig {
            markdown_template: "/nonexistent/template.html".to_string(),
            ..Default::default()
        };
        assert!(build_pipeline(&config, store).is_ok());
    }

    #[test]
    fn test_malformed_markdown_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("markdown.html");
        std::fs::write(&template, "{% for %}").unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        let config = ExtensionsConfig {
            markdown_template: template.to_string_lossy().to_string(),
            ..Default::default()
        };
        assert!(build_pipeline(&config, store).is_err());
    }
}
