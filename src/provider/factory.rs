// MindHarbor - Generator factory

use super::{http::HttpGenerator, Generator};
use crate::config::GeneratorConfig;
use std::sync::Arc;

/// Create a generator from the loaded config.
///
/// Returns `None` when no API key is configured; chat then runs on the
/// fallback responder alone.
pub fn create_generator(cfg: &GeneratorConfig) -> anyhow::Result<Option<Arc<dyn Generator>>> {
    if cfg.api_key.is_empty() {
        tracing::warn!("Generator API key not found; chat will use fallback responses");
        return Ok(None);
    }

    let generator = HttpGenerator::new(cfg.api_key.clone(), cfg.api_base.clone())?;

    tracing::info!(
        model = %cfg.model,
        api_base = %generator.api_base(),
        "Creating generator"
    );

    Ok(Some(Arc::new(generator)))
}
