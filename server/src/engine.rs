use std::sync::Arc;

use speech_core::Pipeline;

use crate::config::PipelineConfig;

/// Build the speech pipeline described by `config`.
///
/// Model loading is slow; callers on an async runtime should run this on the
/// blocking pool.
#[cfg(feature = "kokoro")]
pub fn load_pipeline(config: &PipelineConfig) -> anyhow::Result<Arc<dyn Pipeline>> {
    use anyhow::Context;
    use speech_core::kokoro::KokoroPipeline;

    let pipeline = KokoroPipeline::load(&config.model_dir, &config.lang_code, config.onnx_threads)
        .with_context(|| {
            format!(
                "failed to load Kokoro model from {}",
                config.model_dir.display()
            )
        })?;
    Ok(Arc::new(pipeline))
}

#[cfg(not(feature = "kokoro"))]
pub fn load_pipeline(config: &PipelineConfig) -> anyhow::Result<Arc<dyn Pipeline>> {
    anyhow::bail!(
        "no speech backend compiled in (model dir {}); rebuild with `--features kokoro`",
        config.model_dir.display()
    )
}
