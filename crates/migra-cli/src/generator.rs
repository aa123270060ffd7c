//! C10 — the seam for an optional natural-language migration generator.
//!
//! The core never depends on this; `migra-cli` defines the trait, and `migra new --ai` is the
//! only caller. No concrete AI-backed implementation ships here — [`UnconfiguredGenerator`]
//! always reports that no backend is wired up, the same way the teacher's own optional
//! integrations fail closed rather than silently no-op.

use async_trait::async_trait;

/// What a generator produces for a single new revision.
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    pub message: String,
    pub up_sql: Option<String>,
    pub down_sql: Option<String>,
}

/// An external service that turns a free-text prompt into migration SQL.
///
/// Prompt construction, sanitisation, and model selection are all out of scope for the core and
/// for this crate; a real implementation lives entirely outside this repository.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedMigration>;
}

/// The only implementation shipped here. Always fails with an explanation, rather than
/// silently falling back to an empty migration body.
pub struct UnconfiguredGenerator;

#[async_trait]
impl Generator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<GeneratedMigration> {
        anyhow::bail!(
            "no migration generator is configured: `migra new --ai` requires wiring up a \
             Generator implementation outside this crate"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_generator_always_fails() {
        let err = UnconfiguredGenerator.generate("add a users table").await.unwrap_err();
        assert!(err.to_string().contains("no migration generator is configured"));
    }
}
