use super::Workspace;
use anyhow::Context;
use hydrorag_core::RecommendationPipeline;
use std::path::Path;

pub async fn run(record: &Path, query: &str, workspace: &Workspace) -> anyhow::Result<()> {
    let record_json = std::fs::read_to_string(record)
        .with_context(|| format!("reading water analysis {}", record.display()))?;

    let index = workspace.load_index()?;
    let pipeline = RecommendationPipeline::new(
        workspace.chat_model()?,
        workspace.context_builder(index)?,
        workspace.catalog()?,
        workspace.config.pipeline_settings(),
    );

    let result = pipeline.process_and_enrich(&record_json, query).await;

    println!("{}", serde_json::to_string_pretty(&result.cart)?);
    println!();
    println!("{}", result.explanation);

    Ok(())
}
