use super::Workspace;
use hydrorag_core::build_index_from_folder;
use std::path::Path;

pub async fn run(folder: &Path, offline: bool, workspace: &Workspace) -> anyhow::Result<()> {
    let config = &workspace.config;
    let embedder = workspace.build_embedder(offline)?;
    let paths = workspace.index_paths();

    println!("Indexing {}...", folder.display());

    let (index, report) = build_index_from_folder(
        folder,
        config.ingest_config(),
        embedder.as_ref(),
        config.embed_batch_size,
        &paths,
    )
    .await?;

    println!();
    println!("Files read:    {}", report.files_read);
    println!("Chunks:        {}", index.len());
    println!("Dimension:     {}", index.dim());
    println!("Model:         {}", index.embedding_model());
    println!("Index:         {}", paths.dir.display());

    if !report.errors.is_empty() {
        println!();
        println!("Skipped {} file(s):", report.errors.len());
        for error in &report.errors {
            println!("  {}", error);
        }
    }

    Ok(())
}
