use super::Workspace;

pub fn run(workspace: &Workspace) -> anyhow::Result<()> {
    let index = workspace.load_index()?;
    let stats = index.stats();

    println!("Hydrorag Index");
    println!("==============");
    println!();
    println!("Chunks:        {}", stats.chunks);
    println!("Dimension:     {}", stats.dimension);
    println!("Model:         {}", stats.embedding_model);
    println!("Location:      {}", workspace.index_paths().dir.display());

    if !stats.categories.is_empty() {
        println!();
        println!("By Category:");
        println!("------------");

        for (category, count) in &stats.categories {
            println!("  {}: {} chunks", category, count);
        }
    }

    Ok(())
}
