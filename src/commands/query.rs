use super::Workspace;
use hydrorag_core::query_index;

const PREVIEW_CHARS: usize = 200;

pub async fn run(text: &str, k: usize, workspace: &Workspace) -> anyhow::Result<()> {
    let index = workspace.load_index()?;
    let embedder = workspace.query_embedder(&index)?;

    let hits = query_index(&index, embedder.as_ref(), text, k).await?;

    if hits.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} [{}] relevance {:.2}",
            i + 1,
            hit.chunk.source,
            hit.chunk.category,
            hit.relevance()
        );

        let preview: String = hit.chunk.text.chars().take(PREVIEW_CHARS).collect();
        let preview = preview.split_whitespace().collect::<Vec<_>>().join(" ");
        if hit.chunk.text.chars().count() > PREVIEW_CHARS {
            println!("   {}...", preview);
        } else {
            println!("   {}", preview);
        }
        println!();
    }

    Ok(())
}
