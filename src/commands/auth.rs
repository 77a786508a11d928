use super::Workspace;
use hydrorag_core::credentials::Secret;
use std::io::{self, BufRead, Write};

pub fn run(service: &str, workspace: &Workspace) -> anyhow::Result<()> {
    let secret = Secret::from_service(service).ok_or_else(|| {
        let supported: Vec<&str> = Secret::ALL.iter().map(|s| s.service()).collect();
        anyhow::anyhow!("Unknown service: {}. Supported: {}", service, supported.join(", "))
    })?;

    let prompt = match secret {
        Secret::OpenAiApiKey => "OpenAI API key",
        Secret::ErpPassword => "ERP password",
    };
    print!("{}: ", prompt);
    io::stdout().flush()?;

    let mut value = String::new();
    io::stdin().lock().read_line(&mut value)?;
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("No {} entered", prompt);
    }

    workspace.credentials().store_secret(secret, value)?;

    println!("Saved {} to the system keyring.", prompt);
    match secret {
        Secret::OpenAiApiKey => {
            println!("You can now run `hydrorag build <folder>` to index your manuals.")
        }
        Secret::ErpPassword => println!(
            "Set erp_base_url and erp_username in hydrorag.toml to enable product enrichment."
        ),
    }

    Ok(())
}
