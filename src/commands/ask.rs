use super::Workspace;
use hydrorag_core::context::ContextBuilder;
use hydrorag_core::Generator;
use std::io::{self, BufRead, Write};

pub async fn run(question: Option<&str>, workspace: &Workspace) -> anyhow::Result<()> {
    let config = &workspace.config;
    let index = workspace.load_index()?;
    let context = workspace.context_builder(index)?;
    let generator = Generator::new(workspace.chat_model()?)
        .with_temperature(config.answer_temperature)
        .with_max_tokens(config.max_tokens);

    if let Some(question) = question {
        return answer(question, &context, &generator, workspace).await;
    }

    println!("Ask about your manuals. Type `exit` to quit.");
    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        // A failed question should not end the session
        if let Err(e) = answer(question, &context, &generator, workspace).await {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}

async fn answer(
    question: &str,
    context: &ContextBuilder,
    generator: &Generator,
    workspace: &Workspace,
) -> anyhow::Result<()> {
    let config = &workspace.config;
    let excerpts = context
        .build_context(question, config.top_k, config.token_budget)
        .await?;
    let response = generator.generate_answer(question, &excerpts).await?;

    println!("\n{}", response);
    Ok(())
}
