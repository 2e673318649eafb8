//! CLI entry point for papermate.

mod cli;

use clap::Parser;
use cli::{Args, Command};
use papermate::agent::{Agent, AgentOptions, ToolActivity, ToolStatus};
use papermate::api::{ApiClient, ModelClient};
use papermate::config::{load_config, Config};
use papermate::jobs::term::{explain_term, TermRequest};
use papermate::session::prompt::{build_system_prompt, ChatContext, PaperBrief};
use papermate::session::{ChatEvent, ChatSession, ChatTurn, ToolCallStatus};
use papermate::tools::{default_search_tools, ChatCapabilities};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_ASK_SYSTEM: &str =
    "You are a research assistant. Use the search tools when the question needs sources.";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded.config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(model) = &args.model {
        config.api.model = model.clone();
    }
    if let Some(url) = &args.base_url {
        config.api.base_url = url.clone();
    }

    let client: Arc<dyn ModelClient> = Arc::new(ApiClient::new(
        &config.api,
        Duration::from_secs(config.chat.stream_timeout_secs),
    ));

    let code = match args.command {
        Command::Ask {
            prompt,
            system,
            no_tools,
            max_tokens,
        } => run_ask(client, &config, &prompt, system.as_deref(), no_tools, max_tokens).await,
        Command::Chat { prompt, paper } => run_chat(client, &config, prompt, paper).await,
        Command::Explain { term, context } => run_explain(client, &config, term, context).await,
    };
    std::process::exit(code);
}

fn print_activity(activity: &ToolActivity) {
    match activity.status {
        ToolStatus::Calling => eprintln!("• {} {}", activity.tool, activity.query),
        ToolStatus::Done { result_count } => {
            eprintln!("  {} done ({result_count} results)", activity.tool)
        }
    }
}

async fn run_ask(
    client: Arc<dyn ModelClient>,
    config: &Config,
    prompt: &str,
    system: Option<&str>,
    no_tools: bool,
    max_tokens: Option<u32>,
) -> i32 {
    let options = AgentOptions {
        disable_tools: no_tools,
        max_tokens,
        ..AgentOptions::from_config(config)
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<ToolActivity>();
    let printer = tokio::spawn(async move {
        while let Some(activity) = rx.recv().await {
            print_activity(&activity);
        }
    });
    let agent = Agent::new(
        client,
        config.api.model.clone(),
        default_search_tools(&config.tools),
        options,
    )
    .with_progress(Arc::new(tx));

    let result = agent.run(system.unwrap_or(DEFAULT_ASK_SYSTEM), prompt).await;
    drop(agent);
    let _ = printer.await;
    match result {
        Ok(outcome) if outcome.text().is_empty() => {
            eprintln!("error: no answer produced");
            1
        }
        Ok(outcome) => {
            println!("{}", outcome.text());
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

async fn run_chat(
    client: Arc<dyn ModelClient>,
    config: &Config,
    prompt: String,
    paper: Option<String>,
) -> i32 {
    let context = ChatContext {
        paper: paper.map(|title| PaperBrief {
            title,
            abstract_text: None,
        }),
        ..ChatContext::default()
    };
    let turn = ChatTurn {
        system_prompt: build_system_prompt(&context),
        history: Vec::new(),
        question: prompt,
    };
    let mut session = ChatSession::new(client, config, ChatCapabilities::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::Token { content } => {
                    let _ = write!(stdout, "{content}");
                    let _ = stdout.flush();
                }
                ChatEvent::ToolCall {
                    tool,
                    query,
                    status: ToolCallStatus::Calling,
                    ..
                } => eprintln!("\n• {tool} {query}"),
                ChatEvent::ToolCall {
                    tool, result_count, ..
                } => eprintln!("  {tool} done ({} results)", result_count.unwrap_or(0)),
                ChatEvent::TermSuggestions { terms } => {
                    for term in terms {
                        eprintln!("\nterm: {} ({})", term.term, term.translation);
                    }
                }
                ChatEvent::ProfileUpdateSuggestions { updates } => {
                    eprintln!("\nprofile updates suggested: {}", updates.len());
                }
                ChatEvent::Error { message } => eprintln!("\nerror: {message}"),
            }
        }
        println!();
    });

    let outcome = session.respond(&turn, &tx).await;
    drop(tx);
    let _ = printer.await;
    if outcome.error.is_some() {
        1
    } else {
        0
    }
}

async fn run_explain(
    client: Arc<dyn ModelClient>,
    config: &Config,
    term: String,
    context: Option<String>,
) -> i32 {
    let request = TermRequest {
        phrase: term,
        context,
        ..TermRequest::default()
    };
    match explain_term(client, config, default_search_tools(&config.tools), &request).await {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}
