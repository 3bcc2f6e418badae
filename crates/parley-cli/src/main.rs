//! parley - transcript client for an agent host

mod client;
mod commands;
mod config;
mod session;
mod transcript;
mod ui;

use clap::Parser;
use futures::StreamExt;

use crate::client::AgentClient;
use crate::commands::{SelectCommand, execute_command};
use crate::session::{CommandOutcome, Session};
use crate::transcript::Entry;

/// parley - chat with an agent host
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent host URL (default: http://0.0.0.0:8080)
    #[arg(short, long)]
    url: Option<String>,

    /// Agent to talk to (default: the host's default agent)
    #[arg(short, long)]
    agent: Option<String>,

    /// Model to request (default: the host's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// Continue an existing thread
    #[arg(short, long)]
    thread: Option<String>,

    /// Only show whole messages, no token streaming
    #[arg(long)]
    no_stream: bool,

    /// Send one message, print the transcript and exit
    #[arg(short, long)]
    print: Option<String>,

    /// With --print: wait for the final answer instead of streaming the turn
    #[arg(long, requires = "print")]
    invoke: bool,

    /// Verbose output (logs to stderr)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("parley=debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    // Flags win over the config file and environment
    let cfg = config::ClientConfig::load();
    let url = args.url.unwrap_or_else(|| cfg.base_url());
    let model = args.model.or(cfg.model.clone());
    let stream_tokens = !args.no_stream && cfg.stream_tokens();

    let mut client = AgentClient::new(url, cfg.auth_secret.clone());
    if let Some(agent) = args.agent.or(cfg.agent.clone()) {
        client.set_agent(&agent)?;
    }
    if let Err(e) = client.connect().await {
        eprintln!("Error: cannot reach agent host at {}: {}", client.base_url(), e);
        std::process::exit(1);
    }
    // Validate the requested agent now that the host's list is known
    let agent = client.agent().to_string();
    client.set_agent(&agent)?;

    let mut session = Session::new(client, model, None, stream_tokens);
    if let Some(thread_id) = args.thread {
        session.load_thread(&thread_id).await?;
    }

    if let Some(message) = args.print {
        return run_print(&mut session, &message, args.invoke).await;
    }

    ui::run_tui(session).await
}

/// One turn, then print the folded transcript
async fn run_print(session: &mut Session, message: &str, invoke: bool) -> anyhow::Result<()> {
    if let Some(result) = execute_command(message, &session.context()) {
        match session.apply_command(result).await {
            CommandOutcome::Notice(text) => println!("{}", text),
            CommandOutcome::OpenAgentSelector | CommandOutcome::OpenModelSelector => {
                println!("{}", SelectCommand::list_text(&session.context()))
            }
            CommandOutcome::Exit => {}
        }
        return Ok(());
    }

    if invoke {
        let answer = session.invoke_turn(message).await?;
        println!("{}", answer.pretty_repr());
        return Ok(());
    }

    let skip = session.transcript.entries().len();
    let mut stream = session.start_turn(message)?;
    while let Some(item) = stream.next().await {
        if session.apply_unit(item) {
            break;
        }
    }
    session.transcript.finish();

    for entry in &session.transcript.entries()[skip..] {
        print_entry(entry);
    }
    tracing::debug!(
        thread_id = %session.thread_id,
        messages = session.transcript.messages().len(),
        "Turn finished"
    );
    Ok(())
}

fn print_entry(entry: &Entry) {
    match entry {
        Entry::Human(message) => println!("{}\n", message.pretty_repr()),
        Entry::Task { task, .. } => println!(
            "Task {}: {:?}\n",
            task.name.as_deref().unwrap_or("task"),
            task.state
        ),
        Entry::Ai { message, tools } => {
            println!("{}\n", message.pretty_repr());
            for result in tools.iter().filter_map(|slot| slot.result.as_ref()) {
                println!("{}\n", message_preview(result));
            }
        }
        Entry::Tool { message, unmatched } => {
            if *unmatched {
                println!("[unmatched]");
            }
            println!("{}\n", message_preview(message));
        }
        Entry::Streaming { text, .. } => println!("{}\n", text),
        Entry::Warning(text) => eprintln!("Warning: {}", text),
        Entry::Notice(text) => println!("{}", text),
    }
}

fn message_preview(message: &parley_schema::ChatMessage) -> String {
    let mut message = message.clone();
    message.content = ui::truncate_chars(&message.content, 2000);
    message.pretty_repr()
}
