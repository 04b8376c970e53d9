//! greengate — GreenGate CLI
//!
//! Send chat requests through a locally configured gateway and inspect the
//! energy ledger.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use greengate::{
    ChatRequest, Config, GatewayBuilder, Message, RequestContext, ResponseBody, Secrets,
};

/// GreenGate CLI
#[derive(Parser)]
#[command(name = "greengate")]
#[command(version = greengate::PKG_VERSION)]
#[command(about = "Energy-aware LLM gateway")]
struct Args {
    /// Config file (default: ~/.greengate/config.toml, then /etc/greengate/config.toml)
    #[arg(short, long, env = "GREENGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a chat request through the gateway
    Chat {
        /// User message (or omit to read from stdin)
        message: Option<String>,
        /// Model to use
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,
        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Stream the raw provider response
        #[arg(long)]
        stream: bool,
        /// Caller identity for rate limiting
        #[arg(long)]
        user: Option<String>,
    },

    /// Show ledger totals and recent records
    Stats {
        /// Number of recent records to list
        #[arg(short, long, default_value_t = 10)]
        recent: u32,
    },

    /// List models explicitly advertised by configured providers
    Models,

    /// Show full version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Command::Version = args.command {
        println!("greengate {}", greengate::version_string());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let gateway = GatewayBuilder::from_config(&config, &secrets).build()?;

    match args.command {
        Command::Chat {
            message,
            model,
            system,
            stream,
            user,
        } => {
            let message = resolve_text(message, "chat")?;
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(message));

            let mut request = ChatRequest::new(model, messages).stream(stream);
            if let Some(user) = user {
                request = request.user(user);
            }

            let response = gateway.handle(request, RequestContext::new()).await?;
            for (name, value) in response.headers.to_pairs() {
                eprintln!("{name}: {value}");
            }
            match response.body {
                ResponseBody::Json(body) => {
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                ResponseBody::Stream(mut chunks) => {
                    let mut stdout = io::stdout().lock();
                    while let Some(chunk) = chunks.next().await {
                        stdout.write_all(&chunk?)?;
                        stdout.flush()?;
                    }
                    writeln!(stdout)?;
                }
            }
        }

        Command::Stats { recent } => {
            let status = gateway.status().await?;
            let averages = gateway.ledger().average_per_request().await?;
            println!("project:        {} ({})", status.project, status.environment);
            println!("requests:       {}", status.requests_served);
            println!("energy spent:   {:.3} J", status.energy_spent_joules);
            println!("energy saved:   {:.3} J", status.energy_saved_joules);
            println!(
                "per request:    {:.3} J spent, {:.3} J saved",
                averages.spent, averages.saved
            );

            let records = gateway.ledger().recent(recent).await?;
            if !records.is_empty() {
                println!();
                for record in records {
                    println!(
                        "{:>6}  {}  spent {:>10.3} J  saved {:>10.3} J  tokens {}/{}",
                        record.id,
                        record.created_at,
                        record.spent,
                        record.saved,
                        record.prompt_tokens,
                        record.completion_tokens
                    );
                }
            }
        }

        Command::Models => {
            let models = gateway.list_models();
            if models.is_empty() {
                println!("no models advertised (providers accept any model)");
            } else {
                for model in models {
                    println!("{} ({})", model.id, model.providers.join(", "));
                }
            }
        }

        Command::Version => unreachable!("handled above"),
    }

    gateway.close();
    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
