//! lexibird CLI
//!
//! Thin terminal driver over the gateway: analyze a word or sentence, or
//! chat with the assistant (one-shot or REPL).

use anyhow::Result;
use clap::{Parser, Subcommand};
use lexibird::{AiClient, FilePreferences};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lexibird")]
#[command(about = "AI gateway for the lexibird vocabulary trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Preferences file (defaults to the XDG config location)
    #[arg(short, long)]
    prefs: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a vocabulary word
    Word { word: String },
    /// Grade a learner-written sentence
    Sentence {
        sentence: String,
        /// Disable the streaming attempt
        #[arg(long)]
        no_stream: bool,
    },
    /// Chat with the assistant; starts a REPL when no message is given
    Chat {
        message: Option<String>,
        /// Stream the reply as it arrives
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let prefs = match &cli.prefs {
        Some(path) => FilePreferences::load_from(path)?,
        None => FilePreferences::load()?,
    };
    let client = AiClient::new(Arc::new(prefs))?;

    match cli.command {
        Commands::Word { word } => {
            let analysis = client.analyze_word(&word).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Sentence { sentence, no_stream } => {
            let mut sink = |delta: &str, _accumulated: &str| {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            };
            let analysis = client
                .analyze_sentence(&sentence, !no_stream, Some(&mut sink))
                .await?;
            println!("\n{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Chat { message, stream } => match message {
            Some(message) => {
                chat_once(&client, &message, stream).await?;
            }
            None => {
                chat_repl(&client, stream).await?;
            }
        },
    }

    Ok(())
}

async fn chat_once(client: &AiClient, message: &str, stream: bool) -> Result<()> {
    if stream {
        let mut sink = |delta: &str| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        };
        client.chat(message, true, Some(&mut sink)).await?;
        println!();
    } else {
        let reply = client.chat(message, false, None).await?;
        println!("{reply}");
    }
    Ok(())
}

async fn chat_repl(client: &AiClient, stream: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("lexibird chat (Ctrl-D to exit)");

    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if let Err(err) = chat_once(client, line, stream).await {
                    eprintln!("error: {err}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}
