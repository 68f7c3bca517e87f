//! Call assistant terminal front-end

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_assistant_backend::{BackendClient, FeedbackClient};
use call_assistant_call::{CallEvent, CallSession, CallState};
use call_assistant_config::{load_settings, Settings};
use call_assistant_core::{EnquiryParams, TurnRole};
use call_assistant_speech::{SpeechInput, SpeechOutput};

mod console;

use console::{ConsoleCapture, ConsoleSynthesis};

#[derive(Parser)]
#[command(name = "call-assistant")]
#[command(about = "AI voice call assistant - enquiry calls over a dialogue backend", long_about = None)]
struct Cli {
    /// Backend base URL (overrides configuration)
    #[arg(long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place an enquiry call
    Call {
        /// Store to contact
        #[arg(long, default_value = "Apple Computers")]
        store: String,

        /// Product or service the enquiry is about
        #[arg(long, default_value = "MacBook Pro")]
        product: String,

        /// Free-text details
        #[arg(long, default_value = "Display screen repair")]
        details: String,
    },

    /// Analyze feedback text, or improve it with --rewrite
    Feedback {
        /// Feedback text
        text: String,

        /// Ask the backend to improve the text instead of analyzing it
        #[arg(long)]
        rewrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(None)?;
    if let Some(url) = cli.backend_url {
        settings.backend.base_url = url;
        settings.validate()?;
    }

    init_tracing(&settings);
    tracing::info!("Call assistant v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Call {
            store,
            product,
            details,
        } => run_call(&settings, EnquiryParams::new(store, product, details)).await,
        Commands::Feedback { text, rewrite } => run_feedback(&settings, &text, rewrite).await,
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.observability.log_level));

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn run_call(settings: &Settings, params: EnquiryParams) -> Result<()> {
    println!(
        "Calling {} about {} ({})",
        params.store, params.product, params.details
    );

    let backend = Arc::new(BackendClient::new(&settings.backend)?);
    let output = Arc::new(SpeechOutput::new(Arc::new(ConsoleSynthesis)));
    let input = Arc::new(SpeechInput::new(
        Arc::new(ConsoleCapture::new()),
        Duration::from_millis(settings.call.silence_timeout_ms),
    ));

    let session = Arc::new(CallSession::new(
        params,
        settings.call.clone(),
        backend,
        output,
        input,
    ));

    let mut events = session.subscribe();
    session.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CallEvent::TurnAdded { role, content }) => {
                    let label = match role {
                        TurnRole::Assistant => "assistant",
                        TurnRole::User => "you",
                    };
                    println!("{label}: {content}");
                }
                Ok(CallEvent::StateChanged { to, .. }) => {
                    if to == CallState::Listening {
                        println!("(your turn - type a reply and press Enter)");
                    }
                }
                Ok(CallEvent::Completed { invoice_url }) => {
                    println!("Booking confirmed.");
                    if let Some(url) = invoice_url {
                        println!("Invoice: {url}");
                    }
                    break;
                }
                Ok(CallEvent::Ended { reason }) => {
                    println!("Call ended ({reason})");
                    break;
                }
                Ok(CallEvent::Error(message)) => {
                    eprintln!("error: {message}");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },

            _ = tokio::signal::ctrl_c() => {
                session.end("interrupted");
                break;
            }
        }
    }

    Ok(())
}

async fn run_feedback(settings: &Settings, text: &str, rewrite: bool) -> Result<()> {
    let client = FeedbackClient::new(&settings.backend)?;

    if rewrite {
        let improved = client.rewrite(text).await?;
        println!("{improved}");
        return Ok(());
    }

    let analysis = client.analyze(text).await?;
    println!("sentiment: {:?}", analysis.sentiment);
    println!("rating:    {}/5", analysis.rating);
    println!("emotion:   {}", analysis.emotion);
    println!("summary:   {}", analysis.summary);
    for point in &analysis.key_points {
        println!("  - {point}");
    }

    Ok(())
}
