use anyhow::{Context, Result};
use cafe_quest_core::Command;
use cafe_quest_core::intent::IntentRouter;
use cafe_quest_core::machine::DialogueStateMachine;
use cafe_quest_core::orchestrator::{self, Input, Orchestrator};
use cafe_quest_core::prompt::{ChatClient, PromptComposer, SafetyGuard};
use cafe_quest_service::config::{Config, PromptStyle};
use cafe_quest_service::console::{ConsoleCommand, HELP};
use cafe_quest_service::game::GameFlow;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Cafe ordering quest: talk to the barista NPC")]
struct Cli {
    /// Walk up to the counter immediately instead of waiting for /start
    #[arg(long)]
    auto_start: bool,
    /// Seconds of silence before the barista asks again (0 disables)
    #[arg(long)]
    reprompt_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting cafe quest service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if let Some(secs) = args.reprompt_secs {
        config.set_reprompt_secs(secs);
    }
    tracing::debug!("Effective configuration: {:?}", config);

    // --- 4. Initialize Prompt Generation ---
    let prompts = match config.prompt_style {
        PromptStyle::Template => PromptComposer::template(),
        PromptStyle::Llm => {
            let client = ChatClient::new(config.llm_settings())
                .context("Failed to create chat completions client")?;
            tracing::info!("Using LLM prompts with model {}.", config.chat_model);
            PromptComposer::llm(Arc::new(client), SafetyGuard::new(config.guard_policy()))
        }
    };

    // --- 5. Application Setup ---
    let (input_tx, input_rx) = orchestrator::input_channel(64);
    // Create the command channel to decouple core logic from the runtime.
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);

    let orchestrator = Orchestrator::new(
        DialogueStateMachine::new(),
        IntentRouter::new(),
        prompts,
        config.orchestrator_config(),
        command_tx,
        &input_tx,
    );
    let orchestrator_handle = tokio::spawn(orchestrator.run(input_rx));

    let game = Arc::new(Mutex::new(GameFlow::new()));
    if config.mock_mode {
        tracing::info!("Mock mode: payment, hand-off and farewell complete on timers.");
    } else {
        tracing::info!("Device mode: type /paid, /handed and /said to complete actions.");
    }
    println!("{HELP}");

    if args.auto_start && game.lock().await.try_start() {
        input_tx
            .send(Input::Begin)
            .await
            .context("Failed to start the conversation")?;
    }

    // This task handles commands from the core logic, executing side effects.
    let game_for_cmd_handler = game.clone();
    let command_handler = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Speak(text) => println!("NPC: {text}"),
                Command::ShowPlayerText(text) => println!("PLAYER: {text}"),
                Command::StepChanged(step) => {
                    tracing::info!("COMMAND RECEIVED: Step changed to {}", step);
                }
                Command::QuestFailed(reason) => {
                    tracing::warn!("COMMAND RECEIVED: Quest failed: {}", reason);
                    println!("[QUEST] {reason}");
                }
                Command::QuestSucceeded => {
                    tracing::info!("COMMAND RECEIVED: Quest succeeded");
                    println!("[QUEST] 퀘스트 성공!");
                    game_for_cmd_handler.lock().await.complete();
                    break;
                }
            }
        }
    });

    // This task stands in for speech-to-text and the kiosk devices.
    let input_tx_for_console = input_tx.clone();
    let console_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("Console input closed.");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read console input: {:?}", e);
                    break;
                }
            };
            let Some(command) = ConsoleCommand::parse(&line) else {
                continue;
            };

            let input = match command {
                ConsoleCommand::Start => game.lock().await.try_start().then_some(Input::Begin),
                ConsoleCommand::Restart => game.lock().await.try_restart().then_some(Input::Begin),
                ConsoleCommand::Quit => break,
                ConsoleCommand::Help => {
                    println!("{HELP}");
                    None
                }
                ConsoleCommand::Unknown(line) => {
                    println!("Unknown command: {line} (try /help)");
                    None
                }
                other => other.as_input(),
            };

            if let Some(input) = input {
                if let Err(e) = input_tx_for_console.send(input).await {
                    tracing::error!("Failed to send input to orchestrator: {:?}", e);
                    break;
                }
            }
        }
    });

    // The orchestrator keeps only a weak sender; it stops once these are gone.
    drop(input_tx);

    tokio::select! {
        _ = orchestrator_handle => {},
        _ = command_handler => {},
        _ = console_handle => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }
    tracing::info!("Shutting down...");
    Ok(())
}
