mod commands;
mod config;

use commands::{KioskCommand, HELP};
use config::KioskConfig;
use narration_audio::{CommandPlayer, ElevenLabsClient, EspeakNarrator};
use narration_core::{prompts, NarrationService};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,narration_core=info,narration_audio=info,survey_kiosk=info".to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(target: "survey_kiosk", "Starting survey kiosk narration driver");

    // Defaults + env + optional TOML overlay
    let cfg = KioskConfig::load();

    let espeak = EspeakNarrator::with_config(cfg.espeak.clone())
        .await
        .map(Arc::new);
    if espeak.is_none() {
        warn!(target: "survey_kiosk", "espeak-ng not found; local narration disabled");
    }

    let mut builder = NarrationService::builder().config(cfg.narration.clone());
    // Remote audio is pointless without a player to hand it to
    let player = CommandPlayer::new(cfg.player.clone());
    if player.is_available() {
        builder = builder.remote(
            Arc::new(ElevenLabsClient::with_config(cfg.elevenlabs.clone())),
            Arc::new(player),
        );
    }
    if let Some(narrator) = &espeak {
        builder = builder.local(narrator.clone());
    }
    let service = builder.build();
    service.start().await?;
    service.set_enabled(cfg.audio_enabled);

    // Narration progress at debug level
    let mut events = service.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            debug!(target: "survey_kiosk", token = %ev.token, state = %ev.state, text = %ev.text, "narration");
        }
    });

    service.speak(prompts::WELCOME);
    println!("{}", HELP);

    let driver = {
        let service = service.clone();
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let cmd = match KioskCommand::parse(&line) {
                    Ok(Some(cmd)) => cmd,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match &cmd {
                    KioskCommand::Quit => break,
                    KioskCommand::Help => println!("{}", HELP),
                    KioskCommand::Cancel => service.cancel(),
                    KioskCommand::Audio(on) => {
                        service.set_enabled(*on);
                        if *on {
                            service.speak(prompts::READER_ENABLED);
                        }
                    }
                    KioskCommand::Voices => match &espeak {
                        Some(narrator) => narrator.refresh_voices().await,
                        None => service.voices_changed(),
                    },
                    KioskCommand::Start => {
                        // The intro supersedes the confirmation, as on the touch screen.
                        service.speak(prompts::CONFIRM);
                        if let Some(text) = cmd.prompt() {
                            service.speak(text);
                        }
                    }
                    _ => {
                        if let Some(text) = cmd.prompt() {
                            service.speak(text);
                        }
                    }
                }
            }
        }
    };

    // Ctrl+C or end of input shuts down
    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(target: "survey_kiosk", error = %e, "Failed to listen for Ctrl+C");
            }
            info!(target: "survey_kiosk", "Shutting down...");
        }
        _ = driver => {
            info!(target: "survey_kiosk", "Input closed; shutting down...");
        }
    }

    event_task.abort();
    service.shutdown().await.ok();
    Ok(())
}
