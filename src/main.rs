use anyhow::Result;
use global_hotkey::GlobalHotKeyEvent;
use tracing::{info, warn};

use vox_hotkey::audio::capture::CaptureConfig;
use vox_hotkey::audio::device::{CpalBackend, InputBackend};
use vox_hotkey::config::Config;
use vox_hotkey::controller::DictationController;
use vox_hotkey::events::DictationEvent;
use vox_hotkey::input::hotkey::HotkeyManager;
use vox_hotkey::output::TextDelivery;
use vox_hotkey::telemetry;
use vox_hotkey::transcribe::api::GroqClient;
use vox_hotkey::transcribe::engine::{RetryPolicy, Transcriber};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.vox-hotkey.toml");

    telemetry::init(&config.telemetry)?;
    tracing::info!("vox-hotkey starting");
    println!("✓ Logging initialized");

    let backend = CpalBackend::new();
    match backend.list_input_devices() {
        Ok(devices) => {
            info!(count = devices.len(), "input devices available");
            if !config.audio.device.is_empty()
                && !devices.iter().any(|d| d.name == config.audio.device)
            {
                warn!(device = %config.audio.device, "configured device not found; open will fail");
            }
        }
        Err(e) => warn!("could not enumerate input devices: {e}"),
    }

    let api_key = config.resolve_api_key();
    if api_key.is_empty() {
        println!("! No API key configured; set api.key or GROQ_API_KEY to transcribe");
    } else {
        println!("✓ Speech API key found");
    }

    let speech_api = GroqClient::new(&config.api, api_key.clone())
        .map_err(|e| anyhow::anyhow!("failed to build speech client: {e}"))?;
    let transcriber = Transcriber::new(
        Box::new(speech_api),
        config.audio.sample_rate,
        RetryPolicy::from(&config.transcribe),
    );

    let (controller, controller_events) = DictationController::new(
        Box::new(backend),
        transcriber,
        CaptureConfig::from(&config.audio),
        !api_key.is_empty(),
    );

    let hotkey_manager = HotkeyManager::new(&config.hotkey)?;
    println!(
        "✓ Hotkey registered: {:?} + {}",
        config.hotkey.modifiers, config.hotkey.key
    );

    let delivery = TextDelivery::from_config(&config.output);

    tracing::info!("event loop starting (press Ctrl+C to exit)");
    println!("\nVox Hotkey is running. Press the hotkey to dictate.");
    println!("Press Ctrl+C to exit.\n");

    let hotkey_events = GlobalHotKeyEvent::receiver();
    loop {
        // Poll for hotkey events
        if let Ok(event) = hotkey_events.try_recv() {
            if hotkey_manager.is_trigger(&event) {
                if let Err(e) = controller.toggle() {
                    warn!("toggle failed: {e}");
                }
            }
        }

        // Drain pipeline events
        while let Ok(event) = controller_events.try_recv() {
            handle_event(event, &delivery);
        }

        // Check for shutdown signal
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                println!("\nShutting down...");
                break;
            }
            () = tokio::time::sleep(tokio::time::Duration::from_millis(10)) => {
                // Poll interval (10ms to avoid busy-waiting)
            }
        }
    }

    Ok(())
}

fn handle_event(event: DictationEvent, delivery: &TextDelivery) {
    match event {
        DictationEvent::StateChanged { from, to } => {
            info!(?from, ?to, "pipeline state changed");
        }
        DictationEvent::LevelChanged(_) => {
            // Level readings feed a UI meter; nothing to show on a console.
        }
        DictationEvent::TranscriptReady(text) => {
            let preview: String = text.chars().take(60).collect();
            println!("📋 {preview}");
            // Paste injection sleeps briefly; keep it off the event loop.
            let delivery = delivery.clone();
            std::thread::spawn(move || {
                if let Err(e) = delivery.deliver(&text) {
                    warn!("failed to deliver transcript: {e}");
                }
            });
        }
        DictationEvent::NothingRecognized => {
            println!("· nothing recognized");
        }
        DictationEvent::Failed(message) => {
            println!("! {message}");
        }
    }
}
