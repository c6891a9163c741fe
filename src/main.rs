use std::io::BufRead;
use std::sync::Arc;
use std::time;

use eyre::{Context, Result};
use nexus_chat::app::console::{Command as Input, Console, Flow};
use nexus_chat::app::services::{MetricsPoller, VoiceService};
use nexus_chat::app::{Controller, ControllerOptions};
use nexus_chat::backend::new_backend;
use nexus_chat::cli::Command;
use nexus_chat::config::constants::HELLO_MESSAGE;
use nexus_chat::config::settings::settings_path;
use nexus_chat::config::{Settings, init_logger, resolve_path, verbose};
use nexus_chat::models::{ArcEventTx, Event};
use nexus_chat::storage::new_session_store;
use tokio::{sync::mpsc, task};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let config = cmd.get_config()?;
    let loud = config.general.verbose;
    init_logger(&config.log)?;
    verbose!(loud, "[+] Logger initialized");

    let settings_path = settings_path(&config.general.settings_path)?;
    let settings = Settings::load(&settings_path);
    verbose!(loud, "[+] Settings loaded from {}", settings_path);

    let export_dir = resolve_path(&config.general.export_dir)
        .wrap_err(format!("resolving export dir {}", config.general.export_dir))?;

    verbose!(loud, "[+] Connecting to {}", config.backend.endpoint);
    let backend = new_backend(&config.backend);
    let store = new_session_store(&config.backend);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let event_tx: ArcEventTx = Arc::new(event_tx);

    let controller = Arc::new(Controller::new(
        backend.clone(),
        store,
        event_tx.clone(),
        ControllerOptions::from(&config.backend),
    ));
    controller.set_selected_model(settings.default_model.clone());

    let mut task_set = task::JoinSet::new();
    let token = CancellationToken::new();

    let poller = MetricsPoller::new(
        backend.clone(),
        event_tx.clone(),
        config.backend.metrics_interval(),
        token.clone(),
    );
    task_set.spawn(poller.start());

    let voice = VoiceService::from_config(&config.voice, event_tx.clone());
    let console = Arc::new(Console::new(
        controller.clone(),
        voice,
        settings,
        settings_path,
        export_dir,
        std::io::stdout(),
    ));

    let renderer = console.clone();
    let render_token = token.clone();
    task_set.spawn(async move {
        loop {
            tokio::select! {
                _ = render_token.cancelled() => return,
                event = event_rx.recv() => match event {
                    Some(event) => renderer.render(event).await,
                    None => return,
                },
            }
        }
    });

    if controller.check_health().await {
        verbose!(loud, "[+] Backend is healthy");
    } else {
        log::warn!("Backend {} did not report healthy", config.backend.endpoint);
        console.print(&format!(
            "Backend at {} is not reachable yet, messages may fail",
            config.backend.endpoint
        ));
    }

    verbose!(loud, "[+] Fetching models...");
    let models = controller.list_models().await;
    verbose!(loud, "[+] Fetched {} models", models.len());

    // Blocking stdin reads live on a plain thread, outside the runtime.
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    log::error!("Failed to read input: {}", err);
                    return;
                }
            }
        }
    });

    console.print(HELLO_MESSAGE);
    while let Some(line) = lines.recv().await {
        if console.handle(Input::parse(&line), &mut lines).await == Flow::Quit {
            break;
        }
    }

    log::debug!("Shutting down");
    controller.cancel();
    token.cancel();

    let shutdown = async {
        while let Some(res) = task_set.join_next().await {
            if let Err(err) = res {
                log::error!("Task error: {}", err);
            }
        }
    };
    if tokio::time::timeout(time::Duration::from_secs(5), shutdown)
        .await
        .is_err()
    {
        eprintln!("Shutdown timeout reached");
    }

    Ok(())
}
