mod commands;
mod settings;

use anyhow::Result;
use peerdeck_core::client::{ConnectionStatus, WsConnector};
use peerdeck_remote_client::{Coordinator, StateSnapshot};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{Command, HELP};
use crate::settings::SettingsStore;

/// How often the settings file is re-read for added/removed remotes
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let store = Arc::new(SettingsStore::open_default());
    log::info!("Using settings at {}", store.path().display());

    let mut coordinator = Coordinator::new(
        store.clone(),
        Arc::new(WsConnector),
        tokio::runtime::Handle::current(),
    );

    // Only print when the rendered tab bar actually changes
    let last_render: Mutex<Option<String>> = Mutex::new(None);
    coordinator.on_state_change(move |snapshot| {
        let rendered = render_tabs(snapshot);
        let mut last = last_render.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() != Some(rendered.as_str()) {
            println!("{}", rendered);
            *last = Some(rendered);
        }
    });
    coordinator.on_remote_message(|alias, message| {
        println!(
            "[{}] {} {}",
            alias,
            message.kind,
            Value::Object(message.payload.clone())
        );
    });
    coordinator.initialize();

    let events = coordinator.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut refresh = tokio::time::interval_at(
        tokio::time::Instant::now() + REFRESH_INTERVAL,
        REFRESH_INTERVAL,
    );

    loop {
        tokio::select! {
            Ok(event) = events.recv() => coordinator.handle_event(event),
            _ = refresh.tick() => coordinator.refresh(),
            line = lines.next_line() => {
                let Some(line) = input_line(line) else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = run_command(&mut coordinator, &store, command) {
                            eprintln!("error: {:#}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{:#}", e),
                }
            }
        }
    }

    log::info!("Shutting down");
    coordinator.close();
    Ok(())
}

fn run_command(
    coordinator: &mut Coordinator,
    store: &SettingsStore,
    command: Command,
) -> Result<()> {
    match command {
        Command::Tabs => println!("{}", render_tabs(&coordinator.snapshot())),
        Command::Select(index) => {
            if index >= coordinator.tabs().len() {
                anyhow::bail!("no tab {}", index);
            }
            coordinator.select_tab(index);
        }
        Command::Next => coordinator.select_next_tab(),
        Command::Prev => coordinator.select_previous_tab(),
        Command::Refresh => coordinator.refresh(),
        Command::Send { kind, payload } => {
            let alias = coordinator
                .selected_tab()
                .and_then(|tab| tab.alias.clone())
                .ok_or_else(|| anyhow::anyhow!("select a remote tab first"))?;
            coordinator.send_to(&alias, &kind, payload);
        }
        Command::Add(config) => {
            store.upsert_remote(config)?;
            coordinator.refresh();
        }
        Command::Remove(alias) => {
            if !store.remove_remote(&alias)? {
                anyhow::bail!("no remote named '{}'", alias);
            }
            coordinator.refresh();
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// The next stdin line, or `None` when input has ended. Read errors end
/// input too, so shutdown still goes through `Coordinator::close`.
fn input_line(read: std::io::Result<Option<String>>) -> Option<String> {
    match read {
        Ok(line) => line,
        Err(e) => {
            log::error!("Failed to read stdin: {}", e);
            None
        }
    }
}

/// One line per tab, selected tab marked with `>`.
fn render_tabs(snapshot: &StateSnapshot) -> String {
    snapshot
        .tabs
        .iter()
        .enumerate()
        .map(|(index, tab)| {
            let marker = if index == snapshot.selected_index { '>' } else { ' ' };
            let mut line = format!("{} [{}] {}", marker, index, tab.label);
            if let (Some(host), Some(port)) = (&tab.host, tab.port) {
                line.push_str(&format!(" {}:{}", host, port));
            }
            line.push_str(&format!(" ({})", tab.status));
            if tab.status == ConnectionStatus::Disconnected {
                if let Some(error) = &tab.last_error {
                    line.push_str(&format!(" - {}", error));
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
