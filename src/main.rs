use std::env;
use std::sync::Arc;
use std::time::Duration;

use agent_console::app::App;
use agent_console::config::ConsoleSettings;
use agent_console::event::Event;
use agent_console::logging;
use agent_console::store::http::HttpStore;
use agent_console::tui::{init, restore};
use agent_console::ui::render;
use anyhow::{Context, Result};
use crossterm::event::{Event as CrosstermEvent, EventStream};
use futures_util::StreamExt;
use log::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let workspace_root = env::current_dir().context("failed to resolve working directory")?;
    let settings = ConsoleSettings::load(&workspace_root)?;
    logging::init(&workspace_root, &settings)?;
    let store = Arc::new(HttpStore::new(&settings)?);
    info!("agent console starting against {}", settings.api_base);

    let mut app = App::new(settings, store);
    if let Some(conversation_id) = env::args().nth(1) {
        app.open_at_startup(&conversation_id).await;
    }

    let mut tui = init()?;
    let outcome = run(&mut tui, &mut app).await;
    restore()?;
    if let Err(err) = &outcome {
        error!("console stopped: {err:#}");
    }
    info!("agent console stopped");
    outcome
}

async fn run(tui: &mut agent_console::tui::Tui, app: &mut App) -> Result<()> {
    let mut stream = EventStream::new();
    let mut interval = tokio::time::interval(Duration::from_millis(250));

    while !app.should_quit {
        tui.draw(|frame| render(frame, app))?;

        let event = tokio::select! {
            _ = interval.tick() => Event::Tick,
            event = app.next_background_event() => event,
            maybe_event = stream.next() => {
                match maybe_event {
                    Some(Ok(CrosstermEvent::Key(key))) => Event::Key(key),
                    Some(Ok(CrosstermEvent::Resize(_, _))) => Event::Resize,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err).context("terminal event stream failed"),
                    None => break,
                }
            }
        };

        app.handle_event(event).await;
    }
    Ok(())
}
