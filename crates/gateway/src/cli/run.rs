//! `cirkelline run` — one-shot execution command.
//!
//! Sends a single message through the orchestrator, streams the response
//! to stdout, and exits. Useful for scripting, piping, and quick CLI
//! interactions without standing up the HTTP server.

use std::io::Write;
use std::sync::Arc;

use ck_domain::config::Config;
use ck_domain::model::Caller;

use crate::bootstrap;
use crate::runtime::{run_turn, TurnEvent, TurnInput};

/// Execute a single orchestrator turn and print the response.
///
/// This is the entry point for `cirkelline run "message"`.
pub async fn run(
    config: Arc<Config>,
    message: String,
    session_key: String,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;
    let caller = Caller::anonymous(format!("cli:{session_key}"));

    let input = TurnInput {
        caller,
        incoming_session_id: None,
        message,
    };

    let (_session_id, mut rx) = run_turn(state, input).await?;

    let mut exit_code: i32 = 0;
    let mut collected_events: Vec<TurnEvent> = Vec::new();

    while let Some(event) = rx.recv().await {
        if json_output {
            collected_events.push(event);
            continue;
        }
        match &event {
            TurnEvent::Token { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnEvent::ToolCallStart { tool_name, .. } => {
                eprintln!("\x1b[2m[tool: {tool_name}]\x1b[0m");
            }
            TurnEvent::Final { .. } => println!(),
            TurnEvent::Error { message } => {
                eprintln!("error: {message}");
                exit_code = 1;
            }
            TurnEvent::Stopped { .. } => eprintln!("turn stopped"),
            _ => {}
        }
    }

    if json_output {
        let json = serde_json::to_string_pretty(&collected_events)
            .map_err(|e| anyhow::anyhow!("serializing events: {e}"))?;
        println!("{json}");
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
