use agentboard_core::protocol::{ClientRequest, DaemonEvent};

use crate::daemon_client;

/// Stream a session's classified messages to stdout until the daemon hangs
/// up or the session goes away.
pub fn cmd_attach(args: &[String]) -> i32 {
    let Some(session_id) = args.first() else {
        eprintln!("Usage: agentboard attach <session-id>");
        return 1;
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };

    let mut failed = false;
    let result = rt.block_on(daemon_client::stream_events(
        vec![ClientRequest::AttachSession {
            session_id: session_id.clone(),
        }],
        |event| match event {
            DaemonEvent::Subscribed { session_id } => {
                eprintln!("Attached to {session_id}. Ctrl-C to detach.");
                true
            }
            DaemonEvent::Message { message, .. } => {
                println!("[{}] {}", message.kind.label(), message.content);
                true
            }
            DaemonEvent::Error { message } => {
                eprintln!("Error: {message}");
                failed = true;
                false
            }
            _ => true,
        },
    ));

    match result {
        Ok(()) if !failed => 0,
        Ok(()) => 1,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}
