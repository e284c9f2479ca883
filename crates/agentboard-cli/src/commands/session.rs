use std::path::PathBuf;

use agentboard_core::protocol::{ClientRequest, DaemonEvent, SessionInfo};

use crate::daemon_client;

pub fn cmd_session(args: &[String]) -> i32 {
    match args.first().map(|s| s.as_str()) {
        Some("create") => cmd_create(&args[1..]),
        Some("stop") => cmd_lifecycle(&args[1..], "stop"),
        Some("rm") => cmd_lifecycle(&args[1..], "rm"),
        Some("input") => cmd_input(&args[1..]),
        Some("key") => cmd_key(&args[1..]),
        Some("drain") => cmd_drain(&args[1..]),
        Some("list") => cmd_list(&args[1..]),
        _ => {
            eprintln!("Usage: agentboard session <create|stop|rm|input|key|drain|list>");
            1
        }
    }
}

fn cmd_create(args: &[String]) -> i32 {
    let mut session_id = None;
    let mut task_id = None;
    let mut cwd = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--id" => match it.next() {
                Some(id) => session_id = Some(id.clone()),
                None => {
                    eprintln!("--id requires a value");
                    return 1;
                }
            },
            "--task" => match it.next() {
                Some(id) => task_id = Some(id.clone()),
                None => {
                    eprintln!("--task requires a value");
                    return 1;
                }
            },
            "--cwd" => match it.next() {
                Some(dir) => cwd = Some(PathBuf::from(dir)),
                None => {
                    eprintln!("--cwd requires a value");
                    return 1;
                }
            },
            other => {
                eprintln!("Unknown option: {other}");
                return 1;
            }
        }
    }

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::CreateSession {
        session_id,
        task_id,
        cwd,
    })) {
        Ok(DaemonEvent::SessionCreated { session }) => {
            println!("Session {} ({})", session.id, session.state.label());
            0
        }
        other => report_unexpected(other),
    }
}

fn cmd_lifecycle(args: &[String], verb: &str) -> i32 {
    let Some(session_id) = args.first() else {
        eprintln!("Usage: agentboard session {verb} <id>");
        return 1;
    };
    let request = if verb == "stop" {
        ClientRequest::StopSession {
            session_id: session_id.clone(),
        }
    } else {
        ClientRequest::RemoveSession {
            session_id: session_id.clone(),
        }
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(request)) {
        Ok(DaemonEvent::Ack { ok: true, .. }) => {
            println!("OK");
            0
        }
        other => report_unexpected(other),
    }
}

fn cmd_input(args: &[String]) -> i32 {
    let Some(session_id) = args.first() else {
        eprintln!("Usage: agentboard session input <id> <text>");
        return 1;
    };
    let rest = &args[1..];
    if rest.is_empty() {
        eprintln!("Usage: agentboard session input <id> <text>");
        return 1;
    }
    let text = rest.join(" ");

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::SendInput {
        session_id: session_id.clone(),
        text,
    })) {
        Ok(DaemonEvent::Ack { ok: true, .. }) => 0,
        other => report_unexpected(other),
    }
}

fn cmd_key(args: &[String]) -> i32 {
    let (Some(session_id), Some(key)) = (args.first(), args.get(1)) else {
        eprintln!("Usage: agentboard session key <id> <key>");
        return 1;
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::SendKey {
        session_id: session_id.clone(),
        key: key.clone(),
    })) {
        Ok(DaemonEvent::Ack { ok: true, .. }) => 0,
        other => report_unexpected(other),
    }
}

fn cmd_drain(args: &[String]) -> i32 {
    let Some(session_id) = args.first() else {
        eprintln!("Usage: agentboard session drain <id>");
        return 1;
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::DrainMessages {
        session_id: session_id.clone(),
    })) {
        Ok(DaemonEvent::Messages { messages, .. }) => {
            for message in &messages {
                println!("[{}] {}", message.kind.label(), message.content);
            }
            0
        }
        other => report_unexpected(other),
    }
}

fn cmd_list(args: &[String]) -> i32 {
    let request = match args.first().map(|s| s.as_str()) {
        Some("--active") => ClientRequest::ListActiveSessions,
        None => ClientRequest::ListSessions,
        Some(other) => {
            eprintln!("Unknown option: {other}");
            return 1;
        }
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(request)) {
        Ok(DaemonEvent::SessionList { sessions }) => {
            print_sessions(&sessions);
            0
        }
        other => report_unexpected(other),
    }
}

fn print_sessions(sessions: &[SessionInfo]) {
    if sessions.is_empty() {
        println!("No sessions.");
        return;
    }
    println!("{:<28} {:<10} {:>8} {:>7}", "ID", "STATE", "MESSAGES", "QUEUED");
    println!("{}", "-".repeat(58));
    for info in sessions {
        println!(
            "{:<28} {:<10} {:>8} {:>7}",
            info.id,
            info.state.label(),
            info.history_len,
            info.queued
        );
    }
}

fn report_unexpected(result: Result<DaemonEvent, String>) -> i32 {
    match result {
        Ok(DaemonEvent::Error { message }) => eprintln!("Error: {message}"),
        Ok(DaemonEvent::Ack { ok: false, detail }) => {
            eprintln!("Error: {}", detail.unwrap_or_else(|| "request failed".to_string()))
        }
        Ok(_) => eprintln!("Unexpected response from daemon."),
        Err(e) => eprintln!("{e}"),
    }
    1
}
