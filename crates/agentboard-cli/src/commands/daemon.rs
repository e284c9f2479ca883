use agentboard_core::protocol::{ClientRequest, DaemonEvent};

use crate::daemon_client;

pub fn cmd_ping(args: &[String]) -> i32 {
    if !args.is_empty() {
        eprintln!("Usage: agentboard ping");
        return 1;
    }
    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::Ping)) {
        Ok(DaemonEvent::Pong) => {
            println!("pong");
            0
        }
        Ok(_) => {
            eprintln!("Unexpected response from daemon.");
            1
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

pub fn cmd_shutdown(args: &[String]) -> i32 {
    if !args.is_empty() {
        eprintln!("Usage: agentboard shutdown");
        return 1;
    }
    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::Shutdown)) {
        Ok(DaemonEvent::ShuttingDown) => {
            println!("Daemon shutting down.");
            0
        }
        Ok(_) => {
            eprintln!("Unexpected response from daemon.");
            1
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}
