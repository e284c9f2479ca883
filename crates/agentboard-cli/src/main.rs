mod commands;
mod daemon_client;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let code = run(&args);
    std::process::exit(code);
}

fn run(args: &[String]) -> i32 {
    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => cmd_help(),
        Some("session") => commands::session::cmd_session(&args[2..]),
        Some("task") => commands::task::cmd_task(&args[2..]),
        Some("attach") => commands::attach::cmd_attach(&args[2..]),
        Some("config") => commands::config::cmd_config(&args[2..]),
        Some("ping") => commands::daemon::cmd_ping(&args[2..]),
        Some("shutdown") => commands::daemon::cmd_shutdown(&args[2..]),
        _ => {
            cmd_help();
            1
        }
    }
}

fn cmd_help() -> i32 {
    println!("agentboard {}", env!("CARGO_PKG_VERSION"));
    println!("Coordinate interactive agent sessions and task workflows.");
    println!();
    println!("Usage: agentboard <command> [options]");
    println!();
    println!("Commands:");
    println!("  session             Manage agent sessions");
    println!("    create [--id <id>] [--task <task-id>] [--cwd <dir>]");
    println!("                      Start a new session");
    println!("    stop <id>         Stop a session, keeping its history");
    println!("    rm <id>           Stop and remove a session");
    println!("    input <id> <text> Send a line of input");
    println!("    key <id> <key>    Send a named key (enter, escape, ctrl+c, ...)");
    println!("    drain <id>        Print and consume queued messages");
    println!("    list [--active]   List sessions");
    println!("  task                Manage workflow tasks");
    println!("    add <type> <title> [description]");
    println!("                      Create a task in the backlog");
    println!("    status <id> <status> [comment]");
    println!("                      Move a task through the workflow");
    println!("    complete <id> [--pr]");
    println!("                      Finish a task and clean up its workspace");
    println!("    show <id>         Show one task");
    println!("    list              List all tasks");
    println!("  attach <id>         Stream a session's messages live");
    println!("  ping                Check the daemon is up");
    println!("  shutdown            Stop the daemon");
    println!("  config              Manage config file");
    println!("    path              Print config file path");
    println!("    init [--force]    Create config with defaults");
    println!();
    println!("Statuses: backlog, analysis, ready, in_progress, testing,");
    println!("          code_review, pr, done, blocked");
    println!();
    println!("Examples:");
    println!("  agentboard session create --id fix-login");
    println!("  agentboard session input fix-login \"run the test suite\"");
    println!("  agentboard task add feature \"Add login page\"");
    println!("  agentboard task status 1 in_progress");
    println!("  agentboard task complete 1 --pr");
    0
}
