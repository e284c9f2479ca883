use agentboard_core::protocol::{ClientRequest, DaemonEvent, StatusUpdateReport};
use agentboard_core::task::Task;
use agentboard_core::worktree::SyncStatus;

use crate::daemon_client;

pub fn cmd_task(args: &[String]) -> i32 {
    match args.first().map(|s| s.as_str()) {
        Some("add") => cmd_add(&args[1..]),
        Some("status") => cmd_status(&args[1..]),
        Some("complete") => cmd_complete(&args[1..]),
        Some("show") => cmd_show(&args[1..]),
        Some("list") => cmd_list(&args[1..]),
        _ => {
            eprintln!("Usage: agentboard task <add|status|complete|show|list>");
            1
        }
    }
}

fn cmd_add(args: &[String]) -> i32 {
    let (Some(task_type), Some(title)) = (args.first(), args.get(1)) else {
        eprintln!("Usage: agentboard task add <type> <title> [description]");
        return 1;
    };
    let description = args[2..].join(" ");

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::AddTask {
        task_type: task_type.clone(),
        title: title.clone(),
        description,
    })) {
        Ok(DaemonEvent::TaskCreated { task }) => {
            println!("Task {} added to backlog: {}", task.id, task.title);
            0
        }
        other => report_unexpected(other),
    }
}

fn cmd_status(args: &[String]) -> i32 {
    let (Some(task_id), Some(status)) = (args.first(), args.get(1)) else {
        eprintln!("Usage: agentboard task status <id> <status> [comment]");
        return 1;
    };
    let comment = if args.len() > 2 {
        Some(args[2..].join(" "))
    } else {
        None
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::UpdateTaskStatus {
        task_id: task_id.clone(),
        status: status.clone(),
        comment,
    })) {
        Ok(DaemonEvent::TaskUpdated { report }) => {
            print_report(&report);
            if report.applied {
                0
            } else {
                1
            }
        }
        other => report_unexpected(other),
    }
}

fn print_report(report: &StatusUpdateReport) {
    if !report.applied {
        println!(
            "Task {} stays in {}: merge conflict, resolve it in {}",
            report.task.id,
            report.task.status.label(),
            report.task.worktree_path.as_deref().unwrap_or("its worktree")
        );
        return;
    }
    println!(
        "Task {}: {} -> {}",
        report.task.id,
        report.previous_status.label(),
        report.task.status.label()
    );
    if let Some(branch) = &report.branch_created {
        println!("  branch {branch}");
    }
    if let Some(sync) = &report.sync {
        if *sync == SyncStatus::SkippedNoRemote {
            println!("  sync skipped (no remote)");
        }
    }
    match &report.task.assigned_agent {
        Some(agent) => println!("  agent {agent}"),
        None => println!("  awaiting human verification"),
    }
}

fn cmd_complete(args: &[String]) -> i32 {
    let Some(task_id) = args.first() else {
        eprintln!("Usage: agentboard task complete <id> [--pr]");
        return 1;
    };
    let create_pr = match args.get(1).map(|s| s.as_str()) {
        Some("--pr") => true,
        None => false,
        Some(other) => {
            eprintln!("Unknown option: {other}");
            return 1;
        }
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::CompleteTask {
        task_id: task_id.clone(),
        create_pr,
    })) {
        Ok(DaemonEvent::TaskCompleted { task, report }) => {
            println!("Task {} done", task.id);
            if report.merged {
                println!("  merged into main");
            }
            if let Some(url) = &report.pr_url {
                println!("  branch published: {url}");
            }
            for error in &report.errors {
                eprintln!("  warning: {error}");
            }
            0
        }
        other => report_unexpected(other),
    }
}

fn cmd_show(args: &[String]) -> i32 {
    let Some(task_id) = args.first() else {
        eprintln!("Usage: agentboard task show <id>");
        return 1;
    };

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::GetTask {
        task_id: task_id.clone(),
    })) {
        Ok(DaemonEvent::Task { task }) => {
            print_task(&task);
            0
        }
        other => report_unexpected(other),
    }
}

fn print_task(task: &Task) {
    println!("Task {} [{}] {}", task.id, task.task_type, task.title);
    println!("  status  {}", task.status.label());
    if !task.description.is_empty() {
        println!("  about   {}", task.description);
    }
    if let Some(agent) = &task.assigned_agent {
        println!("  agent   {agent}");
    }
    if let Some(branch) = &task.git_branch {
        println!("  branch  {branch}");
    }
    if let Some(path) = &task.worktree_path {
        println!("  worktree {path}");
    }
    if let Some(from) = &task.blocked_from {
        println!("  blocked from {}", from.label());
    }
}

fn cmd_list(args: &[String]) -> i32 {
    if !args.is_empty() {
        eprintln!("Usage: agentboard task list");
        return 1;
    }

    let Ok(rt) = crate::commands::runtime() else {
        return 1;
    };
    match rt.block_on(daemon_client::request(ClientRequest::ListTasks)) {
        Ok(DaemonEvent::TaskList { tasks }) => {
            if tasks.is_empty() {
                println!("No tasks.");
                return 0;
            }
            println!(
                "{:<4} {:<12} {:<18} TITLE",
                "ID", "STATUS", "AGENT"
            );
            println!("{}", "-".repeat(70));
            for task in &tasks {
                let title = if task.title.len() > 34 {
                    format!("{}...", &task.title[..31])
                } else {
                    task.title.clone()
                };
                println!(
                    "{:<4} {:<12} {:<18} {}",
                    task.id,
                    task.status.label(),
                    task.assigned_agent.as_deref().unwrap_or("-"),
                    title
                );
            }
            0
        }
        other => report_unexpected(other),
    }
}

fn report_unexpected(result: Result<DaemonEvent, String>) -> i32 {
    match result {
        Ok(DaemonEvent::Error { message }) => eprintln!("Error: {message}"),
        Ok(_) => eprintln!("Unexpected response from daemon."),
        Err(e) => eprintln!("{e}"),
    }
    1
}
