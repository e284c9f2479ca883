pub mod attach;
pub mod config;
pub mod daemon;
pub mod session;
pub mod task;

/// Build a runtime for one blocking IPC exchange, reporting failure as an
/// exit code path instead of a panic.
pub fn runtime() -> Result<tokio::runtime::Runtime, i32> {
    tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("Runtime error: {e}");
        1
    })
}
