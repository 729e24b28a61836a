//! Version command implementation

use crate::cli::Output;
use anyhow::Result;

/// Execute the version command
pub fn execute(output: &Output) -> Result<()> {
    output.success(&format!("{} v{}", crate::PKG_NAME, crate::VERSION));
    output.table_row("Description:", env!("CARGO_PKG_DESCRIPTION"));
    output.table_row("Target:", std::env::consts::ARCH);
    output.table_row(
        "Profile:",
        if cfg!(debug_assertions) { "debug" } else { "release" },
    );
    output.table_row("CPUs:", &num_cpus::get().to_string());
    Ok(())
}
