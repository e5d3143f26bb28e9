use anyhow::{Context, Result};
use oblique_core::pipeline::CancellationToken;
use tracing::warn;

/// Exit status after a second interrupt (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// A token cancelled by the first Ctrl-C. Running stages stop at their next
/// checkpoint and partial outputs keep their `.incomplete` marker. A second
/// Ctrl-C exits immediately.
pub fn cancel_on_ctrl_c() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if !interrupt(&handler_token) {
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(token)
}

/// Cancel `token`. Returns false if it was already cancelled.
fn interrupt(token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    warn!("Interrupted, stopping at the next buffer or timepoint");
    eprintln!("Interrupted, finishing the current step (Ctrl-C again to abort)");
    token.cancel();
    true
}
