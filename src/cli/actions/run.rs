use crate::cli::actions::{Action, keys, server};
use anyhow::Result;
use tracing::debug;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Keys => {
            debug!("generating key material");
            keys::execute()
        }
    }
}
