//! Execute the server action.

use anyhow::Result;

use crate::api;
use crate::cli::actions::Action;

/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, config } => api::serve(port, dsn, config).await,
    }
}
