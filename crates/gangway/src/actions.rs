//! Imperative data actions with shell feedback.
//!
//! Queries observe; actions mutate. An action fires one authenticated
//! request outside the cache, optionally revalidates a related query when it
//! succeeds, and reports the outcome to the user through the shell's toast
//! capability. Failures are surfaced as a transient notification and never
//! block further interaction.
//!
//! All shell calls are guarded on availability: with no shell connected the
//! action still runs, it just has nowhere to announce itself.

use anyhow::{Context, Result};
use log::warn;
use serde_json::Value;
use typed_builder::TypedBuilder;

use gangway_client::{QueryClient, QueryRequest};
use gangway_common::SharedShell;

/// A user-triggered mutation against the backend.
///
/// # Examples
///
/// ```
/// use gangway::actions::DataAction;
/// use gangway_client::QueryRequest;
///
/// let action = DataAction::builder()
///     .request(QueryRequest::new("/api/products/create").with_method("POST"))
///     .refetch(QueryRequest::new("/api/products/count"))
///     .success_toast("5 products created!")
///     .error_toast("There was an error creating products")
///     .build();
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct DataAction {
    /// The request to fire.
    request: QueryRequest,
    /// Query to revalidate after a successful run.
    #[builder(default, setter(strip_option))]
    refetch: Option<QueryRequest>,
    /// Toast shown on success.
    #[builder(default, setter(strip_option, into))]
    success_toast: Option<String>,
    /// Toast shown on failure.
    #[builder(default, setter(strip_option, into))]
    error_toast: Option<String>,
}

impl DataAction {
    /// Runs the action.
    ///
    /// The request goes through the client's credential and timeout pipeline
    /// but not its cache. On success the `refetch` query, if any, is
    /// revalidated so subscribers see the mutation's effect, and the success
    /// toast is shown. On failure the error toast is shown.
    ///
    /// # Errors
    ///
    /// Returns the underlying failure after the error toast has been shown.
    pub async fn run(
        &self,
        client: &QueryClient,
        shell: Option<&SharedShell>,
    ) -> Result<Value> {
        match client.execute(&self.request).await {
            Ok(value) => {
                if let Some(refetch) = &self.refetch
                    && let Err(error) = client.refetch(refetch).await
                {
                    warn!(
                        "post-action revalidation of '{}' failed: {error}",
                        refetch.url
                    );
                }
                if let (Some(shell), Some(message)) = (shell, &self.success_toast) {
                    shell.toast(message, false);
                }
                Ok(value)
            }
            Err(error) => {
                warn!("action '{}' failed: {error}", self.request.url);
                if let (Some(shell), Some(message)) = (shell, &self.error_toast) {
                    shell.toast(message, true);
                }
                Err(error).with_context(|| format!("action '{}' failed", self.request.url))
            }
        }
    }
}
