use tracing::info;

/// Where the guardian sends the user when the session changes underneath them.
pub trait Navigator: Send + Sync {
    fn push(&self, path: &str);

    /// Re-render the current view with fresh auth state.
    fn refresh(&self);
}

// Headless clients just log the intent
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn push(&self, path: &str) {
        info!(path, "navigate");
    }

    fn refresh(&self) {
        info!("refresh view");
    }
}
