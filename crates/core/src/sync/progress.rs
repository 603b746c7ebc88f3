//! Loading progress notifications for whoever drives a load (UI, CLI, scheduler).

/// Receives lifecycle and progress of one overall load operation.
///
/// `start` and `end` are invoked once per load; `update` receives a ratio in `[0, 1]`.
pub trait ProgressNotifier: Send + Sync {
    fn start(&self);

    fn update(&self, ratio: f32);

    fn end(&self);
}

/// Notifier that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressNotifier for NoopProgress {
    fn start(&self) {}

    fn update(&self, _ratio: f32) {}

    fn end(&self) {}
}
