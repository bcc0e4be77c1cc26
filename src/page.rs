//! Page-wide flags: failure lockdown, submit gating, unsaved edits.

use tracing::warn;

pub const RELOAD_BANNER: &str = "Page needs to be reloaded.";

/// Process-wide page state. `locked` is one-way: once an unrecoverable
/// failure is observed the only exit is a full page reload, so nothing here
/// ever clears it.
#[derive(Clone, Debug)]
pub struct PageState {
    locked: bool,
    banner: Option<String>,
    /// The form has user edits not yet submitted. Only explicit field edits
    /// set this; controller round trips preserve it either way.
    unsaved: bool,
    submit_enabled: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            locked: false,
            banner: None,
            unsaved: false,
            submit_enabled: true,
        }
    }
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    /// Idempotent, terminal. Disables submission and raises the banner;
    /// the controller also disables every per-collection affordance.
    pub fn lockdown(&mut self) {
        if self.locked {
            return;
        }
        warn!("page lockdown: all controls disabled until reload");
        self.locked = true;
        self.submit_enabled = false;
        self.banner = Some(RELOAD_BANNER.to_string());
    }

    /// Submission is held while uploads are outstanding.
    pub fn hold_submit(&mut self) {
        self.submit_enabled = false;
    }

    /// Re-enable submission after the upload queue drains. No-op once
    /// locked.
    pub fn release_submit(&mut self) {
        if !self.locked {
            self.submit_enabled = true;
        }
    }

    pub fn set_unsaved(&mut self, unsaved: bool) {
        self.unsaved = unsaved;
    }

    /// Run a mechanical refresh without letting it flip the unsaved flag in
    /// either direction.
    pub fn preserve_unsaved<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let prior = self.unsaved;
        let out = f(self);
        self.unsaved = prior;
        out
    }
}

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
