//! Non-fatal failure reporting.
//!
//! Query and scheduler paths never swallow failures; recoverable ones land
//! here as diagnostics with an optional host-supplied observer callback.
//! Command-buffer flush uses the same sink for its per-entity skips.

use crate::component::ComponentTypeId;
use crate::entity::Entity;
use crate::error::EcsError;

/// One reported failure.
#[derive(Debug)]
pub struct Diagnostic {
    pub error: EcsError,
    pub entity: Option<Entity>,
    pub type_id: Option<ComponentTypeId>,
    pub message: String,
}

type Observer = Box<dyn Fn(&Diagnostic) + Send + Sync>;

/// Collected diagnostics list plus observer hook.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    observer: Option<Observer>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            error = %diagnostic.error,
            entity = ?diagnostic.entity,
            "{}",
            diagnostic.message
        );
        if let Some(observer) = &self.observer {
            observer(&diagnostic);
        }
        self.entries.push(diagnostic);
    }

    pub fn report_error(
        &mut self,
        error: EcsError,
        entity: Option<Entity>,
        type_id: Option<ComponentTypeId>,
        message: impl Into<String>,
    ) {
        self.report(Diagnostic {
            error,
            entity,
            type_id,
            message: message.into(),
        });
    }

    /// Host callback invoked on every report.
    pub fn set_observer(&mut self, observer: impl Fn(&Diagnostic) + Send + Sync + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
