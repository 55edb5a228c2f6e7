//! Lifecycle hook surface.

use crate::error::Result;
use crate::types::Reference;
use std::any::Any;

/// Receiver of lifecycle callbacks from an instrumented pipeline.
///
/// Every hook has a no-op default so implementors only override what they
/// need. Payloads of `next` and `error` are opaque.
///
/// Hooks must be invoked in exactly the order the underlying events occur,
/// including nested and re-entrant ones.
pub trait Plugin: Send + Sync {
    fn before_subscribe(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    fn after_subscribe(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    fn before_next(&self, _reference: &Reference, _value: &dyn Any) -> Result<()> {
        Ok(())
    }

    fn after_next(&self, _reference: &Reference, _value: &dyn Any) -> Result<()> {
        Ok(())
    }

    fn before_error(&self, _reference: &Reference, _error: &dyn Any) -> Result<()> {
        Ok(())
    }

    fn after_error(&self, _reference: &Reference, _error: &dyn Any) -> Result<()> {
        Ok(())
    }

    fn before_complete(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    fn after_complete(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    fn before_unsubscribe(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    fn after_unsubscribe(&self, _reference: &Reference) -> Result<()> {
        Ok(())
    }

    /// Push any buffered state to external collaborators.
    fn flush(&self) {}

    /// Release all state; the plugin is being removed.
    fn teardown(&self) {}
}
