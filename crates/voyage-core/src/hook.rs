//! Lifecycle hooks and the per-call diagnostic context.
//!
//! The original design threaded an MDC-style thread-local through every
//! call; here the context is an explicit value the engine builds, enriches
//! at each boundary, and hands to hooks and steps. Nothing is smuggled
//! through thread-locals.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::status::{Direction, OperationStatus};

/// Caller-supplied context, enriched by the engine at flight/step boundaries.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    pub operation_id: Option<String>,
    pub class_name: Option<String>,
    pub step_index: Option<usize>,
    pub direction: Option<Direction>,
    pub extra: BTreeMap<String, Value>,
}

impl DiagnosticContext {
    pub fn for_operation(operation_id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            operation_id: Some(operation_id.into()),
            class_name: Some(class_name.into()),
            step_index: None,
            direction: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn at_step(&self, step_index: usize, direction: Direction) -> Self {
        let mut ctx = self.clone();
        ctx.step_index = Some(step_index);
        ctx.direction = Some(direction);
        ctx
    }
}

/// Lifecycle callbacks; every method has a no-op default so implementors
/// override only what they need.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn on_flight_start(&self, _ctx: &DiagnosticContext) {}
    async fn on_flight_end(&self, _ctx: &DiagnosticContext, _status: OperationStatus) {}
    async fn on_step_start(&self, _ctx: &DiagnosticContext) {}
    async fn on_step_end(&self, _ctx: &DiagnosticContext) {}
    async fn on_state_transition(
        &self,
        _ctx: &DiagnosticContext,
        _from: OperationStatus,
        _to: OperationStatus,
    ) {
    }
}

/// A fan-out list of hooks invoked in registration order.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<std::sync::Arc<dyn Hook>>,
}

impl HookList {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn push(&mut self, hook: std::sync::Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub async fn flight_start(&self, ctx: &DiagnosticContext) {
        for h in &self.hooks {
            h.on_flight_start(ctx).await;
        }
    }

    pub async fn flight_end(&self, ctx: &DiagnosticContext, status: OperationStatus) {
        for h in &self.hooks {
            h.on_flight_end(ctx, status).await;
        }
    }

    pub async fn step_start(&self, ctx: &DiagnosticContext) {
        for h in &self.hooks {
            h.on_step_start(ctx).await;
        }
    }

    pub async fn step_end(&self, ctx: &DiagnosticContext) {
        for h in &self.hooks {
            h.on_step_end(ctx).await;
        }
    }

    pub async fn state_transition(
        &self,
        ctx: &DiagnosticContext,
        from: OperationStatus,
        to: OperationStatus,
    ) {
        for h in &self.hooks {
            h.on_state_transition(ctx, from, to).await;
        }
    }
}
