use std::sync::Arc;

use gsm_core::{MAX_SPANS, SpanId};

use super::control::SpanControl;
use crate::error::GatewayErr;

/// Fixed-size arena of span control blocks, addressed by validated span id
pub struct SpanRegistry {
    spans: [Option<Arc<SpanControl>>; MAX_SPANS],
}

impl SpanRegistry {
    pub fn new() -> Self {
        Self {
            spans: std::array::from_fn(|_| None),
        }
    }

    pub fn insert(&mut self, ctl: Arc<SpanControl>) -> Result<(), GatewayErr> {
        let slot = &mut self.spans[ctl.span.index()];
        if slot.is_some() {
            return Err(GatewayErr::Failed(format!("span {} registered twice", ctl.span)));
        }
        *slot = Some(ctl);
        Ok(())
    }

    pub fn get(&self, span: SpanId) -> Option<&Arc<SpanControl>> {
        self.spans[span.index()].as_ref()
    }

    /// Resolves a raw span number as given by the framework
    pub fn lookup(&self, number: u32) -> Result<&Arc<SpanControl>, GatewayErr> {
        let span = SpanId::new(number)?;
        self.get(span).ok_or(GatewayErr::SpanNotConfigured(span))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SpanControl>> {
        self.spans.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SpanRegistry {
    fn default() -> Self {
        Self::new()
    }
}
