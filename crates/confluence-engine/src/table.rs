//! The component table: ownership, lifecycle dispatch, and callback
//! routing.
//!
//! The composition owns its components here. Every hook call checks the
//! component's box out of its entry for the duration of the call, so the
//! hosted code can trigger cascades that route back into *other*
//! components through the [`CallbackHost`] implementation without
//! aliasing. A checked-out entry that is hit again is a re-entrant
//! cascade, reported as a setup error.

use confluence_core::{CompositionError, Envelope, PullError, SetupError, Time};
use confluence_sdk::{
    CallbackHost, Component, ComponentKey, ComponentStatus, ConnectStatus, InitContext,
    LinkGraph, SlotContext, SlotTable, Timing,
};
use tracing::debug;

pub(crate) struct ComponentEntry {
    component: Option<Box<dyn Component>>,
    name: String,
    slots: SlotTable,
    status: ComponentStatus,
    last_next_time: Option<Time>,
}

/// Owner of all hosted components, indexed by [`ComponentKey`].
#[derive(Default)]
pub(crate) struct ComponentTable {
    entries: Vec<ComponentEntry>,
}

impl ComponentTable {
    pub(crate) fn add(&mut self, component: Box<dyn Component>) -> Result<ComponentKey, SetupError> {
        let name = component.name().to_string();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(SetupError::DuplicateComponent { name });
        }
        let key = ComponentKey(self.entries.len() as u32);
        self.entries.push(ComponentEntry {
            component: Some(component),
            name,
            slots: SlotTable::default(),
            status: ComponentStatus::Created,
            last_next_time: None,
        });
        Ok(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn name(&self, idx: usize) -> &str {
        &self.entries[idx].name
    }

    pub(crate) fn status(&self, idx: usize) -> ComponentStatus {
        self.entries[idx].status
    }

    pub(crate) fn set_status(&mut self, idx: usize, status: ComponentStatus) {
        self.entries[idx].status = status;
    }

    pub(crate) fn slots(&self, idx: usize) -> &SlotTable {
        &self.entries[idx].slots
    }

    pub(crate) fn timing(&self, idx: usize) -> Option<Timing> {
        self.entries[idx].component.as_ref()?.timing()
    }

    pub(crate) fn last_next_time(&self, idx: usize) -> Option<Time> {
        self.entries[idx].last_next_time
    }

    pub(crate) fn record_next_time(&mut self, idx: usize, next: Time) {
        self.entries[idx].last_next_time = Some(next);
    }

    fn checkout(&mut self, idx: usize) -> Result<Box<dyn Component>, SetupError> {
        self.entries[idx]
            .component
            .take()
            .ok_or_else(|| SetupError::ReentrantNode {
                node: self.entries[idx].name.clone(),
            })
    }

    fn fail(&mut self, idx: usize, phase: &'static str, source: confluence_core::ComponentError) -> CompositionError {
        self.entries[idx].status = ComponentStatus::Failed;
        CompositionError::Component {
            component: self.entries[idx].name.clone(),
            phase,
            source,
        }
    }

    // ── Lifecycle dispatch ─────────────────────────────────────────

    pub(crate) fn call_initialize(
        &mut self,
        graph: &mut LinkGraph,
        idx: usize,
    ) -> Result<(), CompositionError> {
        let mut component = self.checkout(idx).map_err(CompositionError::Setup)?;
        let name = self.entries[idx].name.clone();
        let mut slots = std::mem::take(&mut self.entries[idx].slots);
        let result = {
            let mut ctx = InitContext::new(graph, ComponentKey(idx as u32), &name, &mut slots);
            component.initialize(&mut ctx)
        };
        self.entries[idx].slots = slots;
        self.entries[idx].component = Some(component);
        match result {
            Ok(()) => {
                self.entries[idx].status = ComponentStatus::Initialized;
                debug!(component = %name, "initialized");
                Ok(())
            }
            Err(e) => Err(self.fail(idx, "initialize", e)),
        }
    }

    pub(crate) fn call_connect(
        &mut self,
        graph: &mut LinkGraph,
        idx: usize,
        time: Time,
    ) -> Result<ConnectStatus, CompositionError> {
        let mut component = self.checkout(idx).map_err(CompositionError::Setup)?;
        let name = self.entries[idx].name.clone();
        let slots = self.entries[idx].slots.clone();
        let result = {
            let mut ctx = SlotContext::new(graph, self, slots, name, time);
            component.connect(&mut ctx)
        };
        self.entries[idx].component = Some(component);
        result.map_err(|e| self.fail(idx, "connect", e))
    }

    pub(crate) fn call_validate(
        &mut self,
        graph: &mut LinkGraph,
        idx: usize,
        time: Time,
    ) -> Result<(), CompositionError> {
        let mut component = self.checkout(idx).map_err(CompositionError::Setup)?;
        let name = self.entries[idx].name.clone();
        let slots = self.entries[idx].slots.clone();
        let result = {
            let mut ctx = SlotContext::new(graph, self, slots, name, time);
            component.validate(&mut ctx)
        };
        self.entries[idx].component = Some(component);
        match result {
            Ok(()) => {
                self.entries[idx].status = ComponentStatus::Validated;
                Ok(())
            }
            Err(e) => Err(self.fail(idx, "validate", e)),
        }
    }

    pub(crate) fn call_update(
        &mut self,
        graph: &mut LinkGraph,
        idx: usize,
        time: Time,
    ) -> Result<(), CompositionError> {
        let mut component = self.checkout(idx).map_err(CompositionError::Setup)?;
        let name = self.entries[idx].name.clone();
        let slots = self.entries[idx].slots.clone();
        let result = {
            let mut ctx = SlotContext::new(graph, self, slots, name, time);
            component.update(&mut ctx)
        };
        self.entries[idx].component = Some(component);
        match result {
            Ok(()) => {
                self.entries[idx].status = ComponentStatus::Updated;
                Ok(())
            }
            Err(e) => Err(self.fail(idx, "update", e)),
        }
    }

    pub(crate) fn call_finalize(&mut self, idx: usize) -> Result<(), CompositionError> {
        let mut component = self.checkout(idx).map_err(CompositionError::Setup)?;
        let result = component.finalize();
        self.entries[idx].component = Some(component);
        match result {
            Ok(()) => {
                self.entries[idx].status = ComponentStatus::Finalized;
                Ok(())
            }
            Err(e) => Err(self.fail(idx, "finalize", e)),
        }
    }
}

// ── Callback routing ───────────────────────────────────────────────

impl CallbackHost for ComponentTable {
    fn deliver_notification(
        &mut self,
        graph: &mut LinkGraph,
        owner: ComponentKey,
        input: &str,
        time: Time,
    ) -> Result<(), PullError> {
        let idx = owner.0 as usize;
        let mut component = self.checkout(idx).map_err(PullError::Setup)?;
        let name = self.entries[idx].name.clone();
        let slots = self.entries[idx].slots.clone();
        let result = {
            let mut ctx = SlotContext::new(graph, self, slots, name.clone(), time);
            component.source_updated(&mut ctx, input, time)
        };
        self.entries[idx].component = Some(component);
        result.map_err(|e| {
            self.entries[idx].status = ComponentStatus::Failed;
            PullError::Component {
                component: name,
                reason: e.to_string(),
            }
        })
    }

    fn generate(
        &mut self,
        graph: &mut LinkGraph,
        owner: ComponentKey,
        output: &str,
        time: Time,
    ) -> Result<Envelope, PullError> {
        let idx = owner.0 as usize;
        let mut component = self.checkout(idx).map_err(PullError::Setup)?;
        let name = self.entries[idx].name.clone();
        let slots = self.entries[idx].slots.clone();
        let result = {
            let mut ctx = SlotContext::new(graph, self, slots, name.clone(), time);
            component.generate(&mut ctx, output, time)
        };
        self.entries[idx].component = Some(component);
        result.map_err(|e| {
            self.entries[idx].status = ComponentStatus::Failed;
            PullError::Component {
                component: name,
                reason: e.to_string(),
            }
        })
    }
}
