//! Link wiring surface.
//!
//! A link runs from a component's output to a component's input through
//! zero or more adapters. Build one with [`src`] and [`dst`] and the
//! `>>` operator:
//!
//! ```ignore
//! composition.link(src(a, "flow") >> Scale::new(2.0) >> dst(b, "inflow"))?;
//! ```
//!
//! The builder is plain data; nothing touches the composition until
//! [`Composition::link`](crate::Composition::link) realizes it.

use std::ops::Shr;

use confluence_sdk::{Adapter, ComponentKey};

/// Start of a link: a component's output slot.
pub fn src(component: ComponentKey, slot: &str) -> LinkBuilder {
    LinkBuilder {
        source: (component, slot.to_string()),
        adapters: Vec::new(),
    }
}

/// End of a link: a component's input slot.
pub fn dst(component: ComponentKey, slot: &str) -> LinkEnd {
    LinkEnd {
        target: (component, slot.to_string()),
    }
}

/// A link under construction: source plus the adapters chained so far.
pub struct LinkBuilder {
    pub(crate) source: (ComponentKey, String),
    pub(crate) adapters: Vec<Box<dyn Adapter>>,
}

/// The terminating end of a link chain.
pub struct LinkEnd {
    pub(crate) target: (ComponentKey, String),
}

/// A fully-specified link, ready for
/// [`Composition::link`](crate::Composition::link).
pub struct Link {
    pub(crate) source: (ComponentKey, String),
    pub(crate) adapters: Vec<Box<dyn Adapter>>,
    pub(crate) target: (ComponentKey, String),
}

impl<A: Adapter> Shr<A> for LinkBuilder {
    type Output = LinkBuilder;

    fn shr(mut self, adapter: A) -> LinkBuilder {
        self.adapters.push(Box::new(adapter));
        self
    }
}

impl Shr<LinkEnd> for LinkBuilder {
    type Output = Link;

    fn shr(self, end: LinkEnd) -> Link {
        Link {
            source: self.source,
            adapters: self.adapters,
            target: end.target,
        }
    }
}
