use std::fmt::{Display, Formatter};

/// Handle of one node in an engine's arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Counters for node handles, control ids and generated form names.
///
/// Owned by one engine, so separate engines (and separate tests) never
/// observe each other's numbering.
#[derive(Debug, Default)]
pub struct IdAllocator {
    nodes: u64,
    controls: u64,
    forms: u64,
}

impl IdAllocator {
    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.nodes);
        self.nodes += 1;
        id
    }

    pub fn control_id(&mut self, name: &str) -> String {
        let id = format!("{name}-{}", self.controls);
        self.controls += 1;
        id
    }

    pub fn form_name(&mut self) -> String {
        let name = format!("Form-{}", self.forms);
        self.forms += 1;
        name
    }
}
