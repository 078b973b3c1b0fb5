#![allow(dead_code)]

use frost_common::Error;
use frost_query::{FnNode, PlanNodeRef};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records the order in which plan nodes ran.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn node(&self, name: &str, children: Vec<PlanNodeRef>) -> PlanNodeRef {
        let journal = self.clone();
        let label = name.to_string();
        Arc::new(
            FnNode::new(name, move || {
                journal.record(label.clone());
                Ok(())
            })
            .with_children(children),
        )
    }

    pub fn failing(&self, name: &str, children: Vec<PlanNodeRef>) -> PlanNodeRef {
        let journal = self.clone();
        let label = name.to_string();
        Arc::new(
            FnNode::new(name, move || {
                journal.record(label.clone());
                Err(node_error(&label))
            })
            .with_children(children),
        )
    }
}

pub fn node_error(name: &str) -> Error {
    Error::execution(format!("{name} failed"))
}
