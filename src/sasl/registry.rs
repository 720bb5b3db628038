//! Registered mechanisms, in registration order.

use std::sync::Arc;

use super::codec::SASL_S2S_MAXLEN;
use super::mechanism::Mechanism;

#[derive(Default)]
pub struct MechanismRegistry {
    mechanisms: Vec<Arc<dyn Mechanism>>,
}

impl MechanismRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mechanism`. Callers remove an existing registration with the
    /// same name first.
    pub fn register(&mut self, mechanism: Arc<dyn Mechanism>) {
        self.mechanisms.push(mechanism);
    }

    /// Remove the mechanism called `name`, returning it if it was registered.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Mechanism>> {
        let index = self
            .mechanisms
            .iter()
            .position(|mechanism| mechanism.name() == name)?;
        Some(self.mechanisms.remove(index))
    }

    /// Case-sensitive lookup.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn Mechanism>> {
        self.mechanisms
            .iter()
            .find(|mechanism| mechanism.name() == name)
            .cloned()
    }

    /// Comma-separated names in registration order, cut before the first
    /// name that would push the list past one frame.
    #[must_use]
    pub fn advertisement(&self) -> String {
        let mut list = String::new();
        for name in self.names() {
            let needed = if list.is_empty() {
                name.len()
            } else {
                name.len() + 1
            };
            if list.len() + needed > SASL_S2S_MAXLEN {
                break;
            }
            if !list.is_empty() {
                list.push(',');
            }
            list.push_str(name);
        }
        list
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mechanisms.iter().map(|mechanism| mechanism.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }
}
