// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fact/hyp builders with single-use commit semantics (`spec.md` §4.6).

use crate::{Console, ConsoleError};
use bb_types::{FactId, HypId, Value};
use std::collections::BTreeMap;

/// Builds a fact before committing it through a [`Console`].
///
/// Calling [`build_and_add`](Self::build_and_add) more than once, or
/// mutating the builder afterward, returns [`ConsoleError::Immutable`]
/// rather than panicking.
#[derive(Clone, Debug)]
pub struct FactBuilder {
    fact_type: String,
    fields: BTreeMap<String, Value>,
    parent_objects: Vec<u64>,
    parent_facts: Vec<u64>,
    parent_hyps: Vec<u64>,
    added: bool,
}

impl FactBuilder {
    /// Start building a fact of the given registered type.
    pub fn new(fact_type: impl Into<String>) -> Self {
        Self {
            fact_type: fact_type.into(),
            fields: BTreeMap::new(),
            parent_objects: Vec::new(),
            parent_facts: Vec::new(),
            parent_hyps: Vec::new(),
            added: false,
        }
    }

    /// Set a field value. Rejected once the builder has been committed.
    pub fn field(&mut self, name: impl Into<String>, value: Value) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.fields.insert(name.into(), value);
        Ok(self)
    }

    /// Declare a parent object.
    pub fn parent_object(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_objects.push(id);
        Ok(self)
    }

    /// Declare a parent fact.
    pub fn parent_fact(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_facts.push(id);
        Ok(self)
    }

    /// Declare a parent hyp.
    pub fn parent_hyp(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_hyps.push(id);
        Ok(self)
    }

    fn guard(&self) -> Result<(), ConsoleError> {
        if self.added {
            return Err(ConsoleError::Immutable);
        }
        Ok(())
    }

    /// Commit this builder to the blackboard. Subsequent calls (or further
    /// mutation) return [`ConsoleError::Immutable`].
    pub async fn build_and_add(&mut self, console: &Console) -> Result<FactId, ConsoleError> {
        self.guard()?;
        let id = console
            .store()
            .add_fact(
                console.registry(),
                &self.fact_type,
                self.fields.clone(),
                console.creator_name(),
                self.parent_objects.clone(),
                self.parent_facts.clone(),
                self.parent_hyps.clone(),
                console.now(),
            )
            .await?;
        self.added = true;
        Ok(id)
    }
}

/// As [`FactBuilder`], but commits into the hyp table.
#[derive(Clone, Debug)]
pub struct HypBuilder {
    fact_type: String,
    fields: BTreeMap<String, Value>,
    parent_objects: Vec<u64>,
    parent_facts: Vec<u64>,
    parent_hyps: Vec<u64>,
    added: bool,
}

impl HypBuilder {
    /// Start building a hyp of the given registered type.
    pub fn new(fact_type: impl Into<String>) -> Self {
        Self {
            fact_type: fact_type.into(),
            fields: BTreeMap::new(),
            parent_objects: Vec::new(),
            parent_facts: Vec::new(),
            parent_hyps: Vec::new(),
            added: false,
        }
    }

    /// Set a field value. Rejected once the builder has been committed.
    pub fn field(&mut self, name: impl Into<String>, value: Value) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.fields.insert(name.into(), value);
        Ok(self)
    }

    /// Declare a parent object.
    pub fn parent_object(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_objects.push(id);
        Ok(self)
    }

    /// Declare a parent fact.
    pub fn parent_fact(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_facts.push(id);
        Ok(self)
    }

    /// Declare a parent hyp.
    pub fn parent_hyp(&mut self, id: u64) -> Result<&mut Self, ConsoleError> {
        self.guard()?;
        self.parent_hyps.push(id);
        Ok(self)
    }

    fn guard(&self) -> Result<(), ConsoleError> {
        if self.added {
            return Err(ConsoleError::Immutable);
        }
        Ok(())
    }

    /// Commit this builder to the blackboard. Subsequent calls (or further
    /// mutation) return [`ConsoleError::Immutable`].
    pub async fn build_and_add(&mut self, console: &Console) -> Result<HypId, ConsoleError> {
        self.guard()?;
        let id = console
            .store()
            .add_hyp(
                console.registry(),
                &self.fact_type,
                self.fields.clone(),
                console.creator_name(),
                self.parent_objects.clone(),
                self.parent_facts.clone(),
                self.parent_hyps.clone(),
                console.now(),
            )
            .await?;
        self.added = true;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_mutation_after_guard_check_is_rejected() {
        let mut builder = FactBuilder::new("md5");
        builder.added = true;
        assert!(matches!(
            builder.field("x", Value::Int(1)),
            Err(ConsoleError::Immutable)
        ));
    }
}
