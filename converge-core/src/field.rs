//! Client-side attribute values.
//!
//! [`Field`] keeps "never set" apart from "explicitly cleared" so the codec can
//! omit the former and send an empty value for the latter. [`Allocation`] makes
//! "explicit list XOR count" attribute pairs a single tagged value, so both
//! halves can never be populated at once.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Value of an optional attribute in desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    /// Not present in configuration. Optional+computed attributes keep the
    /// server's value; plain optional attributes converge to empty.
    Unset,
    /// Explicitly set to the empty value.
    Cleared,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T> Field<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Field::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Clone + Default> Field<T> {
    /// Wire form: unset is omitted, cleared is sent as the empty value.
    pub fn encode(&self) -> Option<T> {
        match self {
            Field::Unset => None,
            Field::Cleared => Some(T::default()),
            Field::Set(v) => Some(v.clone()),
        }
    }
}

impl<T: Clone> Field<T> {
    /// Nested single-block wire form: at most one element, empty unless set.
    pub fn singleton(&self) -> Vec<T> {
        self.as_set().cloned().into_iter().collect()
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Set(v),
            None => Field::Unset,
        }
    }
}

/// A collection attribute given either as an explicit set of members or as a
/// count the server fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Explicit(BTreeSet<String>),
    Derived(u32),
}

impl Allocation {
    pub fn explicit<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Allocation::Explicit(items.into_iter().map(Into::into).collect())
    }

    /// Whether this is an explicit list with at least one member.
    pub fn has_members(&self) -> bool {
        matches!(self, Allocation::Explicit(items) if !items.is_empty())
    }

    /// Build from the loose two-attribute form, rejecting configurations that
    /// populate both halves.
    pub fn from_parts(
        list_attr: &'static str,
        count_attr: &'static str,
        list: Option<Vec<String>>,
        count: Option<u32>,
    ) -> Result<Field<Allocation>, ValidationError> {
        match (list, count) {
            (Some(_), Some(_)) => Err(ValidationError::ConflictingAttributes(
                list_attr, count_attr,
            )),
            (Some(list), None) => Ok(Field::Set(Allocation::explicit(list))),
            (None, Some(count)) => Ok(Field::Set(Allocation::Derived(count))),
            (None, None) => Ok(Field::Unset),
        }
    }
}

/// Split an allocation into its (list, count) wire halves. At most one is `Some`.
pub fn encode_allocation(field: &Field<Allocation>) -> (Option<Vec<String>>, Option<u32>) {
    match field {
        Field::Unset => (None, None),
        Field::Cleared => (Some(Vec::new()), None),
        Field::Set(Allocation::Explicit(items)) => (Some(items.iter().cloned().collect()), None),
        Field::Set(Allocation::Derived(count)) => (None, Some(*count)),
    }
}
