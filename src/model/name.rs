//! Name atoms and compound names.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Error, Result};

/// One edge label in the naming graph: an `(id, kind)` pair.
///
/// Equality is structural over both fields. An atom with both fields empty
/// is the "empty atom"; it is only meaningful as the self-reference sentinel
/// on `resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameAtom {
    pub id: String,
    pub kind: String,
}

impl NameAtom {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { id: id.into(), kind: kind.into() }
    }

    /// Atom with an empty kind.
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }

    pub fn empty() -> Self {
        Self::new("", "")
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.kind.is_empty()
    }
}

impl From<&str> for NameAtom {
    fn from(id: &str) -> Self {
        NameAtom::id(id)
    }
}

impl From<(&str, &str)> for NameAtom {
    fn from((id, kind): (&str, &str)) -> Self {
        NameAtom::new(id, kind)
    }
}

impl fmt::Display for NameAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}.{}", self.id, self.kind)
        }
    }
}

/// An ordered path of atoms, resolved left to right.
///
/// Most names are a handful of components deep, so the atoms live inline.
/// The type itself admits the empty sequence (it is what an IDL `Name` can
/// carry on the wire); every engine operation rejects it with
/// [`Error::InvalidName`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompoundName(SmallVec<[NameAtom; 4]>);

impl CompoundName {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Build a name of kind-less atoms, e.g. `CompoundName::of(["users", "alice"])`.
    pub fn of<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NameAtom>,
    {
        ids.into_iter().map(Into::into).collect()
    }

    pub fn push(&mut self, atom: NameAtom) {
        self.0.push(atom);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn atoms(&self) -> &[NameAtom] {
        &self.0
    }

    pub fn first(&self) -> Option<&NameAtom> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&NameAtom> {
        self.0.last()
    }

    /// The suffix starting at `index` (the IDL `rest_of_name`).
    pub fn rest_from(&self, index: usize) -> CompoundName {
        self.0.get(index..).unwrap_or(&[]).iter().cloned().collect()
    }

    /// True when this is the single-empty-atom name that denotes the
    /// target context itself.
    pub fn is_self_reference(&self) -> bool {
        self.0.len() == 1 && self.0[0].is_empty()
    }

    /// Reject the empty name and any empty atom.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.iter().any(NameAtom::is_empty) {
            return Err(Error::InvalidName);
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameAtom> {
        self.0.iter()
    }
}

impl FromIterator<NameAtom> for CompoundName {
    fn from_iter<I: IntoIterator<Item = NameAtom>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<NameAtom>> for CompoundName {
    fn from(atoms: Vec<NameAtom>) -> Self {
        Self(SmallVec::from_vec(atoms))
    }
}

impl From<NameAtom> for CompoundName {
    fn from(atom: NameAtom) -> Self {
        std::iter::once(atom).collect()
    }
}

impl<'a> IntoIterator for &'a CompoundName {
    type Item = &'a NameAtom;
    type IntoIter = std::slice::Iter<'a, NameAtom>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for CompoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}
