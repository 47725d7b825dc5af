//! Delete rules attached to entities through `(OnDelete, X)` and `(OnDeleteTarget, X)` pairs.

use super::{Entity, DELETE, ERROR, REMOVE};

/// What happens to the holders of an id when the id is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reaction {
    /// Strip the id from every entity holding it.
    #[default]
    Remove,
    /// Delete every entity holding it.
    Delete,
    /// Refuse the deletion.
    Error,
}

impl Reaction {
    /// Decodes the reaction from the target of an `OnDelete`/`OnDeleteTarget` pair.
    pub(crate) fn from_target(target: Entity) -> Option<Self> {
        if target == REMOVE {
            Some(Self::Remove)
        } else if target == DELETE {
            Some(Self::Delete)
        } else if target == ERROR {
            Some(Self::Error)
        } else {
            None
        }
    }
}

/// The delete rules cached in an entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rules {
    /// Applies to holders of the entity itself and of pairs using it as the relation.
    pub on_delete:        Reaction,
    /// Applies to holders of pairs using the entity as the relation when the target dies.
    pub on_delete_target: Reaction,
}
