//! Per-frame scene arena.
//!
//! A [`SceneSnapshot`] owns the [`ObjectRecord`]s of one simulation frame and
//! two indices rebuilt on construction: id → slot and type → ids. Nothing is
//! mutated after construction; a new frame means a new snapshot.
//!
//! # Example
//!
//! ```rust
//! use spatial_types::{BoundingSize, ObjectRecord, SceneSnapshot, Vec3};
//!
//! let size = BoundingSize::new(0.2, 0.05, 0.3);
//! let scene = SceneSnapshot::new(vec![
//!     ObjectRecord::new("Book|2", "Book", Vec3::new(1.0, 0.8, 0.0), size),
//!     ObjectRecord::new("Book|1", "Book", Vec3::new(-1.0, 0.8, 0.0), size),
//! ])
//! .unwrap();
//!
//! let books = scene.candidates_of_type("book");
//! assert_eq!(books.len(), 2);
//! assert_eq!(books[0].id, "Book|1");
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::{ObjectRecord, SpatialError};

/// Immutable, indexed view over one frame's objects.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    objects: Vec<ObjectRecord>,
    by_id: HashMap<String, usize>,
    /// Lowercased type → ids in ascending order.
    by_type: BTreeMap<String, Vec<String>>,
}

impl SceneSnapshot {
    /// Index `objects`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateObjectId`] when two records share an
    /// id.
    pub fn new(objects: Vec<ObjectRecord>) -> Result<Self, SpatialError> {
        let mut by_id = HashMap::with_capacity(objects.len());
        let mut by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (slot, obj) in objects.iter().enumerate() {
            if by_id.insert(obj.id.clone(), slot).is_some() {
                return Err(SpatialError::DuplicateObjectId(obj.id.clone()));
            }
            by_type
                .entry(obj.object_type.to_ascii_lowercase())
                .or_default()
                .push(obj.id.clone());
        }
        for ids in by_type.values_mut() {
            ids.sort();
        }

        Ok(Self {
            objects,
            by_id,
            by_type,
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }

    pub fn get(&self, id: &str) -> Option<&ObjectRecord> {
        self.by_id.get(id).map(|&slot| &self.objects[slot])
    }

    /// Ids of every instance of `object_type` (case-insensitive), ascending.
    pub fn ids_of_type(&self, object_type: &str) -> &[String] {
        self.by_type
            .get(&object_type.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every instance of `object_type`, ordered by ascending id.
    pub fn candidates_of_type(&self, object_type: &str) -> Vec<&ObjectRecord> {
        self.ids_of_type(object_type)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// True when more than one instance shares `object_type`.
    pub fn is_ambiguous(&self, object_type: &str) -> bool {
        self.ids_of_type(object_type).len() > 1
    }

    /// Every object whose type is one of `landmark_types` (case-insensitive).
    pub fn landmarks<'a>(&'a self, landmark_types: &'a [String]) -> impl Iterator<Item = &'a ObjectRecord> + 'a {
        self.objects
            .iter()
            .filter(move |o| landmark_types.iter().any(|t| o.is_type(t)))
    }

    /// The receptacle holding `id`, resolved from either side of the
    /// containment back-reference.
    pub fn container_of(&self, id: &str) -> Option<&ObjectRecord> {
        let obj = self.get(id)?;
        if let Some(parent) = obj.contained_by.as_deref() {
            return self.get(parent);
        }
        self.objects
            .iter()
            .find(|o| o.container_of.iter().any(|child| child == id))
    }
}
