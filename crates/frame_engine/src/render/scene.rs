//! Draw list with per-object transforms

use crate::foundation::math::Mat4;

/// An object carrying a model transform
pub trait Transformable {
    /// Current model transform
    fn model(&self) -> &Mat4;
    /// Replace the model transform
    fn set_model(&mut self, model: Mat4);
}

/// Ordered list of scene objects, addressed by insertion index
#[derive(Debug)]
pub struct SceneObjects<T> {
    objects: Vec<T>,
}

impl<T> Default for SceneObjects<T> {
    fn default() -> Self {
        Self { objects: Vec::new() }
    }
}

impl<T: Transformable> SceneObjects<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and return its id
    pub fn push(&mut self, object: T) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    /// Store `model` for object `id`, returning whether `id` was valid
    ///
    /// Out-of-range ids change nothing. The new transform is picked up by the next
    /// recorded frame.
    pub fn update_model(&mut self, id: usize, model: Mat4) -> bool {
        match self.objects.get_mut(id) {
            Some(object) => {
                object.set_model(model);
                true
            }
            None => {
                log::trace!("Ignoring transform for unknown mesh id {}", id);
                false
            }
        }
    }

    /// Object by id
    pub fn get(&self, id: usize) -> Option<&T> {
        self.objects.get(id)
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in draw order
    pub fn as_slice(&self) -> &[T] {
        &self.objects
    }
}

impl<T: Transformable> FromIterator<T> for SceneObjects<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}
