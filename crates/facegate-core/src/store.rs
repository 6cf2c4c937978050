//! Template persistence seam.

use crate::types::{EncodedForm, SubjectId};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("template store unavailable: {0}")]
    Unavailable(String),
    #[error("template store backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Record-level storage of encoded templates, keyed by subject.
///
/// Every `put` and `clear` must be atomic for its record: a reader sees the
/// old form or the new one, never a partial write.
pub trait TemplateStore {
    fn get(&self, subject_id: &SubjectId) -> Result<Option<EncodedForm>, StoreError>;
    fn put(&self, subject_id: &SubjectId, encoded: &EncodedForm) -> Result<(), StoreError>;
    fn clear(&self, subject_id: &SubjectId) -> Result<(), StoreError>;
    /// Subjects with a non-blank stored form. Finite; calling it again
    /// restarts the listing.
    fn list_subjects_with_template(&self) -> Result<Vec<SubjectId>, StoreError>;
}

impl<T: TemplateStore + ?Sized> TemplateStore for &T {
    fn get(&self, subject_id: &SubjectId) -> Result<Option<EncodedForm>, StoreError> {
        (**self).get(subject_id)
    }

    fn put(&self, subject_id: &SubjectId, encoded: &EncodedForm) -> Result<(), StoreError> {
        (**self).put(subject_id, encoded)
    }

    fn clear(&self, subject_id: &SubjectId) -> Result<(), StoreError> {
        (**self).clear(subject_id)
    }

    fn list_subjects_with_template(&self) -> Result<Vec<SubjectId>, StoreError> {
        (**self).list_subjects_with_template()
    }
}

impl<T: TemplateStore + ?Sized> TemplateStore for Arc<T> {
    fn get(&self, subject_id: &SubjectId) -> Result<Option<EncodedForm>, StoreError> {
        (**self).get(subject_id)
    }

    fn put(&self, subject_id: &SubjectId, encoded: &EncodedForm) -> Result<(), StoreError> {
        (**self).put(subject_id, encoded)
    }

    fn clear(&self, subject_id: &SubjectId) -> Result<(), StoreError> {
        (**self).clear(subject_id)
    }

    fn list_subjects_with_template(&self) -> Result<Vec<SubjectId>, StoreError> {
        (**self).list_subjects_with_template()
    }
}
