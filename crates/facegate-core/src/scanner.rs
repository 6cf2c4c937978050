//! Integrity scanner: find stored templates that no longer decode (or decode
//! to a vector that cannot be scored), repair the ones whose damage is
//! limited to whitespace or lost base64 padding, and clear the rest.
//!
//! Each repair or clear is its own store write. An interrupted scan leaves
//! every subject it already handled in a committed `Valid` or `Absent`
//! state, and running the scan again only picks up what is still broken.

use crate::codec;
use crate::similarity;
use crate::store::{StoreError, TemplateStore};
use crate::types::{EncodedForm, IntegrityReport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("integrity scan aborted: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Write repaired forms and clear unrepairable ones.
    #[default]
    Repair,
    /// Report what `Repair` would do; write nothing.
    DryRun,
}

/// What a scan found for one stored form.
#[derive(Debug)]
enum Inspection {
    Valid,
    Repairable(EncodedForm),
    Unrepairable(String),
}

pub struct IntegrityScanner<S> {
    store: S,
}

impl<S: TemplateStore> IntegrityScanner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Repair or clear every corrupted template.
    pub fn scan_and_repair(&self) -> Result<IntegrityReport, ScanError> {
        self.scan(ScanMode::Repair)
    }

    /// Walk every subject with a stored template.
    ///
    /// Per-subject codec failures are absorbed into the report; only a store
    /// failure aborts the scan, keeping whatever was committed before it.
    pub fn scan(&self, mode: ScanMode) -> Result<IntegrityReport, ScanError> {
        let subjects = self.store.list_subjects_with_template()?;
        let mut report = IntegrityReport {
            dry_run: mode == ScanMode::DryRun,
            ..IntegrityReport::default()
        };

        tracing::info!(subjects = subjects.len(), ?mode, "integrity scan started");

        for subject in subjects {
            // Cleared since the listing was taken.
            let Some(encoded) = self.store.get(&subject)?.filter(|e| !e.is_blank()) else {
                tracing::debug!(subject = %subject, "template gone since listing; skipped");
                continue;
            };
            report.scanned += 1;

            match inspect(&encoded) {
                Inspection::Valid => {
                    tracing::debug!(subject = %subject, "template valid");
                }
                Inspection::Repairable(fixed) => {
                    if mode == ScanMode::Repair {
                        self.store.put(&subject, &fixed)?;
                    }
                    tracing::info!(subject = %subject, ?mode, "template repaired by normalization");
                    report.fixed += 1;
                    report.affected.push(subject);
                }
                Inspection::Unrepairable(e) => {
                    if mode == ScanMode::Repair {
                        self.store.clear(&subject)?;
                    }
                    tracing::warn!(
                        subject = %subject,
                        error = %e,
                        ?mode,
                        "unrepairable template cleared; subject must re-enroll"
                    );
                    report.cleared += 1;
                    report.affected.push(subject);
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            fixed = report.fixed,
            cleared = report.cleared,
            dry_run = report.dry_run,
            "integrity scan complete"
        );
        Ok(report)
    }
}

fn inspect(encoded: &EncodedForm) -> Inspection {
    let err = match codec::decode(encoded) {
        Ok(stored) => {
            return match similarity::check_scorable(&stored) {
                Ok(()) => Inspection::Valid,
                Err(e) => Inspection::Unrepairable(e.to_string()),
            }
        }
        Err(e) => e,
    };

    let Some(fixed) = normalize_padding(encoded.as_str()) else {
        return Inspection::Unrepairable(err.to_string());
    };
    match codec::decode(&fixed) {
        Ok(stored) => match similarity::check_scorable(&stored) {
            Ok(()) => Inspection::Repairable(fixed),
            Err(e) => Inspection::Unrepairable(e.to_string()),
        },
        Err(e) => Inspection::Unrepairable(e.to_string()),
    }
}

/// Strip all whitespace, then pad with `=` to a multiple of 4 characters.
///
/// A remainder of 1 cannot come from any byte count, so it returns `None`.
pub fn normalize_padding(raw: &str) -> Option<EncodedForm> {
    let mut text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    match text.len() % 4 {
        0 => {}
        2 => text.push_str("=="),
        3 => text.push('='),
        _ => return None,
    }
    Some(EncodedForm::new(text))
}
