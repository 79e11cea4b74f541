use crate::config::UploaderConfig;
use crate::types::{CandidateFile, Rejection, RejectReason};

/// Synchronous accept/reject gate applied before a record is created.
/// Rejected candidates never reach the transport.
#[derive(Debug, Clone)]
pub struct Validator {
    accepted_types: Vec<String>,
    max_file_size: u64,
}

impl Validator {
    pub fn new(config: &UploaderConfig) -> Self {
        Self {
            accepted_types: config.accepted_types.clone(),
            max_file_size: config.max_file_size,
        }
    }

    /// The type rule runs before the size rule, so an oversized file of a
    /// disallowed type reports the type.
    pub fn check(&self, candidate: &CandidateFile) -> Result<(), RejectReason> {
        let type_allowed = self.accepted_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&candidate.media_type));
        if !type_allowed {
            return Err(RejectReason::UnsupportedType {
                media_type: candidate.media_type.clone(),
            });
        }

        if candidate.file_size > self.max_file_size {
            return Err(RejectReason::TooLarge {
                file_size: candidate.file_size,
                limit: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Split a batch into accepted candidates and per-file rejections.
    /// Invalid files never abort the rest of the batch.
    pub fn partition(&self, candidates: Vec<CandidateFile>) -> (Vec<CandidateFile>, Vec<Rejection>) {
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();

        for candidate in candidates {
            match self.check(&candidate) {
                Ok(()) => accepted.push(candidate),
                Err(reason) => rejected.push(Rejection {
                    file_name: candidate.file_name,
                    reason,
                }),
            }
        }

        (accepted, rejected)
    }
}
