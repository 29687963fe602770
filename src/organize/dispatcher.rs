//! Organization dispatcher
//!
//! Requests placement of a classified document and interprets the
//! collaborator's response. Retry safety: before any retry the dispatcher
//! asks the collaborator whether the destination already holds the file —
//! a lost response must not turn into a duplicate placement. If the probe
//! itself cannot be answered, the dispatcher refuses to retry.

use super::fileops::FileOps;
use crate::error::PipelineError;
use crate::fusion::FusionDecision;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResult {
    pub destination: PathBuf,
    /// True when a prior attempt had already landed and was detected by
    /// the exists probe instead of being repeated.
    pub already_placed: bool,
    pub attempts: u32,
}

/// Duplicate-safe placement with bounded retry.
pub struct OrganizationDispatcher {
    fileops: Arc<dyn FileOps>,
    max_retries: u32,
    backoff: Duration,
}

impl OrganizationDispatcher {
    pub fn new(fileops: Arc<dyn FileOps>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            fileops,
            max_retries,
            backoff,
        }
    }

    /// Place `source` under the decision's domain.
    ///
    /// Transient collaborator failures are retried up to the configured
    /// bound, but only after `exists` confirms the previous attempt left
    /// nothing at the destination. A confirmed prior placement is treated
    /// as success, not repeated.
    pub async fn organize(
        &self,
        source: &Path,
        file_name: &str,
        decision: &FusionDecision,
    ) -> Result<OrganizationResult, PipelineError> {
        let domain = &decision.label;
        // The collaborator resolves destinations as <domain>/<filename>;
        // this is the key the exists probe checks after a lost response.
        let expected_destination = PathBuf::from(domain.as_str()).join(file_name);

        let mut delay = self.backoff;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self.fileops.place(source, domain).await {
                Ok(destination) => {
                    tracing::info!(
                        "[Dispatcher] Placed {} under {} at {}",
                        file_name,
                        domain,
                        destination.display()
                    );
                    return Ok(OrganizationResult {
                        destination,
                        already_placed: false,
                        attempts,
                    });
                }
                Err(e) if !e.is_transient() => {
                    return Err(PipelineError::Organization {
                        message: e.to_string(),
                        transient: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "[Dispatcher] Placement attempt {} for {} failed: {}",
                        attempts,
                        file_name,
                        e
                    );

                    // The request may have landed even though the response
                    // was lost; a hit here is the prior attempt succeeding.
                    match self.fileops.exists(&expected_destination).await {
                        Ok(true) => {
                            tracing::info!(
                                "[Dispatcher] {} already present at {}, treating prior attempt as success",
                                file_name,
                                expected_destination.display()
                            );
                            return Ok(OrganizationResult {
                                destination: expected_destination,
                                already_placed: true,
                                attempts,
                            });
                        }
                        Ok(false) => {}
                        Err(probe_err) => {
                            // No confirmation that nothing was written:
                            // retrying could duplicate the file.
                            return Err(PipelineError::Organization {
                                message: format!(
                                    "placement failed ({}) and destination state could not be verified: {}",
                                    e, probe_err
                                ),
                                transient: false,
                            });
                        }
                    }

                    if attempts > self.max_retries {
                        return Err(PipelineError::Organization {
                            message: format!("placement failed after {} attempts: {}", attempts, e),
                            transient: true,
                        });
                    }

                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierVerdict, VerdictSource};
    use crate::domain::DomainSet;
    use crate::fusion::{fuse, FusionConfig};
    use crate::organize::fileops::FileOpsError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory collaborator. `fail_first` place calls return Unreachable
    /// after optionally performing the write (a lost response).
    struct FakeFileOps {
        placed: Mutex<HashSet<PathBuf>>,
        place_calls: Mutex<u32>,
        fail_first: u32,
        write_lands_despite_failure: bool,
        exists_errors: bool,
    }

    impl FakeFileOps {
        fn new(fail_first: u32, write_lands_despite_failure: bool) -> Self {
            Self {
                placed: Mutex::new(HashSet::new()),
                place_calls: Mutex::new(0),
                fail_first,
                write_lands_despite_failure,
                exists_errors: false,
            }
        }

        fn placed_count(&self) -> usize {
            self.placed.lock().unwrap().len()
        }

        fn place_calls(&self) -> u32 {
            *self.place_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FileOps for FakeFileOps {
        async fn place(
            &self,
            source: &Path,
            domain: &crate::domain::DomainLabel,
        ) -> Result<PathBuf, FileOpsError> {
            let mut calls = self.place_calls.lock().unwrap();
            *calls += 1;
            let file_name = source.file_name().unwrap().to_string_lossy().to_string();
            let destination = PathBuf::from(domain.as_str()).join(file_name);

            if *calls <= self.fail_first {
                if self.write_lands_despite_failure {
                    self.placed.lock().unwrap().insert(destination);
                }
                return Err(FileOpsError::Unreachable("connection reset".into()));
            }

            self.placed.lock().unwrap().insert(destination.clone());
            Ok(destination)
        }

        async fn exists(&self, destination: &Path) -> Result<bool, FileOpsError> {
            if self.exists_errors {
                return Err(FileOpsError::Unreachable("probe failed".into()));
            }
            Ok(self.placed.lock().unwrap().contains(destination))
        }
    }

    fn decision(label: &str) -> FusionDecision {
        let set = DomainSet::default();
        let v = ClassifierVerdict::conclusive(VerdictSource::Vision, set.resolve(label), 0.7, vec![]);
        let t = ClassifierVerdict::conclusive(VerdictSource::Text, set.resolve(label), 0.8, vec![]);
        fuse(&v, &t, &FusionConfig::default())
    }

    fn dispatcher(fileops: Arc<FakeFileOps>) -> OrganizationDispatcher {
        OrganizationDispatcher::new(fileops, 2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_clean_placement() {
        let fileops = Arc::new(FakeFileOps::new(0, false));
        let d = dispatcher(Arc::clone(&fileops));

        let result = d
            .organize(Path::new("/in/report.pdf"), "report.pdf", &decision("finance"))
            .await
            .unwrap();

        assert_eq!(result.destination, PathBuf::from("finance/report.pdf"));
        assert!(!result.already_placed);
        assert_eq!(fileops.placed_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_response_does_not_duplicate() {
        // First place call performs the write but the response is lost.
        let fileops = Arc::new(FakeFileOps::new(1, true));
        let d = dispatcher(Arc::clone(&fileops));

        let result = d
            .organize(Path::new("/in/report.pdf"), "report.pdf", &decision("finance"))
            .await
            .unwrap();

        assert!(result.already_placed);
        assert_eq!(result.destination, PathBuf::from("finance/report.pdf"));
        // Exactly one file at the destination, and no second place call.
        assert_eq!(fileops.placed_count(), 1);
        assert_eq!(fileops.place_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_without_partial_write_retries() {
        let fileops = Arc::new(FakeFileOps::new(1, false));
        let d = dispatcher(Arc::clone(&fileops));

        let result = d
            .organize(Path::new("/in/report.pdf"), "report.pdf", &decision("law"))
            .await
            .unwrap();

        assert!(!result.already_placed);
        assert_eq!(result.attempts, 2);
        assert_eq!(fileops.placed_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_transient_error() {
        let fileops = Arc::new(FakeFileOps::new(10, false));
        let d = dispatcher(Arc::clone(&fileops));

        let err = d
            .organize(Path::new("/in/report.pdf"), "report.pdf", &decision("law"))
            .await
            .unwrap_err();

        match err {
            PipelineError::Organization { transient, .. } => assert!(transient),
            other => panic!("unexpected error: {:?}", other),
        }
        // Initial attempt + 2 retries.
        assert_eq!(fileops.place_calls(), 3);
        assert_eq!(fileops.placed_count(), 0);
    }

    #[tokio::test]
    async fn test_unverifiable_destination_refuses_retry() {
        let mut fake = FakeFileOps::new(10, false);
        fake.exists_errors = true;
        let fileops = Arc::new(fake);
        let d = dispatcher(Arc::clone(&fileops));

        let err = d
            .organize(Path::new("/in/report.pdf"), "report.pdf", &decision("law"))
            .await
            .unwrap_err();

        match err {
            PipelineError::Organization { transient, .. } => assert!(!transient),
            other => panic!("unexpected error: {:?}", other),
        }
        // No retry happened after the probe failed.
        assert_eq!(fileops.place_calls(), 1);
    }
}
