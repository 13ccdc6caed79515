//! Run summary

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::host::HostId;
use crate::models::result::PipelineResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    /// In submission order
    pub per_host: Vec<PipelineResult>,
}

impl Summary {
    pub fn aggregate(results: Vec<PipelineResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
            per_host: results,
        }
    }

    pub fn total(&self) -> usize {
        self.per_host.len()
    }

    pub fn get(&self, host_id: HostId) -> Option<&PipelineResult> {
        self.per_host.iter().find(|r| r.host_id == host_id)
    }

    /// Plain-text report, one block per host
    pub fn to_report_text(&self) -> String {
        let mut blocks = Vec::with_capacity(self.per_host.len() + 1);
        blocks.push(format!(
            "Deployment finished: {} succeeded, {} failed",
            self.succeeded, self.failed
        ));

        for result in &self.per_host {
            let mut block = format!("Host #{} {}", result.host_id, result.address);
            let service = result
                .service
                .map(|s| s.display_name())
                .unwrap_or("no service");
            match (result.success, result.error_kind) {
                (true, _) => {
                    let _ = write!(block, "\n  {} installed", service);
                }
                (false, Some(kind)) => {
                    let _ = write!(block, "\n  failed: {}", kind);
                    if result.service.is_some() {
                        let _ = write!(block, " ({})", service);
                    }
                }
                (false, None) => {
                    let _ = write!(block, "\n  failed");
                }
            }
            blocks.push(block);
        }

        blocks.join("\n\n")
    }
}
