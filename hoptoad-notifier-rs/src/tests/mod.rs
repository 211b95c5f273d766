//! Tests spanning several notifier modules
//!
//! Delivery is exercised against a WireMock server; the pipeline tests drive
//! the hooks end to end and inspect the queued payloads.

use std::sync::Mutex;
use crate::reporting::{DeliveryJob, NoticeQueue};
use crate::types::Result;

pub mod pipeline_tests;

/// Queue that keeps every job instead of delivering it
#[derive(Debug, Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<DeliveryJob>>,
}

impl RecordingQueue {
    /// Jobs queued so far
    pub fn jobs(&self) -> Vec<DeliveryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl NoticeQueue for RecordingQueue {
    fn enqueue(&self, job: DeliveryJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}
