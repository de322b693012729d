//! Per-task heartbeat keeping the job manager's lease alive

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pings the heartbeat service for every task currently held by the worker
pub struct HeartbeatClient {
    client: Client,
    base_url: String,
    interval: Duration,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HeartbeatClient {
    pub fn new(client: Client, base_url: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            interval,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start pinging for `task_id`; a second call for the same task is ignored
    pub fn start(&self, task_id: &str) {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.contains_key(task_id) {
            return;
        }

        let client = self.client.clone();
        let url = format!("{}/heartbeat/{}", self.base_url, task_id);
        let interval = self.interval;
        let id = task_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match client.post(&url).send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(task_id = %id, "Heartbeat sent");
                    }
                    Ok(response) => {
                        warn!(task_id = %id, status = response.status().as_u16(), "Heartbeat rejected");
                    }
                    Err(e) => {
                        warn!(task_id = %id, error = %e, "Heartbeat failed");
                    }
                }
            }
        });

        running.insert(task_id.to_string(), handle);
    }

    /// Stop pinging for `task_id` and tell the heartbeat service to forget it
    pub async fn stop(&self, task_id: &str) {
        let handle = match self.running.lock() {
            Ok(mut guard) => guard.remove(task_id),
            Err(poisoned) => poisoned.into_inner().remove(task_id),
        };

        let Some(handle) = handle else {
            return;
        };
        handle.abort();

        let url = format!("{}/heartbeat/remove", self.base_url);
        if let Err(e) = self.client.post(&url).json(&[task_id]).send().await {
            warn!(task_id, error = %e, "Failed to remove heartbeat");
        }
    }

    /// Number of tasks currently being pinged
    pub fn active(&self) -> usize {
        match self.running.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Drop for HeartbeatClient {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            for (_, handle) in running.drain() {
                handle.abort();
            }
        }
    }
}
