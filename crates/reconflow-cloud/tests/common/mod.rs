use reconflow_cloud::poller::VirtualScheduler;
use reconflow_cloud::{AttributeMap, MemoryCloud, PollConfig, RemoteState, ResourceSpec, RunContext};
use std::sync::Arc;
use std::time::Duration;

/// Run context on a virtual clock, so provisioning waits finish instantly
pub fn run(cloud: &Arc<MemoryCloud>) -> RunContext {
    RunContext::new(cloud.clone())
        .with_scheduler(Arc::new(VirtualScheduler::new()))
        .with_poll_config(PollConfig {
            interval: Duration::from_secs(10),
            jitter: 0.0,
            deadline: Duration::from_secs(30 * 60),
            not_found_grace: Duration::from_secs(60),
        })
}

pub fn spec(yaml: &str) -> ResourceSpec {
    serde_yaml::from_str(yaml).unwrap()
}

pub fn attrs(state: &RemoteState) -> AttributeMap {
    AttributeMap::from_state(state).unwrap()
}
