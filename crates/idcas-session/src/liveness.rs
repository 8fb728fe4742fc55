use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use idcas_store::StorageBackend;

use crate::machine::LoginStateMachine;

/// Periodically time out `machine` once it has been inactive too long.
///
/// This is the only trigger for the Timeout transition. The task holds a weak
/// reference and exits after the machine is dropped; abort the handle to stop
/// it earlier.
pub fn spawn_liveness_monitor<B>(machine: &Arc<LoginStateMachine<B>>, period: Duration) -> JoinHandle<()>
where
    B: StorageBackend + 'static,
{
    let machine = Arc::downgrade(machine);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(machine) = machine.upgrade() else {
                break;
            };
            match machine.check_timeout().await {
                Ok(Some(change)) => debug!(session = %machine.id(), at = %change.timestamp, "liveness check timed out session"),
                Ok(None) => {}
                Err(e) => warn!(session = %machine.id(), error = %e, "liveness check failed"),
            }
        }
        debug!("liveness monitor stopped");
    })
}
