use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::services::sweep;
use crate::state::AppState;

/// Periodically completes passes whose validity has elapsed.
pub fn spawn_sweeper(state: AppState, shutdown: CancellationToken) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.school.pass_sweep_secs.max(1));
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "pass sweeper started");
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match sweep(&state).await {
                    Ok(0) => {}
                    Ok(n) => debug!(completed = n, "pass sweep"),
                    Err(e) => error!(error = %e, "pass sweep failed"),
                },
            }
        }
        info!("pass sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::{ALEX_ID, SARAH_ID};
    use crate::passes::dto::SubmitPassRequest;
    use crate::passes::repo_types::{Decision, PassStatus};
    use crate::passes::services::{decide, submit_request};

    #[tokio::test]
    async fn sweeper_completes_and_stops() {
        let (st, clock) = AppState::fake_with_clock();
        let alex = st.directory.get(ALEX_ID).unwrap().clone();
        let sarah = st.directory.get(SARAH_ID).unwrap().clone();
        let pass = submit_request(
            &st,
            &alex,
            SubmitPassRequest {
                reason: "Lab Work".into(),
                destination: "Computer Lab".into(),
                duration_minutes: 15,
            },
        )
        .await
        .unwrap();
        decide(&st, &sarah, pass.id, Decision::Approve).await.unwrap();
        clock.advance(time::Duration::minutes(20));

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(st.clone(), shutdown.clone());
        // first tick fires immediately
        for _ in 0..100 {
            if st.passes.get(pass.id).await.unwrap().unwrap().status == PassStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(st.passes.get(pass.id).await.unwrap().unwrap().status, PassStatus::Completed);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
