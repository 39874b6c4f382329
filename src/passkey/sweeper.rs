//! Periodic removal of expired challenges

use std::time::Duration;

use actix_web::rt::task::JoinHandle;

use super::service::PasskeyService;

/// Spawn a task on the current actix runtime that sweeps every `period`
///
/// Failures are logged and the task keeps running.
#[must_use]
pub fn spawn_challenge_sweeper(service: PasskeyService, period: Duration) -> JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(period);
        loop {
            interval.tick().await;
            log::debug!("Running challenge cleanup task");
            if let Err(e) = service.cleanup_expired_challenges().await {
                log::error!("Challenge cleanup failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Challenge, ChallengeKey};
    use crate::testing::{MockVerifier, TestFixtures};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_sweeper_removes_expired_challenges() {
        let service = TestFixtures::service(Arc::new(MockVerifier::new()));
        let key = ChallengeKey::Username("u1".to_string());
        let mut stale = Challenge::issue(
            "old".to_string(),
            String::new(),
            &key,
            chrono::Duration::minutes(5),
        );
        stale.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        service.stores().challenges.save_challenge(stale).await.unwrap();

        let handle = spawn_challenge_sweeper(service.clone(), Duration::from_millis(10));
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(service
            .stores()
            .challenges
            .get_and_delete_challenge(&key)
            .await
            .unwrap()
            .is_none());
    }
}
