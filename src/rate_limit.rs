use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;

/// Throttle keyed by the account id being validated.
pub type AccountRateLimiter = DefaultKeyedRateLimiter<String>;

pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the validation limiter; a zero rate disables limiting.
pub fn account_limiter(per_minute: u32) -> Option<Arc<AccountRateLimiter>> {
    let rate = NonZeroU32::new(per_minute)?;
    Some(Arc::new(RateLimiter::keyed(Quota::per_minute(rate))))
}

/// True when this account still has budget in the current window.
pub fn check_account(limiter: &AccountRateLimiter, account_id: &str) -> bool {
    limiter.check_key(&account_id.to_string()).is_ok()
}

/// Drop keys whose budget has fully replenished. Returns the keys left.
pub fn prune(limiter: &AccountRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Periodically prune the limiter so idle account ids do not accumulate.
pub fn spawn_cleanup(limiter: Arc<AccountRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let remaining = prune(&limiter);
            tracing::debug!(remaining, "Pruned validation rate limiter");
        }
    })
}
