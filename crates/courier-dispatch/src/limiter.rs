//! Per-channel send throttling.
//!
//! One token bucket per delivery channel, refilled at the configured
//! steady-state rate with burst capacity equal to the rate, so no more than
//! one second's worth of sends can ever be saved up. Workers acquire a token
//! after dequeue and before the provider call: persisting a request is cheap
//! and durable, throttling the send path keeps provider load under cap
//! without dropping work.

use std::num::NonZeroU32;

use courier_core::Channel;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token-bucket limiters, one per channel, shared by all workers.
pub struct ChannelLimiters {
    sms: DefaultDirectRateLimiter,
    email: DefaultDirectRateLimiter,
    push: DefaultDirectRateLimiter,
}

impl ChannelLimiters {
    /// Creates limiters granting `rate_per_sec` tokens per second per
    /// channel. A zero rate is clamped to one token per second.
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = NonZeroU32::new(rate_per_sec).unwrap_or(NonZeroU32::MIN);
        // Quota::per_second sets burst equal to the rate.
        let quota = Quota::per_second(rate);

        Self {
            sms: RateLimiter::direct(quota),
            email: RateLimiter::direct(quota),
            push: RateLimiter::direct(quota),
        }
    }

    fn limiter(&self, channel: Channel) -> &DefaultDirectRateLimiter {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Email => &self.email,
            Channel::Push => &self.push,
        }
    }

    /// Suspends until the channel's bucket grants a token, then consumes it.
    ///
    /// Callers race this against their cancellation token; dropping the
    /// future before it resolves does not consume a token.
    pub async fn acquire(&self, channel: Channel) {
        self.limiter(channel).until_ready().await;
    }

    /// Consumes a token if one is immediately available.
    pub fn try_acquire(&self, channel: Channel) -> bool {
        self.limiter(channel).check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn burst_tokens_are_granted_immediately() {
        let limiters = ChannelLimiters::new(5);
        for _ in 0..5 {
            assert!(limiters.try_acquire(Channel::Sms));
        }
        // Bucket is empty now; the next token needs a refill.
        assert!(!limiters.try_acquire(Channel::Sms));
    }

    #[tokio::test]
    async fn exhausted_bucket_blocks_acquire() {
        let limiters = ChannelLimiters::new(1);
        limiters.acquire(Channel::Email).await;

        // With rate 1/s the next token takes ~1s; a short wait must time out.
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiters.acquire(Channel::Email))
                .await;
        assert!(blocked.is_err(), "second token should not be granted within 50ms");
    }

    #[tokio::test]
    async fn channels_are_throttled_independently() {
        let limiters = ChannelLimiters::new(1);
        limiters.acquire(Channel::Sms).await;

        // Draining sms leaves email and push untouched.
        assert!(limiters.try_acquire(Channel::Email));
        assert!(limiters.try_acquire(Channel::Push));
        assert!(!limiters.try_acquire(Channel::Sms));
    }
}
