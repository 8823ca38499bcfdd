use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

/*
 * A RateLimiter decides how long a key has to wait before it's handed
 * back to the workers after a failure.
 */
pub trait RateLimiter: Send + Sync {

    /* how long `key` should wait, this counts as one more requeue */
    fn when(&self, key: &str) -> Duration;

    /* stop tracking `key`, its next failure starts from scratch */
    fn forget(&self, key: &str);

    /* how many times `key` has been requeued since the last forget() */
    fn num_requeues(&self, key: &str) -> u32;
}

/*
 * Per key exponential backoff: base * 2^failures, capped at max.
 */
pub struct ItemExponentialFailureRateLimiter {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialFailureRateLimiter {

    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
	Self{
	    base_delay: base_delay,
	    max_delay: max_delay,
	    failures: Mutex::new(HashMap::new()),
	}
    }
}

impl RateLimiter for ItemExponentialFailureRateLimiter {

    fn when(&self, key: &str) -> Duration {
	let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
	let count = failures.entry(key.to_string()).or_insert(0);
	let exp = *count;
	*count = count.saturating_add(1);

	// 2^31 * base is already beyond any sane cap
	let factor = 2u32.checked_pow(exp.min(31)).unwrap_or(u32::MAX);
	match self.base_delay.checked_mul(factor) {
	    Some(delay) if delay < self.max_delay => delay,
	    _ => self.max_delay,
	}
    }

    fn forget(&self, key: &str) {
	self.failures.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
	let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
	failures.get(key).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/*
 * Overall token bucket shared by every key. It doesn't track individual
 * keys, so forget() and num_requeues() are no-ops.
 */
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {

    pub fn new(qps: f64, burst: u32) -> Self {
	let burst = f64::from(burst.max(1));

	Self{
	    qps: qps,
	    burst: burst,
	    bucket: Mutex::new(Bucket{
		tokens: burst,
		last: Instant::now(),
	    }),
	}
    }
}

impl RateLimiter for BucketRateLimiter {

    /*
     * Reserves one token. When the bucket is empty the caller waits for
     * the time it takes to refill the deficit.
     */
    fn when(&self, _key: &str) -> Duration {
	let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
	let now = Instant::now();
	let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();

	bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
	bucket.last = now;
	bucket.tokens -= 1.0;

	if bucket.tokens >= 0.0 || self.qps <= 0.0 {
	    return Duration::ZERO;
	}
	Duration::from_secs_f64(-bucket.tokens / self.qps)
    }

    fn forget(&self, _key: &str) {}

    fn num_requeues(&self, _key: &str) -> u32 {
	0
    }
}

/*
 * Combines several limiters and waits for the slowest of them.
 */
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {

    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
	Self{
	    limiters: limiters,
	}
    }
}

impl RateLimiter for MaxOfRateLimiter {

    fn when(&self, key: &str) -> Duration {
	self.limiters.iter()
	    .map(|limiter| limiter.when(key))
	    .max()
	    .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &str) {
	for limiter in &self.limiters {
	    limiter.forget(key);
	}
    }

    fn num_requeues(&self, key: &str) -> u32 {
	self.limiters.iter()
	    .map(|limiter| limiter.num_requeues(key))
	    .max()
	    .unwrap_or(0)
    }
}

/*
 * Backoff settings of the controller rate limiter.
 */
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub qps: f64,
    pub burst: u32,
}

impl Default for Backoff {

    fn default() -> Self {
	Self{
	    base_delay: Duration::from_millis(5),
	    max_delay: Duration::from_secs(1000),
	    qps: 10.0,
	    burst: 100,
	}
    }
}

/*
 * Per key exponential backoff combined with an overall bucket, so that a
 * mass failure can't hammer the backend.
 */
pub fn controller_rate_limiter(backoff: &Backoff) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
	Box::new(ItemExponentialFailureRateLimiter::new(backoff.base_delay, backoff.max_delay)),
	Box::new(BucketRateLimiter::new(backoff.qps, backoff.burst)),
    ])
}

pub fn default_controller_rate_limiter() -> MaxOfRateLimiter {
    controller_rate_limiter(&Backoff::default())
}
