use crate::config::PollConfig;
use crate::errors::{Error, Result};

use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

/*
 * Poll `probe` every `poll.interval()` until it reports ready. Only the
 * not-ready case is retried; any error coming out of the probe is returned
 * right away. Once the attempts run out, Error::Unavailable is returned.
 */
pub async fn until_ready<F, Fut>(what: &str, poll: &PollConfig, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let attempt = || {
	let ready = probe();
	let what = what.to_string();
	async move {
	    match ready.await? {
		true => Ok(()),
		false => Err(Error::Unavailable(what)),
	    }
	}
    };

    let backoff = ConstantBuilder::default()
	.with_delay(poll.interval())
	.with_max_times(poll.attempts.saturating_sub(1));

    attempt
	.retry(backoff)
	.when(|err: &Error| matches!(err, Error::Unavailable(_)))
	.notify(|_err: &Error, dur: Duration| {
	    log::debug!("{} is not ready yet, checking again in {:?}", what, dur);
	})
	.await
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    fn quick(attempts: usize) -> PollConfig {
	PollConfig{ interval_secs: 0, attempts }
    }

    #[tokio::test]
    async fn returns_once_probe_is_ready() {
	let calls = Cell::new(0);
	let result = until_ready("thing", &quick(5), || {
	    calls.set(calls.get() + 1);
	    let ready = calls.get() == 3;
	    async move { Ok(ready) }
	}).await;

	assert!(result.is_ok());
	assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_configured_attempts() {
	let calls = Cell::new(0);
	let result = until_ready("thing", &quick(4), || {
	    calls.set(calls.get() + 1);
	    async { Ok(false) }
	}).await;

	assert!(matches!(result, Err(Error::Unavailable(ref what)) if what == "thing"));
	assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn probe_errors_are_not_retried() {
	let calls = Cell::new(0);
	let result = until_ready("thing", &quick(4), || {
	    calls.set(calls.get() + 1);
	    async { Err(Error::Deployment(String::from("broken"))) }
	}).await;

	assert!(matches!(result, Err(Error::Deployment(_))));
	assert_eq!(calls.get(), 1);
    }
}
