#![cfg(feature = "redis-tokio")]

use std::{
    env,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use casement::{
    AdmissionScript, CasementError, Limiter, LimiterConfig, RegistrarState, ScriptStore,
};

// SCRIPT FLUSH is server-wide; tests in this binary must not overlap.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_key(name: &str) -> String {
    let n: u64 = rand::random();
    format!("casement_itest_{n}:{name}")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn eventually<F, Fut>(timeout: Duration, poll: Duration, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if f().await {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(poll).await;
    }
}

fn config(url: &str) -> LimiterConfig {
    let mut config = LimiterConfig::new(url);
    config.refresh_interval = Duration::from_millis(100);
    config
}

#[test]
fn rejects_after_limit_within_window() {
    let Some(url) = redis_url() else {
        return;
    };
    let _guard = serial();
    init_tracing();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let limiter = Limiter::from_config(&config(&url), 3, 3_600, unique_key("basic"))
            .await
            .unwrap();

        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
        assert_eq!(limiter.registrar_state(), RegistrarState::Installed);
    });
}

#[test]
fn unblocks_in_next_window() {
    let Some(url) = redis_url() else {
        return;
    };
    let _guard = serial();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let limiter = Limiter::from_config(&config(&url), 1, 1, unique_key("next"))
            .await
            .unwrap();

        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);

        let limiter = &limiter;
        eventually(Duration::from_secs(3), Duration::from_millis(50), || async move {
            limiter.allow().await
        })
        .await;
    });
}

#[test]
fn concurrent_callers_never_exceed_limit() {
    let Some(url) = redis_url() else {
        return;
    };
    let _guard = serial();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let key = unique_key("concurrent");
        let cfg = config(&url);

        // Separate limiters with separate connections, as separate processes would have.
        let mut limiters = Vec::new();
        for _ in 0..4 {
            limiters.push(Arc::new(
                Limiter::from_config(&cfg, 25, 3_600, key.clone()).await.unwrap(),
            ));
        }

        let mut handles = Vec::new();
        for i in 0..100 {
            let limiter = limiters[i % limiters.len()].clone();
            handles.push(tokio::spawn(async move { limiter.allow().await }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 25);
    });
}

#[test]
fn recovers_after_script_flush() {
    let Some(url) = redis_url() else {
        return;
    };
    let _guard = serial();
    init_tracing();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let limiter = Limiter::from_config(&config(&url), 2, 3_600, unique_key("flush"))
            .await
            .unwrap();

        assert!(limiter.allow().await);

        let client = redis::Client::open(url.as_str()).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::cmd("SCRIPT")
            .arg("FLUSH")
            .query_async(&mut conn)
            .await
            .unwrap();

        // Admitted either way: failed open, or counted if the refresher already ran.
        assert!(limiter.allow().await);

        let hash = AdmissionScript::global().hash();
        let store = limiter.store();
        eventually(Duration::from_secs(2), Duration::from_millis(20), || async move {
            store.script_exists(hash).await.unwrap_or(false)
        })
        .await;

        // Counting resumes; at most one admission is left in this window.
        let mut admitted = 0;
        while limiter.allow().await {
            admitted += 1;
            assert!(admitted <= 1, "limit exceeded after recovery");
        }
        assert_eq!(limiter.stats().denied, 1);
    });
}

#[test]
fn unreachable_store_fails_construction() {
    let _guard = serial();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let result = Limiter::from_config(
            &LimiterConfig::new("redis://127.0.0.1:1/"),
            1,
            1,
            unique_key("down"),
        )
        .await;

        assert!(matches!(result, Err(CasementError::CannotConnect(_))));
    });
}
