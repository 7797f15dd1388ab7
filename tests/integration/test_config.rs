// Copyright © 2026 Pathway

use std::cell::Cell;
use std::env;
use std::time::Duration;

use assert_matches::assert_matches;

use traverse_engine::config::{Error as ConfigError, ExecutionConfig};
use traverse_engine::env::{parse_env_flag, parse_env_var, Error as EnvError};
use traverse_engine::retry::{execute_with_retries, RetryConfig};

const VARS: [&str; 6] = [
    "TRAVERSE_SHARE_PATHS",
    "TRAVERSE_PARTITIONS",
    "TRAVERSE_MAP_RETRIES",
    "TRAVERSE_REDUCE_RETRIES",
    "TRAVERSE_RETRY_BACKOFF_MS",
    "TRAVERSE_LAZY_BARRIER_SIZE",
];

fn clear_vars() {
    for name in VARS {
        env::remove_var(name);
    }
}

// Everything touching the process environment lives in this one test, tests
// run concurrently.
#[test]
fn test_config_from_env() -> eyre::Result<()> {
    clear_vars();
    assert_eq!(ExecutionConfig::from_env()?, ExecutionConfig::default());

    env::set_var("TRAVERSE_SHARE_PATHS", " off ");
    env::set_var("TRAVERSE_PARTITIONS", "3");
    env::set_var("TRAVERSE_MAP_RETRIES", "5");
    env::set_var("TRAVERSE_REDUCE_RETRIES", "0");
    env::set_var("TRAVERSE_RETRY_BACKOFF_MS", "250");
    env::set_var("TRAVERSE_LAZY_BARRIER_SIZE", "64");
    let config = ExecutionConfig::from_env()?;
    assert!(!config.share_paths);
    assert_eq!(config.partitions, 3);
    assert_eq!(config.map_retries, 5);
    assert_eq!(config.reduce_retries, 0);
    assert_eq!(config.retry_backoff, Duration::from_millis(250));
    assert_eq!(config.lazy_barrier_size, 64);

    env::set_var("TRAVERSE_LAZY_BARRIER_SIZE", "0");
    assert_matches!(ExecutionConfig::from_env(), Err(ConfigError::EmptyLazyBarrier));
    env::remove_var("TRAVERSE_LAZY_BARRIER_SIZE");

    env::set_var("TRAVERSE_PARTITIONS", "100000");
    assert_eq!(ExecutionConfig::from_env()?.partitions, 1024);

    env::set_var("TRAVERSE_PARTITIONS", "0");
    assert_matches!(ExecutionConfig::from_env(), Err(ConfigError::NeedsPartitions));

    env::set_var("TRAVERSE_PARTITIONS", "many");
    assert_matches!(
        ExecutionConfig::from_env(),
        Err(ConfigError::EnvError(EnvError::ParsingFailed(name, _))) if name == "TRAVERSE_PARTITIONS"
    );
    env::set_var("TRAVERSE_PARTITIONS", "2");

    env::set_var("TRAVERSE_SHARE_PATHS", "maybe");
    assert_matches!(
        ExecutionConfig::from_env(),
        Err(ConfigError::EnvError(EnvError::NotAFlag(_, value))) if value == "maybe"
    );
    env::set_var("TRAVERSE_SHARE_PATHS", "YES");
    assert!(ExecutionConfig::from_env()?.share_paths);
    assert_eq!(parse_env_flag("TRAVERSE_SHARE_PATHS")?, Some(true));
    assert_eq!(parse_env_var::<usize>("TRAVERSE_PARTITIONS")?, Some(2));

    clear_vars();
    assert_eq!(parse_env_flag("TRAVERSE_SHARE_PATHS")?, None);
    assert_eq!(parse_env_var::<usize>("TRAVERSE_PARTITIONS")?, None);
    Ok(())
}

#[test]
fn test_config_builders() -> eyre::Result<()> {
    let config = ExecutionConfig::default()
        .with_share_paths(false)
        .with_partitions(16)?
        .with_retries(1, 4)
        .with_retry_backoff(Duration::ZERO)
        .with_lazy_barrier_size(7)?;
    assert!(!config.share_paths);
    assert_eq!(config.partitions, 16);
    assert_eq!(config.map_retries, 1);
    assert_eq!(config.reduce_retries, 4);
    assert_eq!(config.retry_backoff, Duration::ZERO);
    assert_eq!(config.lazy_barrier_size, 7);

    assert_matches!(
        ExecutionConfig::default().with_lazy_barrier_size(0),
        Err(ConfigError::EmptyLazyBarrier)
    );
    assert_matches!(
        ExecutionConfig::default().with_partitions(0),
        Err(ConfigError::NeedsPartitions)
    );
    Ok(())
}

#[test]
fn test_retries() {
    let calls = Cell::new(0);
    let (result, attempts) = execute_with_retries(
        || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("not yet")
            } else {
                Ok(calls.get())
            }
        },
        RetryConfig::with_initial_sleep(Duration::ZERO),
        5,
        "flaky call",
    );
    assert_eq!(result, Ok(3));
    assert_eq!(attempts, 3);

    let (result, attempts) = execute_with_retries(
        || Err::<(), _>("never"),
        RetryConfig::with_initial_sleep(Duration::from_millis(1)),
        2,
        "broken call",
    );
    assert_eq!(result, Err("never"));
    assert_eq!(attempts, 3);
}
