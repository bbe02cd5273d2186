//! Tests for error types

use prometheus_task_engine::core::{ChannelError, MultipleFailure, PoolError, TaskFault, UnitId};

#[test]
fn test_raised_fault_keeps_message() {
    let fault = TaskFault::raised(anyhow::anyhow!("disk full"));
    assert_eq!(format!("{}", fault), "disk full");
}

#[test]
fn test_fault_from_io_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let fault = TaskFault::raised(io);
    assert_eq!(format!("{}", fault), "missing file");
}

#[test]
fn test_cancelled_fault() {
    assert_eq!(format!("{}", TaskFault::Cancelled), "task cancelled");
}

#[test]
fn test_faults_are_cheap_to_clone() {
    let fault = TaskFault::msg("shared");
    let copy = fault.clone();
    assert_eq!(fault.to_string(), copy.to_string());
}

#[test]
fn test_multiple_failure_is_transparent() {
    let fault = TaskFault::from(MultipleFailure::new(vec![
        TaskFault::msg("a"),
        TaskFault::Cancelled,
        TaskFault::msg("c"),
    ]));
    assert_eq!(format!("{}", fault), "3 tasks failed");
    let multiple = fault.as_multiple().unwrap();
    assert_eq!(multiple.count(), 3);
    assert!(matches!(multiple.errors()[1], TaskFault::Cancelled));
}

#[test]
fn test_pool_error_messages() {
    let id = UnitId::next();
    assert_eq!(
        format!("{}", PoolError::UnitNotFound(id)),
        format!("{id} not found")
    );
    assert_eq!(
        format!("{}", PoolError::UnitTimedOut(id)),
        format!("{id} timed out")
    );
    assert_eq!(
        format!("{}", PoolError::UnitSignaled { id, signal: 15 }),
        format!("{id} terminated by signal 15")
    );
    assert_eq!(
        format!(
            "{}",
            PoolError::UnitFailed {
                id,
                fault: TaskFault::msg("exit code 2")
            }
        ),
        format!("{id} failed: exit code 2")
    );
    assert_eq!(
        format!("{}", PoolError::InvalidConfig("concurrency must be greater than 0".into())),
        "invalid configuration: concurrency must be greater than 0"
    );
}

#[test]
fn test_decode_error_converts() {
    let err = serde_json::from_str::<u32>("\"text\"").unwrap_err();
    let pool_err = PoolError::from(err);
    assert!(matches!(pool_err, PoolError::Decode(_)));
    assert!(pool_err.to_string().starts_with("failed to decode unit result"));
}

#[test]
fn test_channel_error_messages() {
    assert_eq!(
        format!("{}", ChannelError::AlreadyExists("jobs".into())),
        "channel `jobs` already exists"
    );
    assert_eq!(
        format!("{}", ChannelError::NotFound("jobs".into())),
        "channel `jobs` does not exist"
    );
    assert_eq!(format!("{}", ChannelError::Closed), "channel is closed");
    assert_eq!(
        format!("{}", ChannelError::InvalidCapacity(-5)),
        "invalid channel capacity -5"
    );
    assert!(!ChannelError::IllegalValue("null".into()).is_existence());
}

#[test]
fn test_channel_error_into_anyhow() {
    fn open() -> anyhow::Result<()> {
        Err(ChannelError::NotFound("results".into()))?;
        Ok(())
    }
    let err = open().unwrap_err();
    assert_eq!(err.to_string(), "channel `results` does not exist");
    assert!(err.downcast_ref::<ChannelError>().is_some());
}
