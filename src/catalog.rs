//! Bundled sample catalog
//!
//! The binary has no test discovery of its own; it runs this table. Worker
//! processes build the same table so test ids resolve identically on both
//! sides of the pipe.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::error::EngineError;
use crate::models::{GroupBuilder, NamespaceBuilder, Registry, TestError};

/// Namespace whose groups carry no fixture hooks
pub const PURE_NAMESPACE: &str = "arith";

/// Build the sample registry.
pub fn sample_registry() -> Result<Registry, EngineError> {
    Registry::builder()
        .namespace(arith())
        .namespace(storage())
        .namespace(NamespaceBuilder::new("plugins").load_error(
            "load",
            "failed to load plugins::exporter: unknown format `parquet`",
        ))
        .build()
}

fn arith() -> NamespaceBuilder {
    NamespaceBuilder::new(PURE_NAMESPACE)
        .group(
            GroupBuilder::new("Addition")
                .test("test_small", |_| {
                    assert_eq!(2 + 2, 4);
                    Ok(())
                })
                .test("test_checked_overflow", |_| {
                    match i32::MAX.checked_add(1) {
                        None => Ok(()),
                        Some(v) => Err(TestError::failure(format!("expected overflow, got {v}"))),
                    }
                })
                .test("test_prints", |ctx| {
                    writeln!(ctx.stdout(), "sum = {}", 40 + 2)?;
                    Ok(())
                })
                .expected_failure("test_float_exact", |_| {
                    if 0.1 + 0.2 == 0.3 {
                        Ok(())
                    } else {
                        Err(TestError::failure("0.1 + 0.2 != 0.3"))
                    }
                })
                .skipped_test("test_bignum", "bignum support not compiled in", |_| Ok(())),
        )
        .group(
            GroupBuilder::new("Division")
                .test("test_exact", |_| {
                    assert_eq!(84 / 2, 42);
                    Ok(())
                })
                .test("test_rounding", |ctx| {
                    writeln!(ctx.stderr(), "checking 7 / 2")?;
                    let got = 7 / 2;
                    if got == 4 {
                        Ok(())
                    } else {
                        Err(TestError::failure(format!("7 / 2 rounded to {got}, want 4")))
                    }
                })
                .test("test_parse_divisor", |_| {
                    let divisor: i32 = "zero".parse().context("parsing divisor")?;
                    assert_ne!(divisor, 0);
                    Ok(())
                })
                .test("test_by_zero", |_| {
                    let divisor = std::hint::black_box(0);
                    assert!(10_i32.checked_div(divisor).is_some(), "division by zero");
                    Ok(())
                })
                .test("test_skip_on_platform", |_| {
                    if cfg!(target_pointer_width = "16") {
                        return Ok(());
                    }
                    Err(TestError::skip("only meaningful on 16-bit targets"))
                }),
        )
}

fn storage() -> NamespaceBuilder {
    let connections = Arc::new(AtomicUsize::new(0));
    let open = connections.clone();
    let close = connections.clone();
    let check = connections;

    NamespaceBuilder::new("storage")
        .setup(|| {
            tracing::debug!("storage namespace ready");
            Ok(())
        })
        .group(
            GroupBuilder::new("Pool")
                .setup(move || {
                    open.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .teardown(move || {
                    close.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .before_each(|ctx| {
                    writeln!(ctx.stdout(), "begin transaction")?;
                    Ok(())
                })
                .after_each(|ctx| {
                    writeln!(ctx.stdout(), "rollback")?;
                    Ok(())
                })
                .test("test_connection_count", move |_| {
                    // Zero inside a worker, where group fixtures do not run.
                    let open = check.load(Ordering::SeqCst);
                    if open <= 1 {
                        Ok(())
                    } else {
                        Err(TestError::failure(format!("{open} connections open")))
                    }
                })
                .test("test_insert", |_| Ok(())),
        )
        .group(
            GroupBuilder::new("Replica")
                .setup(|| Err(anyhow!("replica unreachable at 10.0.0.7:5432")))
                .test("test_read", |_| Ok(()))
                .test("test_lag", |_| Ok(())),
        )
        .group(
            GroupBuilder::new("Migration")
                .skip("migrations run in the nightly job")
                .setup(|| Err(anyhow!("never runs")))
                .test("test_up", |_| Ok(()))
                .test("test_down", |_| Ok(())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SequentialExecutor;
    use crate::models::{TestId, TestStatus};
    use crate::result::{CollectorOptions, OutcomeRecorder, ResultCollector};

    #[test]
    fn test_catalog_builds() {
        let registry = sample_registry().unwrap();
        assert_eq!(registry.namespaces().count(), 3);
        assert!(registry
            .find(&TestId::new("arith::Division", "test_by_zero"))
            .is_some());
        assert!(registry.find(&TestId::new("plugins", "load")).is_some());
    }

    #[test]
    fn test_catalog_sequential_run() {
        let registry = sample_registry().unwrap();
        let recorder = OutcomeRecorder::new();
        let mut collector =
            ResultCollector::new(CollectorOptions::buffered()).with_handler(recorder.clone());

        SequentialExecutor::new()
            .run(&registry.suite(), &mut collector)
            .unwrap();

        let status_of = |group: &str, method: &str| {
            recorder
                .outcomes()
                .into_iter()
                .find(|o| o.test == TestId::new(group, method))
                .map(|o| o.status)
        };
        assert_eq!(status_of("plugins", "load"), Some(TestStatus::Error));
        assert_eq!(status_of("arith::Addition", "test_small"), Some(TestStatus::Success));
        assert_eq!(
            status_of("arith::Addition", "test_float_exact"),
            Some(TestStatus::ExpectedFailure)
        );
        assert_eq!(status_of("arith::Division", "test_by_zero"), Some(TestStatus::Failure));
        assert_eq!(
            status_of("arith::Division", "test_parse_divisor"),
            Some(TestStatus::Error)
        );
        assert_eq!(
            status_of("storage::Pool", "test_connection_count"),
            Some(TestStatus::Success)
        );
        assert_eq!(
            status_of("storage::Migration", "test_up"),
            Some(TestStatus::Skipped)
        );
        assert_eq!(
            status_of("storage::Replica", "group_setup"),
            Some(TestStatus::Error)
        );
        assert_eq!(status_of("storage::Replica", "test_read"), None);
        assert!(!collector.was_successful());
    }
}
