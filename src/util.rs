use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;

/// Convert a byte count into a human readable string using IEC units (KiB/MiB/GiB).
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

// Base backoff (ms) used between transport retries. Adjustable at runtime so
// a config file or CLI flag can override the default 1s pause.
static BACKOFF_BASE_MS: AtomicU64 = AtomicU64::new(1000);

pub fn set_backoff_ms(ms: u64) {
    BACKOFF_BASE_MS.store(ms, Ordering::SeqCst);
}

pub fn get_backoff_ms() -> u64 {
    BACKOFF_BASE_MS.load(Ordering::SeqCst)
}

/// Generic retry helper: calls `op` up to `max_retries` times total, sleeping
/// the configured backoff between attempts. Returns the last error if every
/// attempt fails. `op` receives the zero-based attempt index.
pub fn retry_operation<F, T>(max_retries: usize, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Result<T>,
{
    let mut last_err: Option<anyhow::Error> = None;
    let attempts = max_retries.max(1);
    for attempt in 0..attempts {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    std::thread::sleep(Duration::from_millis(get_backoff_ms()));
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("operation failed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_bands() {
        assert_eq!(human_bytes(500), "500 B");
        assert_eq!(human_bytes(2048), "2.00 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn retry_operation_gives_up_after_max() {
        set_backoff_ms(0);
        let mut calls = 0;
        let res: Result<()> = retry_operation(3, |_| {
            calls += 1;
            Err(anyhow::anyhow!("nope"))
        });
        assert!(res.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_operation_succeeds_eventually() {
        set_backoff_ms(0);
        let mut calls = 0;
        let res = retry_operation(5, |_| {
            calls += 1;
            if calls < 3 { Err(anyhow::anyhow!("nope")) } else { Ok(42) }
        });
        assert_eq!(res.unwrap(), 42);
        assert_eq!(calls, 3);
    }
}
