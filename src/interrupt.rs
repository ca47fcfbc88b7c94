//! Wall-clock alarm for the worker.
//!
//! The alarm thread sleeps until the deadline and then raises a shared flag.
//! The evaluator polls the flag between statements and inside every loop,
//! and unwinds with a typed interruption when it is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Sets an [`Interrupt`] once `timeout` has elapsed.
pub struct Alarm {
    interrupt: Interrupt,
}

impl Alarm {
    /// Start the alarm thread. The thread is detached; it only touches the
    /// flag.
    pub fn start(timeout: Duration) -> std::io::Result<Alarm> {
        let interrupt = Interrupt::new();
        let flag = interrupt.clone();
        thread::Builder::new()
            .name("datasandbox-alarm".to_string())
            .stack_size(64 * 1024)
            .spawn(move || {
                thread::sleep(timeout);
                debug!("alarm fired after {:?}", timeout);
                flag.trigger();
            })?;
        Ok(Alarm { interrupt })
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_trigger() {
        let interrupt = Interrupt::new();
        let copy = interrupt.clone();
        assert!(!interrupt.is_triggered());
        copy.trigger();
        assert!(interrupt.is_triggered());
    }

    #[test]
    fn test_alarm_fires() {
        let alarm = Alarm::start(Duration::from_millis(20)).unwrap();
        let interrupt = alarm.interrupt();
        assert!(!interrupt.is_triggered());
        thread::sleep(Duration::from_millis(200));
        assert!(interrupt.is_triggered());
    }
}
