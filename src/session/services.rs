//! External collaborators of the session lifecycle.
//!
//! Timers and notifications are side effects outside the namespace. They are
//! injected as trait objects and always best-effort: the session manager logs
//! their failures and carries on.

use std::process::{Command, Stdio};

use anyhow::{Context as _, bail};
use serde::Serialize;
use tracing::info;

use crate::config::Settings;

/// Something that happened to a session, for notification purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    Started {
        session_id: String,
        task_id: Option<String>,
    },
    Ended {
        session_id: String,
        task_id: Option<String>,
        seconds: i64,
    },
    Restored {
        session_id: String,
        restored_from: String,
        task_id: Option<String>,
    },
}

/// Starts and stops an external time tracker for a task.
pub trait TimerService: Send + Sync {
    /// # Errors
    ///
    /// Any failure; the caller treats it as non-fatal.
    fn start(&self, task_id: &str) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Any failure; the caller treats it as non-fatal.
    fn stop(&self, task_id: &str) -> anyhow::Result<()>;
}

/// Tells someone about a session event.
pub trait NotificationService: Send + Sync {
    /// # Errors
    ///
    /// Any failure; the caller treats it as non-fatal.
    fn notify(&self, event: &SessionEvent) -> anyhow::Result<()>;
}

// ── Implementations ───────────────────────────────────────────

/// Timer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimer;

impl TimerService for NoopTimer {
    fn start(&self, _task_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self, _task_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Timer driven by an external program: `<program> start|stop <task>`.
#[derive(Debug, Clone)]
pub struct CommandTimer {
    program: String,
}

impl CommandTimer {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, action: &str, task_id: &str) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args([action, task_id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to run timer command {}", self.program))?;
        if !status.success() {
            bail!("timer command `{} {action} {task_id}` exited with {status}", self.program);
        }
        Ok(())
    }
}

impl TimerService for CommandTimer {
    fn start(&self, task_id: &str) -> anyhow::Result<()> {
        self.run("start", task_id)
    }

    fn stop(&self, task_id: &str) -> anyhow::Result<()> {
        self.run("stop", task_id)
    }
}

/// Notifier that reports events through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationService for LogNotifier {
    fn notify(&self, event: &SessionEvent) -> anyhow::Result<()> {
        info!(event = %serde_json::to_string(event)?, "session event");
        Ok(())
    }
}

/// Timer configured by `timerCommand`, or a no-op without one.
#[must_use]
pub fn timer_from_settings(settings: &Settings) -> Box<dyn TimerService> {
    match settings.timer_command.as_deref() {
        Some(program) if !program.trim().is_empty() => Box::new(CommandTimer::new(program.trim())),
        _ => Box::new(NoopTimer),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records calls; optionally fails every one of them.
    #[derive(Debug, Default)]
    pub struct RecordingTimer {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingTimer {
        pub fn failing() -> Self {
            Self {
                calls: Mutex::default(),
                fail: true,
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                bail!("timer unavailable");
            }
            Ok(())
        }
    }

    impl TimerService for RecordingTimer {
        fn start(&self, task_id: &str) -> anyhow::Result<()> {
            self.record(format!("start {task_id}"))
        }

        fn stop(&self, task_id: &str) -> anyhow::Result<()> {
            self.record(format!("stop {task_id}"))
        }
    }

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingNotifier {
        pub fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl NotificationService for RecordingNotifier {
        fn notify(&self, event: &SessionEvent) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_from_settings() {
        let mut settings = Settings::default();
        assert!(timer_from_settings(&settings).start("T1").is_ok());

        settings.timer_command = Some("/nonexistent/ff-timer".into());
        assert!(timer_from_settings(&settings).start("T1").is_err());
    }

    #[test]
    fn test_session_event_json() {
        let event = SessionEvent::Started {
            session_id: "sess_1".into(),
            task_id: Some("T1".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["task_id"], "T1");
    }
}
