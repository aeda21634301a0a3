use std::time::{Duration, Instant};

use crate::logging::Logger;

/// Logs the wall time of a task at debug level when dropped.
pub struct ScopedExecutionTimer<'a> {
    task_name: &'a str,
    context: Option<&'a str>,
    started_at: Instant,
    logger: &'a Logger,
}

impl<'a> ScopedExecutionTimer<'a> {
    pub fn new(task_name: &'a str, context: Option<&'a str>, logger: &'a Logger) -> Self {
        Self {
            task_name,
            context,
            started_at: Instant::now(),
            logger,
        }
    }
}

impl Drop for ScopedExecutionTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.started_at.elapsed();
        self.logger.debug(
            self.context,
            &format!(
                "{} finished in {}",
                self.task_name,
                format_duration_human_friendly(elapsed)
            ),
        );
    }
}

pub fn measure_execution<T, F>(
    task_name: &str,
    context: Option<&str>,
    logger: &Logger,
    task: F,
) -> T
where
    F: FnOnce() -> T,
{
    let timer = ScopedExecutionTimer::new(task_name, context, logger);
    let result = task();
    drop(timer);
    result
}

pub fn format_duration_human_friendly(duration: Duration) -> String {
    let total_ms = duration.as_secs_f64() * 1000.0;
    if total_ms < 1_000.0 {
        return format!("{total_ms:.2} ms");
    }

    let total_seconds = total_ms / 1_000.0;
    if total_seconds < 60.0 {
        return format!("{total_seconds:.2} s");
    }

    let minutes = (total_seconds / 60.0).floor();
    let seconds_remainder = total_seconds - (minutes * 60.0);
    format!("{minutes:.0}m {seconds_remainder:.2}s")
}

/// Compact rendering of a crop grow time.
pub fn format_grow_time(seconds: i64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3_600 {
        return format!("{}m", seconds / 60);
    }
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if minutes > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{hours}h")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::logging::test_support::memory_logger;

    use super::{format_duration_human_friendly, format_grow_time, measure_execution};

    #[test]
    fn formats_sub_second_duration_in_milliseconds() {
        let rendered = format_duration_human_friendly(Duration::from_millis(250));
        assert!(rendered.ends_with("ms"));
        assert!(rendered.contains("250"));
    }

    #[test]
    fn formats_minutes_with_seconds_remainder() {
        let rendered = format_duration_human_friendly(Duration::from_millis(90_500));
        assert_eq!(rendered, "1m 30.50s");
    }

    #[test]
    fn grow_time_picks_largest_units() {
        assert_eq!(format_grow_time(45), "45s");
        assert_eq!(format_grow_time(600), "10m");
        assert_eq!(format_grow_time(7_200), "2h");
        assert_eq!(format_grow_time(16_200), "4h 30m");
    }

    #[test]
    fn measure_execution_logs_debug_with_task_name() {
        let (logger, sink) = memory_logger();

        let value = measure_execution("farm cycle", Some("tests::timing"), &logger, || 7);
        assert_eq!(value, 7);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[DEBUG]"));
        assert!(lines[0].contains("farm cycle finished in"));
    }
}
