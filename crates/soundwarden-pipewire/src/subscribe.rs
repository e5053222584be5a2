//! Change-event stream from `pactl subscribe`.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, trace, warn};

use soundwarden_core::{BackendEvent, EventKind, Facility};

static EVENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Event '(new|change|remove)' on ([a-z-]+) #(\d+)$").expect("event line pattern is valid")
});

/// Parse one `pactl subscribe` line. Facilities the engine does not mirror
/// (clients, modules, source outputs, ...) yield `None`.
#[must_use]
pub fn parse_event(line: &str) -> Option<BackendEvent> {
    let caps = EVENT_LINE.captures(line.trim())?;
    let kind = match &caps[1] {
        "new" => EventKind::New,
        "change" => EventKind::Change,
        _ => EventKind::Remove,
    };
    let facility = match &caps[2] {
        "card" => Facility::Card,
        "sink" => Facility::Sink,
        "source" => Facility::Source,
        "sink-input" => Facility::SinkInput,
        "server" => Facility::Server,
        _ => return None,
    };
    let index = caps[3].parse().ok()?;
    Some(BackendEvent::new(facility, kind, index))
}

/// Run `pactl subscribe` until `shutdown` flips, restarting it after
/// `delay` whenever it exits.
pub async fn run(
    pactl: String,
    delay: Duration,
    events: mpsc::Sender<BackendEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut restarted = false;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let child = Command::new(&pactl)
            .arg("subscribe")
            .env("LC_ALL", "C")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match child {
            Ok(mut child) => {
                info!("Subscribed to audio server events");
                // Anything may have changed while nobody was listening.
                if restarted {
                    let _ = events.send(BackendEvent::new(Facility::Card, EventKind::Change, 0)).await;
                    let _ = events.send(BackendEvent::new(Facility::Server, EventKind::Change, 0)).await;
                }
                if let Some(stdout) = child.stdout.take() {
                    let mut lines = FramedRead::new(stdout, LinesCodec::new());
                    loop {
                        tokio::select! {
                            line = lines.next() => match line {
                                Some(Ok(line)) => {
                                    trace!(line = %line, "pactl subscribe");
                                    if let Some(event) = parse_event(&line)
                                        && events.send(event).await.is_err()
                                    {
                                        debug!("Event receiver dropped, stopping subscription");
                                        return;
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "Failed to read pactl subscribe output");
                                    break;
                                }
                                None => break,
                            },
                            _ = shutdown.changed() => {
                                debug!("Stopping pactl subscribe");
                                return;
                            }
                        }
                    }
                }
                let _ = child.kill().await;
                warn!(delay_ms = delay.as_millis(), "pactl subscribe exited, restarting");
            }
            Err(e) => warn!(binary = %pactl, error = %e, "Failed to start pactl subscribe"),
        }

        restarted = true;
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("Event subscription stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_lines() {
        assert_eq!(
            parse_event("Event 'new' on sink #53"),
            Some(BackendEvent::new(Facility::Sink, EventKind::New, 53))
        );
        assert_eq!(
            parse_event("Event 'change' on card #47\n"),
            Some(BackendEvent::new(Facility::Card, EventKind::Change, 47))
        );
        assert_eq!(
            parse_event("Event 'remove' on sink-input #12"),
            Some(BackendEvent::new(Facility::SinkInput, EventKind::Remove, 12))
        );
        assert_eq!(
            parse_event("Event 'change' on server #4294967295"),
            Some(BackendEvent::new(Facility::Server, EventKind::Change, u32::MAX))
        );
    }

    #[test]
    fn test_parse_event_ignores_other_lines() {
        assert_eq!(parse_event("Event 'new' on client #80"), None);
        assert_eq!(parse_event("Event 'change' on source-output #3"), None);
        assert_eq!(parse_event("Connection failure: Connection refused"), None);
        assert_eq!(parse_event("Event 'new' on sink #99999999999"), None);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tx, _rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run("/nonexistent/pactl".into(), Duration::from_secs(60), tx, stop_rx));
        stop_tx.send(true).expect("Failed to signal shutdown");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("Subscriber did not stop")
            .expect("Subscriber panicked");
    }
}
