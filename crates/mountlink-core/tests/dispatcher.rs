//! Tests for command dispatch: exclusion, caching, invalidation and retry

mod common;

use common::{dispatcher, init_tracing, test_config, Event, MockLink, Reply};
use mountlink_core::config::DriverSettings;
use mountlink_core::protocol::{
    CommandDispatcher, DeviceContext, DispatcherConfig, FailureClass, Mnemonic, ProtocolError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_empty_command_short_circuits() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("", false, false).unwrap(), "");
    assert_eq!(d.execute("   ", true, false).unwrap(), "");
    assert_eq!(d.execute("\t", false, true).unwrap(), "");
    assert!(link.events().is_empty());
}

#[test]
fn test_query_exchange_and_framing() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("PULSAR V5.60a"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("YV", false, false).unwrap(), "PULSAR V5.60a");
    assert_eq!(
        link.events(),
        vec![
            Event::Clear,
            Event::Transmit("#:YV#".to_string()),
            Event::Receive("PULSAR V5.60a#".to_string()),
        ]
    );
}

#[test]
fn test_cached_query_served_within_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("12:34:56"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("GR", false, false).unwrap(), "12:34:56");
    assert_eq!(d.execute("GR", false, false).unwrap(), "12:34:56");
    assert_eq!(link.transmit_count("#:GR#"), 1);
}

#[test]
fn test_uncached_query_always_hits_link() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("1")).script(Reply::text("1"));
    let d = dispatcher(&link, dir.path());

    d.execute("YGM", false, false).unwrap();
    d.execute("YGM", false, false).unwrap();
    assert_eq!(link.transmit_count("#:YGM#"), 2);
}

#[test]
fn test_raw_and_framed_share_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("+45*30:00"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("GD", false, false).unwrap(), "+45*30:00");
    assert_eq!(d.execute("  #:GD#  ", true, false).unwrap(), "+45*30:00");
    assert_eq!(link.transmitted(), vec!["#:GD#".to_string()]);
}

#[test]
fn test_sync_forces_position_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("01:00:00"))
        .script(Reply::text("+10*00:00"))
        .script(Reply::text("Coordinates matched"))
        .script(Reply::text("02:00:00"))
        .script(Reply::text("+20*00:00"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("GR", false, false).unwrap(), "01:00:00");
    assert_eq!(d.execute("GD", false, false).unwrap(), "+10*00:00");
    d.execute("CM", false, false).unwrap();

    assert_eq!(d.execute("GR", false, false).unwrap(), "02:00:00");
    assert_eq!(d.execute("GD", false, false).unwrap(), "+20*00:00");
    assert_eq!(
        link.transmitted(),
        vec!["#:GR#", "#:GD#", "#:CM#", "#:GR#", "#:GD#"]
    );
}

#[test]
fn test_invalidation_is_scoped_to_mapped_keys() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("+45*00"))
        .script(Reply::text("03:00:00"))
        .script(Reply::text("1"));
    let d = dispatcher(&link, dir.path());

    d.execute("Gt", false, false).unwrap();
    d.execute("GS", false, false).unwrap();
    d.execute("Sd -12*15:36", false, false).unwrap();

    // Neither latitude nor sidereal time depends on the target
    d.execute("Gt", false, false).unwrap();
    d.execute("GS", false, false).unwrap();
    assert_eq!(link.transmit_count("#:Gt#"), 1);
    assert_eq!(link.transmit_count("#:GS#"), 1);
}

#[test]
fn test_async_write_invalidates_before_transmit() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("1,0")).script(Reply::text("0,0"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("YGS", false, false).unwrap(), "1,0");
    assert_eq!(d.execute("YSS0,0", false, true).unwrap(), "");
    assert_eq!(d.execute("YGS", false, false).unwrap(), "0,0");
}

#[test]
fn test_async_returns_empty_without_receive() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("Q", false, true).unwrap(), "");
    assert_eq!(
        link.events(),
        vec![Event::Clear, Event::Transmit("#:Q#".to_string())]
    );
}

#[test]
fn test_async_bypasses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("12:00:00"));
    let d = dispatcher(&link, dir.path());

    d.execute("GR", false, false).unwrap();
    assert_eq!(d.execute("GR", false, true).unwrap(), "");
    assert_eq!(link.transmit_count("#:GR#"), 2);
}

#[test]
fn test_settle_delay_after_tracking_command() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    let context = Arc::new(DeviceContext::new("test.Mount", dir.path()));
    let d = CommandDispatcher::new(
        link.transport(0),
        context,
        DispatcherConfig {
            settle_delay: Duration::from_millis(60),
            ..test_config()
        },
    );

    let started = Instant::now();
    d.execute("YSS1,0", false, true).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_retry_once_after_timeout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::Timeout).script(Reply::text("1"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("YGi", false, false).unwrap(), "1");
    assert_eq!(
        link.events(),
        vec![
            Event::Clear,
            Event::Transmit("#:YGi#".to_string()),
            Event::ReceiveFailed,
            Event::Clear,
            Event::Transmit("#:YGi#".to_string()),
            Event::Receive("1#".to_string()),
        ]
    );

    // The retried answer is cached like any other
    assert_eq!(d.execute("YGi", false, false).unwrap(), "1");
    assert_eq!(link.transmit_count("#:YGi#"), 2);
}

#[test]
fn test_second_timeout_surfaces() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::Timeout).script(Reply::Timeout);
    let d = dispatcher(&link, dir.path());

    let err = d.execute("GR", false, false).unwrap_err();
    assert!(matches!(err, ProtocolError::TransportTimeout));
    assert_eq!(err.class(), FailureClass::Retryable);
    assert_eq!(link.transmit_count("#:GR#"), 2);
    assert!(d.context().cache().lookup("#:GR#").is_none());
}

#[test]
fn test_async_transmit_timeout_retried() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.fail_next_transmit(ProtocolError::TransportTimeout);
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.execute("YL", false, true).unwrap(), "");
    assert_eq!(link.transmit_count("#:YL#"), 2);
}

#[test]
fn test_fault_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::Fault("port closed".to_string()));
    let d = dispatcher(&link, dir.path());

    let err = d.execute("GA", false, false).unwrap_err();
    assert!(matches!(err, ProtocolError::TransportFault(_)));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert_eq!(link.transmit_count("#:GA#"), 1);
}

#[test]
fn test_non_text_response_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::Raw(vec![0xff, 0xfe, b'#']));
    let d = dispatcher(&link, dir.path());

    let err = d.execute("GZ", false, false).unwrap_err();
    assert!(matches!(err, ProtocolError::MalformedResponse(_)));
    assert!(d.context().cache().lookup("#:GZ#").is_none());
}

#[test]
fn test_session_released_after_error() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::Fault("glitch".to_string()))
        .script(Reply::text("+30*00:00"));
    let d = dispatcher(&link, dir.path());

    assert!(d.execute("GA", false, false).is_err());
    assert_eq!(d.execute("GA", false, false).unwrap(), "+30*00:00");
}

#[test]
fn test_exclusion_timeout_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("12:00:00"));
    let context = Arc::new(DeviceContext::new("test.Mount", dir.path()));
    let d = CommandDispatcher::new(
        link.transport(0),
        Arc::clone(&context),
        DispatcherConfig {
            command_timeout: Duration::from_millis(40),
            ..test_config()
        },
    );

    // Another driver instance holds the link
    let other = DeviceContext::new("test.Mount", dir.path());
    let held = other.session_lock().acquire(Duration::from_millis(40)).unwrap();

    let started = Instant::now();
    let err = d.execute("GR", false, false).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(matches!(err, ProtocolError::ExclusionTimeout { .. }));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert!(link.events().is_empty());

    drop(held);
    assert_eq!(d.execute("GR", false, false).unwrap(), "12:00:00");
}

/// Every transmit must be answered before anyone else touches the link
fn assert_no_interleaving(events: &[(usize, Event)]) {
    let mut in_flight: Option<usize> = None;
    for (id, event) in events {
        match event {
            Event::Transmit(_) => {
                assert_eq!(in_flight, None, "transmit while another exchange was open");
                in_flight = Some(*id);
            }
            Event::Receive(_) | Event::ReceiveFailed => {
                assert_eq!(in_flight, Some(*id), "receive outside own exchange");
                in_flight = None;
            }
            Event::Clear => {
                assert_eq!(in_flight, None, "buffers cleared mid-exchange");
            }
        }
    }
}

#[test]
fn test_threads_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let link =
        MockLink::with_responder(|command| Reply::Text(command.trim_matches('#').to_string()));
    link.set_latency(Duration::from_millis(1));
    let d = Arc::new(dispatcher(&link, dir.path()));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let d = Arc::clone(&d);
            thread::spawn(move || {
                for _ in 0..10 {
                    assert_eq!(d.execute("YGM", false, false).unwrap(), ":YGM");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(link.transmit_count("#:YGM#"), 60);
    assert_no_interleaving(&link.tagged_events());
}

#[test]
fn test_independent_contexts_never_interleave() {
    // Separate contexts and transports on one link emulate separate processes
    let dir = tempfile::tempdir().unwrap();
    let link =
        MockLink::with_responder(|command| Reply::Text(command.trim_matches('#').to_string()));
    link.set_latency(Duration::from_millis(1));

    let handles: Vec<_> = (0..4)
        .map(|id| {
            let link = link.clone();
            let lock_dir = dir.path().to_path_buf();
            thread::spawn(move || {
                let context = Arc::new(DeviceContext::new("test.Mount", &lock_dir));
                let d = CommandDispatcher::new(
                    link.transport(id),
                    context,
                    DispatcherConfig {
                        command_timeout: Duration::from_secs(5),
                        settle_delay: Duration::ZERO,
                    },
                );
                for _ in 0..10 {
                    d.execute("GC", false, false).unwrap();
                    d.execute("GL", false, false).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(link.transmitted().len(), 80);
    assert_no_interleaving(&link.tagged_events());
}

#[test]
fn test_abandoned_session_is_recovered() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("0"));
    let d = dispatcher(&link, dir.path());

    // A holder that died mid-session leaves its pid stamp behind
    std::fs::write(d.context().session_lock().path(), "31337").unwrap();

    assert_eq!(d.execute("YGk", false, false).unwrap(), "0");
    let stamp = std::fs::read_to_string(d.context().session_lock().path()).unwrap();
    assert!(stamp.is_empty());
}

#[test]
fn test_shared_context_shares_cache() {
    let dir = tempfile::tempdir().unwrap();
    let settings = DriverSettings {
        device_id: "shared.Mount".to_string(),
        lock_dir: Some(dir.path().to_path_buf()),
        settle_delay_ms: 0,
        ..DriverSettings::default()
    };
    let link = MockLink::new();
    link.script(Reply::text("+51*28"));

    let first = CommandDispatcher::from_settings(link.transport(0), &settings);
    let second = CommandDispatcher::from_settings(link.transport(1), &settings);
    assert!(Arc::ptr_eq(first.context(), second.context()));

    assert_eq!(first.execute("Gt", false, false).unwrap(), "+51*28");
    assert_eq!(second.execute("Gt", false, false).unwrap(), "+51*28");
    assert_eq!(link.transmit_count("#:Gt#"), 1);
}

#[test]
fn test_typed_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("1"))
        .script(Reply::text("0"))
        .script(Reply::text("Ok"))
        .script(Reply::text("03/15/24"));
    let d = dispatcher(&link, dir.path());

    assert!(d.command_bool("YH", false).unwrap());
    assert!(!d.command_bool("#:Sr 12:00:00#", true).unwrap());
    assert!(d.send_bool(Mnemonic::SetTargetDeclination, " +10*00:00").unwrap());
    assert_eq!(d.command_string("GC", false).unwrap(), "03/15/24");
    d.command_blind("YL", false).unwrap();

    assert_eq!(
        link.transmitted(),
        vec!["#:YH#", "#:Sr 12:00:00#", "#:Sd +10*00:00#", "#:GC#", "#:YL#"]
    );
}

#[test]
fn test_send_routes_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    let link = MockLink::new();
    link.script(Reply::text("05:00:00"));
    let d = dispatcher(&link, dir.path());

    assert_eq!(d.send(Mnemonic::PulseGuide, "n0203").unwrap(), "");
    assert_eq!(d.send(Mnemonic::GetSiderealTime, "").unwrap(), "05:00:00");
    assert_eq!(
        link.events(),
        vec![
            Event::Clear,
            Event::Transmit("#:Mgn0203#".to_string()),
            Event::Clear,
            Event::Transmit("#:GS#".to_string()),
            Event::Receive("05:00:00#".to_string()),
        ]
    );
}
