//! 设备会话端到端测试（脚本化总线，无硬件）

mod common;

use std::time::Duration;

use common::scripted_link;
use elliptec_driver::{
    CompletionPolicy, DriverError, HomeDirection, StageBuilder, StatusCode, StopOutcome,
};

/// 所有测试共用的快节奏参数
fn fast_builder() -> StageBuilder {
    StageBuilder::new("scripted")
        .reply_timeout(Duration::from_millis(300))
        .probe_timeout(Duration::from_millis(40))
        .poll_interval(Duration::from_millis(30))
}

#[test]
fn get_status_round_trip() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0gs" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(stage.get_status().unwrap(), StatusCode::Ok);
    assert_eq!(stage.last_status(), StatusCode::Ok);
}

#[test]
fn explicit_address_binds_without_bus_traffic() {
    let (link, bus) = scripted_link();
    let stage = fast_builder().address('3').build_with_link(link).unwrap();
    assert_eq!(stage.address().to_char(), '3');
    assert!(bus.writes().is_empty(), "binding must not probe the bus");
}

#[test]
fn invalid_address_char_fails_at_build() {
    let (link, _bus) = scripted_link();
    let err = fast_builder()
        .address('z')
        .build_with_link(link)
        .unwrap_err();
    assert!(matches!(err, DriverError::Validation(_)), "got {err:?}");
}

#[test]
fn get_position_skips_unrelated_lines() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0gp" {
            // 别台设备的行和乱码都夹在前面
            vec!["1GS00".into(), "not a reply".into(), "0PO00000400".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(stage.get_position().unwrap(), 0x400);
}

#[test]
fn stale_lines_before_send_are_discarded() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0gs" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    // 命令发出前就躺在队列里的错误状态不能被当成回复
    bus.inject_line("0GS0B");
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(stage.get_status().unwrap(), StatusCode::Ok);
    assert_eq!(stage.last_status(), StatusCode::Ok);
}

#[test]
fn timeout_resets_cached_status_to_unknown() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0gs" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(stage.get_status().unwrap(), StatusCode::Ok);

    bus.go_silent();
    let err = stage.get_status().unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(stage.last_status(), StatusCode::Unknown);
}

#[test]
fn speed_set_and_get() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| match cmd {
        "0sv3C" => vec!["0GS00".into()],
        "0gv" => vec!["0GV3C".into()],
        _ => vec![],
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    stage.set_speed(60).unwrap();
    assert_eq!(stage.get_speed().unwrap(), 60);
}

#[test]
fn set_speed_fault_ack_is_an_error() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0sv64" {
            vec!["0GS04".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    let err = stage.set_speed(100).unwrap_err();
    assert!(
        matches!(
            err,
            DriverError::Device {
                status: StatusCode::ValueOutOfRange
            }
        ),
        "got {err:?}"
    );
}

#[test]
fn set_speed_out_of_range_is_rejected_before_the_wire() {
    let (link, bus) = scripted_link();
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    let err = stage.set_speed(101).unwrap_err();
    assert!(matches!(err, DriverError::Validation(_)), "got {err:?}");
    assert!(bus.writes().is_empty(), "invalid percent must not hit the bus");
}

#[test]
fn move_completes_on_position_line() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0mr00000020" {
            vec!["0GS09".into(), "0GS09".into(), "0PO00000020".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    stage
        .move_relative(0x20, Duration::from_secs(2))
        .unwrap();
}

#[test]
fn home_completes_on_position_line() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0ho1" {
            vec!["0PO00000000".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    stage
        .home(HomeDirection::CounterClockwise, Duration::from_secs(2))
        .unwrap();
}

#[test]
fn silent_motion_resolves_via_status_polling() {
    let (link, bus) = scripted_link();
    let mut polls = 0u32;
    bus.set_responder(move |cmd| {
        match cmd {
            // 设备埋头苦干，不发任何异步行
            "0ma00000400" => vec![],
            "0gs" => {
                polls += 1;
                if polls < 3 {
                    vec!["0GS09".into()]
                } else {
                    vec!["0GS00".into()]
                }
            }
            _ => vec![],
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    stage
        .move_absolute(0x400, Duration::from_secs(3))
        .unwrap();
    let polls_seen = bus
        .writes()
        .iter()
        .filter(|w| w.as_str() == "0gs")
        .count();
    assert!(polls_seen >= 3, "expected at least 3 polls, saw {polls_seen}");
}

#[test]
fn async_ok_alone_does_not_complete_under_position_required() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0mr00000010" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder()
        .address('0')
        .completion_policy(CompletionPolicy::PositionRequired)
        .build_with_link(link)
        .unwrap();
    let err = stage
        .move_relative(0x10, Duration::from_millis(300))
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(stage.last_status(), StatusCode::Unknown);
}

#[test]
fn async_ok_completes_under_status_terminates() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0mr00000010" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder()
        .address('0')
        .completion_policy(CompletionPolicy::StatusTerminates)
        .build_with_link(link)
        .unwrap();
    stage
        .move_relative(0x10, Duration::from_secs(1))
        .unwrap();
}

#[test]
fn motion_fault_surfaces_the_status_code() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0ho0" {
            vec!["0GS09".into(), "0GS0B".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    let err = stage
        .home(HomeDirection::Clockwise, Duration::from_secs(2))
        .unwrap_err();
    assert!(
        matches!(
            err,
            DriverError::Device {
                status: StatusCode::MotorError
            }
        ),
        "got {err:?}"
    );
    assert_eq!(stage.last_status(), StatusCode::MotorError);
}

#[test]
fn foreign_device_lines_do_not_complete_our_motion() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0mr00000010" {
            // 只有别台设备在说话
            vec!["1PO00000000".into(), "1GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder()
        .address('0')
        .completion_policy(CompletionPolicy::PositionRequired)
        .build_with_link(link)
        .unwrap();
    let err = stage
        .move_relative(0x10, Duration::from_millis(300))
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
}

#[test]
fn stop_acknowledged_ok() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0st" {
            vec!["0GS00".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(
        stage.stop(Duration::from_secs(1)).unwrap(),
        StopOutcome::Stopped
    );
}

#[test]
fn stop_unsupported_is_not_an_error() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0st" {
            vec!["0GS03".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(
        stage.stop(Duration::from_secs(1)).unwrap(),
        StopOutcome::NotSupported(StatusCode::CommandError)
    );
}

#[test]
fn stop_busy_ack_waits_for_completion() {
    let (link, bus) = scripted_link();
    bus.set_responder(|cmd| {
        if cmd == "0st" {
            vec!["0GS09".into(), "0PO00000123".into()]
        } else {
            vec![]
        }
    });
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    assert_eq!(
        stage.stop(Duration::from_secs(2)).unwrap(),
        StopOutcome::Stopped
    );
}

#[test]
fn listen_sees_injected_traffic() {
    let (link, bus) = scripted_link();
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    bus.inject_line("1GS00");
    bus.inject_line("2PO00000001");
    let mut seen = Vec::new();
    stage.listen(Duration::from_millis(200), |line| {
        seen.push(line.text.clone());
        seen.len() < 2
    });
    assert_eq!(seen, vec!["1GS00".to_string(), "2PO00000001".to_string()]);
}

#[test]
fn close_is_idempotent_and_later_ops_fail_closed() {
    let (link, _bus) = scripted_link();
    let mut stage = fast_builder().address('0').build_with_link(link).unwrap();
    stage.close();
    stage.close();
    let err = stage.get_status().unwrap_err();
    assert!(matches!(err, DriverError::Closed), "got {err:?}");
}
