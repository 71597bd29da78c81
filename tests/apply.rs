// canbus-setup/tests/apply.rs
//
// Integration tests for writing and removing configurations.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

mod common;

use canbus_setup::{
    apply_configuration, detect, extract_parameters, remove_configuration, Activation, Bitrate,
    DesiredParameters, Detection, Error, Layout, Scheme, TxQueueLen,
};
use common::FakeSystem;
use std::fs;
use tempfile::TempDir;

fn params(bitrate: u32, txqueuelen: u32) -> DesiredParameters {
    DesiredParameters::new(
        Bitrate::try_from(bitrate).unwrap(),
        TxQueueLen::try_from(txqueuelen).unwrap(),
    )
}

fn scratch() -> (TempDir, Layout) {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path(), "can0");
    (dir, layout)
}

#[test]
fn test_apply_each_scheme() {
    let desired = params(500_000, 256);

    for scheme in Scheme::ALL {
        let (_dir, layout) = scratch();
        let mut sys = FakeSystem::new();

        let applied = apply_configuration(&mut sys, &layout, scheme, &desired).unwrap();
        assert_eq!(applied.scheme, scheme);
        assert_eq!(applied.persisted.bitrate.as_deref(), Some("500000"));
        assert_eq!(applied.persisted.txqueuelen.as_deref(), Some("256"));
        assert!(layout.files(scheme).all_present());

        let detection = detect(&layout);
        assert!(detection.is_complete());
        assert_eq!(detection.scheme(), Some(scheme));
    }
}

#[test]
fn test_legacy_needs_reboot() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();

    let applied =
        apply_configuration(&mut sys, &layout, Scheme::Legacy, &DesiredParameters::default())
            .unwrap();
    assert_eq!(applied.activation, Activation::RebootRequired);
    assert!(sys.calls.is_empty());
}

#[test]
fn test_systemd_activation_order() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();

    let applied =
        apply_configuration(&mut sys, &layout, Scheme::SchemeA, &DesiredParameters::default())
            .unwrap();
    assert_eq!(applied.activation, Activation::Active);
    assert_eq!(
        sys.calls,
        [
            "systemctl unmask systemd-networkd",
            "systemctl enable systemd-networkd",
            "udevadm control --reload-rules",
            "udevadm trigger --subsystem-match=net",
            "systemctl restart systemd-networkd",
        ]
    );

    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();
    apply_configuration(&mut sys, &layout, Scheme::SchemeB, &DesiredParameters::default())
        .unwrap();
    assert_eq!(
        sys.calls,
        [
            "systemctl unmask systemd-networkd",
            "systemctl enable systemd-networkd",
            "systemctl daemon-reload",
            "systemctl enable can0-txqueuelen.service",
            "systemctl restart systemd-networkd",
            "systemctl restart can0-txqueuelen.service",
        ]
    );
}

#[test]
fn test_apply_is_idempotent() {
    let desired = params(250_000, 512);

    for scheme in Scheme::ALL {
        let (_dir, layout) = scratch();
        let mut sys = FakeSystem::new();

        let first = apply_configuration(&mut sys, &layout, scheme, &desired).unwrap();
        let contents = layout
            .files(scheme)
            .paths
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect::<Vec<_>>();

        let second = apply_configuration(&mut sys, &layout, scheme, &desired).unwrap();
        assert_eq!(first.persisted, second.persisted);

        let again = layout
            .files(scheme)
            .paths
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(contents, again);
    }
}

#[test]
fn test_switching_schemes_cleans_up() {
    let desired = DesiredParameters::default();

    for from in Scheme::ALL {
        for to in Scheme::ALL {
            let (_dir, layout) = scratch();
            let mut sys = FakeSystem::new();

            apply_configuration(&mut sys, &layout, from, &desired).unwrap();
            apply_configuration(&mut sys, &layout, to, &desired).unwrap();

            let detection = detect(&layout);
            assert!(detection.is_complete(), "{} -> {}: {}", from, to, detection);
            assert_eq!(detection.scheme(), Some(to));

            for other in Scheme::ALL.into_iter().filter(|s| *s != to) {
                assert!(!layout.files(other).any_present());
            }
        }
    }
}

#[test]
fn test_switching_from_b_disables_the_unit() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();
    let desired = DesiredParameters::default();

    apply_configuration(&mut sys, &layout, Scheme::SchemeB, &desired).unwrap();
    sys.calls.clear();

    apply_configuration(&mut sys, &layout, Scheme::Legacy, &desired).unwrap();
    assert_eq!(sys.calls, ["systemctl disable can0-txqueuelen.service"]);
}

#[test]
fn test_disable_failure_does_not_stop_cleanup() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();
    let desired = DesiredParameters::default();

    apply_configuration(&mut sys, &layout, Scheme::SchemeB, &desired).unwrap();
    sys.fail_on = Some("systemctl disable can0-txqueuelen.service".into());

    apply_configuration(&mut sys, &layout, Scheme::SchemeA, &desired).unwrap();
    assert_eq!(detect(&layout), Detection::SchemeA);
}

#[test]
fn test_conflict_resolved_by_apply() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();
    let desired = params(125_000, 128);

    // Leave a stray file from each of the other schemes
    for scheme in [Scheme::Legacy, Scheme::SchemeA] {
        let path = layout.files(scheme).paths[0].clone();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "# stale\n").unwrap();
    }
    assert_eq!(detect(&layout), Detection::Multiple);

    apply_configuration(&mut sys, &layout, Scheme::SchemeB, &desired).unwrap();
    assert_eq!(detect(&layout), Detection::SchemeB);
}

#[test]
fn test_read_back_from_fresh_layout() {
    let pairs = Bitrate::all().zip(TxQueueLen::all());

    for (scheme, (bitrate, txqueuelen)) in Scheme::ALL.into_iter().cycle().zip(pairs) {
        let dir = TempDir::new().unwrap();
        let desired = DesiredParameters::new(bitrate, txqueuelen);

        apply_configuration(
            &mut FakeSystem::new(),
            &Layout::new(dir.path(), "can0"),
            scheme,
            &desired,
        )
        .unwrap();

        let persisted = extract_parameters(&Layout::new(dir.path(), "can0"), scheme);
        assert!(persisted.matches(&desired), "{}: {}", scheme, persisted);
        assert_eq!(persisted.bitrate_value(), Some(bitrate.bps()));
        assert_eq!(persisted.txqueuelen_value(), Some(txqueuelen.frames()));
    }
}

#[test]
fn test_restart_failure_aborts() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new().failing("systemctl restart systemd-networkd");

    let err = apply_configuration(&mut sys, &layout, Scheme::SchemeB, &DesiredParameters::default())
        .unwrap_err();
    assert!(matches!(err, Error::Command { .. }));
    assert!(err.to_string().contains("Job failed."));

    // Nothing after the failing step was run
    assert!(!sys.ran("systemctl restart can0-txqueuelen.service"));
    // The files stay where they were written
    assert!(layout.files(Scheme::SchemeB).all_present());
}

#[test]
fn test_mismatch_is_reported_and_kept() {
    let (_dir, layout) = scratch();
    let network = layout.files(Scheme::SchemeA).bitrate_file().to_path_buf();
    let tampered = "[Match]\nName=can0\n\n[CAN]\nBitRate=500000\n";

    let mut sys = FakeSystem::new();
    sys.tamper = Some((network.clone(), tampered.to_string()));

    let err = apply_configuration(&mut sys, &layout, Scheme::SchemeA, &params(1_000_000, 1024))
        .unwrap_err();

    match err {
        Error::Validation(ref v) => {
            assert!(v.bitrate_mismatch());
            assert!(!v.txqueuelen_mismatch());
            assert_eq!(v.found.bitrate.as_deref(), Some("500000"));
        }
        _ => panic!("unexpected error: {:?}", err),
    }
    assert!(err.to_string().contains("500000"));

    // No rollback
    assert_eq!(fs::read_to_string(&network).unwrap(), tampered);
    assert_eq!(detect(&layout), Detection::SchemeA);
}

#[test]
fn test_out_of_set_values_rejected() {
    assert!(matches!(
        Bitrate::try_from(1_000_001),
        Err(Error::InvalidChoice { what: "bitrate", .. })
    ));
    assert!("1000".parse::<TxQueueLen>().is_err());
    assert!("0".parse::<Bitrate>().is_err());
    assert!("-128".parse::<TxQueueLen>().is_err());
}

#[test]
fn test_remove_configuration() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();

    apply_configuration(&mut sys, &layout, Scheme::SchemeB, &DesiredParameters::default())
        .unwrap();
    sys.calls.clear();

    let removed = remove_configuration(&mut sys, &layout).unwrap();
    assert_eq!(removed, layout.files(Scheme::SchemeB).paths);
    assert_eq!(detect(&layout), Detection::Unknown);
    assert_eq!(
        sys.calls,
        [
            "systemctl disable can0-txqueuelen.service",
            "systemctl daemon-reload",
            "systemctl restart systemd-networkd",
        ]
    );
}

#[test]
fn test_remove_legacy_and_nothing() {
    let (_dir, layout) = scratch();
    let mut sys = FakeSystem::new();

    assert!(remove_configuration(&mut sys, &layout).unwrap().is_empty());

    apply_configuration(&mut sys, &layout, Scheme::Legacy, &DesiredParameters::default())
        .unwrap();
    let removed = remove_configuration(&mut sys, &layout).unwrap();
    assert_eq!(removed.len(), 1);
    assert!(sys.calls.is_empty());
}
