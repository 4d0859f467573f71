mod common;

use std::panic::{self, AssertUnwindSafe};

use common::{bridge, bridge_with, native, recovery};
use rffi_bridge::{BridgeConfig, ElementKind, MirrorError, SlotState};

#[test]
fn test_nested_exit_releases_only_inner_entries() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_logicals(&[0]);
    let y = bridge.host_mut().new_logicals(&[0]);

    bridge.enter_call(recovery(1)).unwrap();
    let px = bridge.acquire(x, ElementKind::Logical).unwrap();

    bridge.enter_call(recovery(2)).unwrap();
    let py = bridge.acquire(y, ElementKind::Logical).unwrap();
    assert_eq!(bridge.acquire(x, ElementKind::Logical).unwrap(), px);
    unsafe {
        native::<i32>(px, 1)[0] = 1;
        native::<i32>(py, 1)[0] = 1;
    }
    assert_eq!(bridge.hwm(), 2);

    bridge.exit_call().unwrap();
    assert_eq!(bridge.call_depth(), 1);
    assert_eq!(bridge.hwm(), 1);
    assert_eq!(bridge.slot_state(0), SlotState::Live);
    assert_eq!(bridge.slot_state(1), SlotState::Absent);
    assert_eq!(bridge.host().bytes(y), vec![1]);
    assert_eq!(bridge.host().marks_for(y), vec![true]);
    assert_eq!(bridge.host().bytes(x), vec![0]);
    assert!(bridge.host().marks_for(x).is_empty());

    bridge.exit_call().unwrap();
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.hwm(), 0);
    assert_eq!(bridge.live_entries(), 0);
    assert_eq!(bridge.host().bytes(x), vec![1]);
    assert_eq!(bridge.host().marks_for(x), vec![true]);
}

#[test]
fn test_frames_release_in_any_nesting_order() {
    let mut bridge = bridge();
    let objects: Vec<_> = (0..6).map(|_| bridge.host_mut().new_ints(&[0])).collect();

    // Two entries per frame, three frames deep.
    for (depth, pair) in objects.chunks(2).enumerate() {
        bridge.enter_call(recovery(depth)).unwrap();
        for &x in pair {
            bridge.acquire(x, ElementKind::Integer).unwrap();
        }
    }
    assert_eq!(bridge.live_entries(), 6);

    for expected in [4, 2, 0] {
        bridge.exit_call().unwrap();
        assert_eq!(bridge.hwm(), expected);
        assert_eq!(bridge.live_entries(), expected);
        assert_eq!(bridge.host().pinned, expected);
    }
}

#[test]
fn test_recovery_point_follows_innermost_frame() {
    let mut bridge = bridge();
    assert!(matches!(
        bridge.current_recovery_point(),
        Err(MirrorError::NoActiveCall(_))
    ));

    bridge.enter_call(recovery(7)).unwrap();
    bridge.enter_call(recovery(9)).unwrap();
    assert_eq!(bridge.current_recovery_point().unwrap(), recovery(9));
    bridge.exit_call().unwrap();
    assert_eq!(bridge.current_recovery_point().unwrap(), recovery(7));
    bridge.exit_call().unwrap();
}

#[test]
fn test_exit_without_call_fails() {
    let mut bridge = bridge();
    assert!(matches!(bridge.exit_call(), Err(MirrorError::NoActiveCall(_))));
}

#[test]
fn test_depth_overflow_leaves_state_intact() {
    let mut bridge = bridge_with(BridgeConfig::default().with_max_call_depth(3));
    let objects: Vec<_> = (0..3).map(|_| bridge.host_mut().new_logicals(&[1])).collect();
    let mut pointers = Vec::new();
    for (depth, &x) in objects.iter().enumerate() {
        bridge.enter_call(recovery(depth)).unwrap();
        pointers.push(bridge.acquire(x, ElementKind::Logical).unwrap());
    }

    let result = bridge.enter_call(recovery(99));
    assert!(matches!(
        result,
        Err(MirrorError::CallDepthOverflow { depth: 4, max: 3 })
    ));
    assert!(result.unwrap_err().is_fatal());

    assert_eq!(bridge.call_depth(), 3);
    assert_eq!(bridge.hwm(), 3);
    assert_eq!(bridge.live_entries(), 3);
    assert_eq!(bridge.current_recovery_point().unwrap(), recovery(2));
    for (&x, &ptr) in objects.iter().zip(&pointers) {
        assert_eq!(bridge.acquire(x, ElementKind::Logical).unwrap(), ptr);
    }
}

#[test]
fn test_with_call_releases_on_error() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_logicals(&[0, 1]);

    let result: rffi_bridge::Result<()> = bridge.with_call(recovery(1), |bridge| {
        bridge.acquire(x, ElementKind::Logical)?;
        Err(MirrorError::host("native", "routine failed"))
    });

    assert!(matches!(result, Err(MirrorError::Host { .. })));
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.hwm(), 0);
    assert_eq!(bridge.host().marks_for(x), vec![true]);
}

#[test]
fn test_with_call_releases_on_panic() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_ints(&[3]);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        bridge.with_call(recovery(1), |bridge| -> rffi_bridge::Result<()> {
            bridge.acquire(x, ElementKind::Integer)?;
            panic!("native routine aborted")
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.hwm(), 0);
    assert_eq!(bridge.host().pinned, 0);
}

#[test]
fn test_with_call_returns_value() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_ints(&[10, 20]);

    let sum = bridge
        .with_call(recovery(1), |bridge| {
            let ptr = bridge.acquire(x, ElementKind::Integer)?;
            Ok(unsafe { native::<i32>(ptr, 2) }.iter().sum::<i32>())
        })
        .unwrap();

    assert_eq!(sum, 30);
    assert_eq!(bridge.call_depth(), 0);
}

#[test]
fn test_call_scope_exits_on_drop() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_logicals(&[0]);
    {
        let mut scope = bridge.call_scope(recovery(1)).unwrap();
        assert_eq!(scope.depth(), 1);
        let ptr = scope.acquire(x, ElementKind::Logical).unwrap();
        unsafe { native::<i32>(ptr, 1)[0] = 1 };
    }
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.host().bytes(x), vec![1]);
}

#[test]
fn test_call_scope_explicit_exit() {
    let mut bridge = bridge();
    let scope = bridge.call_scope(recovery(1)).unwrap();
    scope.exit().unwrap();
    assert_eq!(bridge.call_depth(), 0);
}

#[test]
fn test_with_call_error_unwinds_nested_frames() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_ints(&[1]);
    let y = bridge.host_mut().new_ints(&[2]);

    let result: rffi_bridge::Result<()> = bridge.with_call(recovery(1), |bridge| {
        bridge.acquire(x, ElementKind::Integer)?;
        bridge.enter_call(recovery(2))?;
        bridge.acquire(y, ElementKind::Integer)?;
        Err(MirrorError::host("native", "nested routine failed"))
    });

    assert!(matches!(result, Err(MirrorError::Host { .. })));
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.hwm(), 0);
    assert_eq!(bridge.live_entries(), 0);
    assert_eq!(bridge.host().pinned, 0);
}

#[test]
fn test_with_call_panic_unwinds_nested_frames() {
    let mut bridge = bridge();
    let x = bridge.host_mut().new_ints(&[1]);
    let y = bridge.host_mut().new_ints(&[2]);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        bridge.with_call(recovery(1), |bridge| -> rffi_bridge::Result<()> {
            bridge.acquire(x, ElementKind::Integer)?;
            bridge.enter_call(recovery(2))?;
            bridge.acquire(y, ElementKind::Integer)?;
            panic!("nested routine aborted")
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(bridge.call_depth(), 0);
    assert_eq!(bridge.hwm(), 0);
    assert_eq!(bridge.live_entries(), 0);
    assert_eq!(bridge.host().pinned, 0);
}

#[test]
fn test_call_scope_leaves_outer_frames_open() {
    let mut bridge = bridge();
    let outer = bridge.host_mut().new_ints(&[1]);
    let inner = bridge.host_mut().new_ints(&[2]);

    bridge.enter_call(recovery(1)).unwrap();
    bridge.acquire(outer, ElementKind::Integer).unwrap();
    {
        let mut scope = bridge.call_scope(recovery(2)).unwrap();
        scope.acquire(inner, ElementKind::Integer).unwrap();
        scope.enter_call(recovery(3)).unwrap();
    }

    assert_eq!(bridge.call_depth(), 1);
    assert_eq!(bridge.live_entries(), 1);
    assert_eq!(bridge.host().pinned, 1);
    assert_eq!(bridge.current_recovery_point().unwrap(), recovery(1));
    bridge.exit_call().unwrap();
}
