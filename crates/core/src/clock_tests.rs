// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new(1000);
    assert_eq!(clock.epoch_ms(), 1000);
    clock.advance_ms(250);
    assert_eq!(clock.epoch_ms(), 1250);
    clock.set_ms(99);
    assert_eq!(clock.epoch_ms(), 99);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new(1);
    let clone = clock.clone();
    clock.advance_ms(9);
    assert_eq!(clone.epoch_ms(), 10);
}

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    let b = clock.epoch_ms();
    assert!(b >= a);
}
