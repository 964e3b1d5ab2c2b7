// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::{Clock, FakeClock, JobId};

#[test]
fn timer_lifecycle() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    let id = TimerId::schedule(&JobId::new("j1"));

    timers.set(id.clone(), Duration::from_secs(10), clock.now());
    assert!(!timers.is_empty());
    assert!(timers.next_deadline().is_some());

    clock.advance(Duration::from_secs(5));
    assert!(timers.fired(clock.now()).is_empty());

    clock.advance(Duration::from_secs(10));
    let fired = timers.fired(clock.now());
    assert_eq!(fired, vec![id]);
    assert!(timers.is_empty());
}

#[test]
fn cancel_prevents_firing() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    let id = TimerId::grace(&JobId::new("j1"));
    timers.set(id.clone(), Duration::from_secs(1), clock.now());
    timers.cancel(&id);
    clock.advance(Duration::from_secs(5));
    assert!(timers.fired(clock.now()).is_empty());
}

#[test]
fn multiple_timers_fire_independently() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    let fast = TimerId::schedule(&JobId::new("fast"));
    let slow = TimerId::schedule(&JobId::new("slow"));
    timers.set(fast.clone(), Duration::from_secs(5), clock.now());
    timers.set(slow.clone(), Duration::from_secs(20), clock.now());

    clock.advance(Duration::from_secs(6));
    assert_eq!(timers.fired(clock.now()), vec![fast]);
    assert!(!timers.is_empty());

    clock.advance(Duration::from_secs(15));
    assert_eq!(timers.fired(clock.now()), vec![slow]);
}

#[test]
fn next_deadline_is_earliest() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    timers.set(
        TimerId::schedule(&JobId::new("later")),
        Duration::from_secs(30),
        clock.now(),
    );
    timers.set(
        TimerId::schedule(&JobId::new("sooner")),
        Duration::from_secs(10),
        clock.now(),
    );
    assert_eq!(
        timers.next_deadline().unwrap(),
        clock.now() + Duration::from_secs(10)
    );
}

#[test]
fn resetting_a_timer_replaces_its_deadline() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    let id = TimerId::timeout(&JobId::new("j1"));
    timers.set(id.clone(), Duration::from_secs(5), clock.now());
    timers.set(id.clone(), Duration::from_secs(60), clock.now());

    clock.advance(Duration::from_secs(10));
    assert!(timers.fired(clock.now()).is_empty());
}

#[test]
fn cancel_with_suffix_clears_job_timers() {
    let clock = FakeClock::new();
    let mut timers = TimerTable::new();
    let job = JobId::new("j1");
    timers.set(TimerId::schedule(&job), Duration::from_secs(5), clock.now());
    timers.set(TimerId::grace(&job), Duration::from_secs(5), clock.now());
    timers.set(
        TimerId::schedule(&JobId::new("other")),
        Duration::from_secs(5),
        clock.now(),
    );

    timers.cancel_with_suffix("/j1");
    clock.advance(Duration::from_secs(10));
    assert_eq!(timers.fired(clock.now()).len(), 1);
}
