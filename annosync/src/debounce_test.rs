use super::*;

const QUIET: Duration = Duration::from_millis(250);

#[test]
fn idle_never_fires() {
    let mut d = Debouncer::new(QUIET);
    assert!(!d.poll(Instant::now()));
    assert!(d.deadline().is_none());
}

#[test]
fn fires_once_after_quiet_period() {
    let t0 = Instant::now();
    let mut d = Debouncer::new(QUIET);
    d.schedule(t0);
    assert!(!d.poll(t0 + Duration::from_millis(249)));
    assert!(d.poll(t0 + QUIET));
    assert!(!d.poll(t0 + Duration::from_secs(5)));
}

#[test]
fn reschedule_pushes_deadline_out() {
    let t0 = Instant::now();
    let mut d = Debouncer::new(QUIET);
    d.schedule(t0);
    d.schedule(t0 + Duration::from_millis(200));
    assert!(!d.poll(t0 + Duration::from_millis(300)));
    assert!(d.poll(t0 + Duration::from_millis(450)));
}

#[test]
fn cancel_disarms() {
    let t0 = Instant::now();
    let mut d = Debouncer::new(QUIET);
    d.schedule(t0);
    d.cancel();
    assert!(d.deadline().is_none());
    assert!(!d.poll(t0 + QUIET));
}
