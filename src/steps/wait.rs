use std::time::Duration;

use tracing::{debug, warn};

use crate::host::SystemProbe;

/// Unit that rewrites the live medium's mirror list at boot.
pub const REFLECTOR: &str = "reflector.service";

const POLL: Duration = Duration::from_secs(1);

/// Polls `unit` once per `POLL` until it is no longer running. Returns
/// `false` when `timeout` runs out first.
pub fn wait_for_service(
    system: &dyn SystemProbe,
    unit: &str,
    timeout: Duration,
    mut sleep: impl FnMut(Duration),
) -> bool {
    let mut waited = Duration::ZERO;
    loop {
        let state = system.service_state(unit);
        if !is_running(&state) {
            debug!(unit, %state, ?waited, "service settled");
            return true;
        }
        if waited >= timeout {
            warn!(unit, %state, ?timeout, "gave up waiting for service");
            return false;
        }
        sleep(POLL);
        waited += POLL;
    }
}

fn is_running(state: &str) -> bool {
    matches!(state, "active" | "activating" | "reloading" | "deactivating")
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque};

    use super::*;
    use crate::testing::FakeSystem;

    fn system(states: &[&str]) -> FakeSystem {
        FakeSystem {
            uefi: true,
            nics: vec![],
            timezones: vec![],
            states: RefCell::new(states.iter().map(|s| s.to_string()).collect::<VecDeque<_>>()),
        }
    }

    #[test]
    fn returns_once_the_unit_finishes() {
        let system = system(&["activating", "activating", "inactive"]);
        let mut sleeps = 0;
        assert!(wait_for_service(&system, REFLECTOR, Duration::from_secs(300), |_| sleeps += 1));
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn failed_unit_counts_as_finished() {
        let system = system(&["failed"]);
        assert!(wait_for_service(&system, REFLECTOR, Duration::from_secs(5), |_| {
            panic!("should not sleep")
        }));
    }

    #[test]
    fn gives_up_after_the_timeout() {
        let system = system(&["activating"]);
        let mut slept = Duration::ZERO;
        assert!(!wait_for_service(&system, REFLECTOR, Duration::from_secs(3), |d| slept += d));
        assert_eq!(slept, Duration::from_secs(3));
    }
}
