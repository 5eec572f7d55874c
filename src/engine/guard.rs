//! Suppression of reentrant triggers.
//!
//! While the engine's `Applying` phase mutates the grid, the host may observe those
//! synthetic mutations and dispatch them back to the engine as new triggers on the
//! same thread. A per-thread flag, held through an RAII scope, suppresses those:
//! release is guaranteed on every exit path, including early returns and unwinding.
//!
//! The flag is thread-local, not global: the simulation thread owns all grid
//! mutation, so confinement to it is exactly the scope within which reentrancy can
//! occur.

use core::cell::Cell;

use scopeguard::ScopeGuard;

thread_local! {
    static APPLYING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside an `Applying` phase.
pub(crate) fn is_active() -> bool {
    APPLYING.with(Cell::get)
}

/// Marks the current thread as being inside an `Applying` phase, for as long as the
/// returned scope is held.
///
/// Returns [`None`] if the thread is already inside one — the caller must then
/// treat its trigger as reentrant and do nothing.
pub(crate) fn enter() -> Option<ScopeGuard<(), impl FnOnce(())>> {
    if APPLYING.with(|flag| flag.replace(true)) {
        None
    } else {
        Some(scopeguard::guard((), |()| {
            APPLYING.with(|flag| flag.set(false));
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_enter_is_suppressed() {
        assert!(!is_active());
        let outer = enter();
        assert!(outer.is_some());
        assert!(is_active());
        assert!(enter().is_none(), "nested enter must be refused");
        drop(outer);
        assert!(!is_active());
        assert!(enter().is_some(), "flag must be clear after release");
    }

    #[test]
    fn released_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _scope = enter().unwrap();
            panic!("mid-applying fault");
        });
        assert!(result.is_err());
        assert!(!is_active(), "flag must be released by unwinding");
    }

    #[test]
    fn confined_to_one_thread() {
        let _scope = enter().unwrap();
        std::thread::scope(|threads| {
            threads.spawn(|| {
                assert!(!is_active(), "other threads have their own flag");
            });
        });
    }
}
