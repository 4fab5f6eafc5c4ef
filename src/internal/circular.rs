//! Circular dependency detection infrastructure.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};

const MAX_DEPTH: usize = 1024;

// Thread-local resolution stack; every top-level resolution on a thread starts
// from an empty stack, so concurrent resolutions never see each other's frames.
thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one frame of the thread-local resolution stack.
///
/// Entering pushes the type onto the stack, dropping pops it again, also when
/// construction bails out early with `?`.
pub(crate) struct ResolutionFrame {
    name: &'static str,
}

impl ResolutionFrame {
    pub(crate) fn enter(name: &'static str) -> DiResult<Self> {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();

            // Circular detection BEFORE pushing the new name
            if stack.iter().any(|&n| n == name) {
                let mut chain = stack.clone();
                chain.push(name);
                return Err(DiError::CircularDependencyDetected { chain });
            }

            if stack.len() >= MAX_DEPTH {
                return Err(DiError::DepthExceeded(stack.len()));
            }

            stack.push(name);
            Ok(Self { name })
        })
    }
}

impl Drop for ResolutionFrame {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(last) = stack.pop() {
                debug_assert_eq!(last, self.name);
            }
        });
    }
}

/// Types currently being constructed on this thread, outermost first.
pub(crate) fn current_chain() -> Vec<&'static str> {
    RESOLUTION_STACK.with(|stack| stack.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_pop_on_drop() {
        {
            let _a = ResolutionFrame::enter("A").unwrap();
            let _b = ResolutionFrame::enter("B").unwrap();
            assert_eq!(current_chain(), vec!["A", "B"]);
        }
        assert!(current_chain().is_empty());
    }

    #[test]
    fn reentering_reports_full_chain() {
        let _a = ResolutionFrame::enter("A").unwrap();
        let _b = ResolutionFrame::enter("B").unwrap();
        match ResolutionFrame::enter("A") {
            Err(DiError::CircularDependencyDetected { chain }) => {
                assert_eq!(chain, vec!["A", "B", "A"]);
            }
            _ => panic!("expected circular dependency"),
        }
        // failed enter leaves the stack untouched
        assert_eq!(current_chain(), vec!["A", "B"]);
    }

    #[test]
    fn stacks_are_per_thread() {
        let _a = ResolutionFrame::enter("A").unwrap();
        std::thread::spawn(|| {
            assert!(current_chain().is_empty());
            assert!(ResolutionFrame::enter("A").is_ok());
        })
        .join()
        .unwrap();
    }
}
