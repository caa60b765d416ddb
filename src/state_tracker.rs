/// Logical resource states for buffers that move between copy and shader
/// access within a frame. wgpu inserts the actual barriers; this tracker
/// keeps the encoder code honest about what each buffer is being used as,
/// and elides bookkeeping for transitions into the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Common,
    CopySrc,
    CopyDst,
    UnorderedAccess,
    ShaderRead,
}

#[derive(Debug)]
pub struct StateTracker {
    label: &'static str,
    state: ResourceState,
}

impl StateTracker {
    pub fn new(label: &'static str, initial: ResourceState) -> Self {
        StateTracker {
            label,
            state: initial,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Records a transition, returning the edge or None when the resource is
    /// already in the requested state.
    pub fn transition(&mut self, to: ResourceState) -> Option<(ResourceState, ResourceState)> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        log::trace!("{}: {:?} -> {:?}", self.label, from, to);
        self.state = to;
        Some((from, to))
    }

    /// Asserts the resource is in the state a pass is about to rely on.
    pub fn expect(&self, state: ResourceState) {
        debug_assert!(
            self.state == state,
            "{} expected {:?}, was {:?}",
            self.label,
            state,
            self.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_report_edges() {
        let mut t = StateTracker::new("pool", ResourceState::Common);
        assert_eq!(
            t.transition(ResourceState::UnorderedAccess),
            Some((ResourceState::Common, ResourceState::UnorderedAccess))
        );
        assert_eq!(
            t.transition(ResourceState::CopySrc),
            Some((ResourceState::UnorderedAccess, ResourceState::CopySrc))
        );
    }

    #[test]
    fn redundant_transition_is_elided() {
        let mut t = StateTracker::new("pool", ResourceState::CopyDst);
        assert_eq!(t.transition(ResourceState::CopyDst), None);
        assert_eq!(t.state(), ResourceState::CopyDst);
    }

    #[test]
    #[should_panic(expected = "expected")]
    fn expect_catches_mismatch() {
        let t = StateTracker::new("args", ResourceState::Common);
        t.expect(ResourceState::UnorderedAccess);
    }
}
