use rustc_hash::FxHashSet;

use crate::mutable::Resource;

/// The resources one in-flight invocation depends on.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// The resources in the order they were first recorded.
    vec: Vec<Resource>,
    /// The resources, for deduplication.
    seen: FxHashSet<Resource>,
}

impl Frame {
    /// Record a dependency.
    pub fn insert(&mut self, resource: Resource) {
        if self.seen.insert(resource.clone()) {
            self.vec.push(resource);
        }
    }

    /// Record several dependencies.
    pub fn extend(&mut self, resources: impl IntoIterator<Item = Resource>) {
        for resource in resources {
            self.insert(resource);
        }
    }

    /// The recorded dependencies.
    pub fn resources(&self) -> &[Resource] {
        &self.vec
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

/// One dependency frame per invocation on the call stack.
///
/// The bottom frame belongs to the caller outside of any target and is never
/// popped.
#[derive(Debug, Clone)]
pub struct Frames(Vec<Frame>);

impl Frames {
    /// A stack holding only the bottom frame.
    pub fn new() -> Self {
        Self(vec![Frame::default()])
    }

    /// Enter an invocation.
    ///
    /// The new frame starts as a copy of the current top frame if `inherit`
    /// is set and empty otherwise.
    pub fn push(&mut self, inherit: bool) {
        let frame = if inherit { self.top().clone() } else { Frame::default() };
        self.0.push(frame);
    }

    /// Leave an invocation, merging its dependencies into the caller's frame.
    pub fn pop(&mut self) {
        debug_assert!(self.0.len() > 1, "popped the bottom frame");
        if self.0.len() > 1 {
            if let Some(frame) = self.0.pop() {
                self.top_mut().extend(frame.vec);
            }
        }
    }

    /// Record a dependency of the current invocation.
    pub fn record(&mut self, resource: Resource) {
        self.top_mut().insert(resource);
    }

    /// Record several dependencies of the current invocation.
    pub fn extend(&mut self, resources: impl IntoIterator<Item = Resource>) {
        self.top_mut().extend(resources);
    }

    /// The frame of the current invocation.
    pub fn top(&self) -> &Frame {
        let last = self.0.len() - 1;
        &self.0[last]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.0.len() - 1;
        &mut self.0[last]
    }

    /// The number of open invocations.
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }
}

impl Default for Frames {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::Mutable;

    #[derive(Debug)]
    struct Never;

    impl Mutable for Never {
        fn modified(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_dedup() {
        let r = Resource::transient(Never);
        let mut frame = Frame::default();
        frame.insert(r.clone());
        frame.insert(r.clone());
        frame.extend([r]);
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn test_inherit_and_bubble() {
        let a = Resource::transient(Never);
        let b = Resource::transient(Never);
        let mut frames = Frames::new();

        frames.push(false);
        frames.record(a.clone());

        frames.push(false);
        assert!(frames.top().is_empty());
        frames.record(b.clone());
        frames.pop();
        assert_eq!(frames.top().resources(), [a.clone(), b.clone()]);

        frames.push(true);
        assert_eq!(frames.top().resources(), [a.clone(), b.clone()]);
        frames.pop();

        frames.pop();
        assert_eq!(frames.depth(), 0);
        assert_eq!(frames.top().resources(), [a, b]);
    }
}
