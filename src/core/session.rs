//! Arena-based generation session management.
//!
//! A [`GenerationSession`] ties the diagnostic data produced during one or
//! more loop-nest generation passes to a single arena lifetime. The per-level
//! block layout handed back to callers is allocated here, so it stays valid
//! after the generator itself is gone.

use bumpalo::Bump;
use std::fmt;

use crate::nest::descriptor::JoinLoopKind;

/// Arena-backed session for loop-nest generation.
///
/// One session serves one destination module; sharing a session across
/// concurrent generation passes is not supported.
pub struct GenerationSession<'arena> {
    /// Arena allocator for generation-time objects.
    arena: &'arena Bump,

    /// Statistics collected across generation passes.
    stats: SessionStats,
}

impl<'arena> GenerationSession<'arena> {
    /// Create a new session backed by the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: SessionStats::default(),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate a string in the session arena.
    pub fn alloc_str(&self, value: &str) -> &'arena str {
        self.arena.alloc_str(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T: Copy>(&self, slice: &[T]) -> &'arena [T] {
        self.arena.alloc_slice_copy(slice)
    }

    /// Record one generated join level.
    pub fn record_level(&mut self, kind: JoinLoopKind) {
        self.stats.levels_generated += 1;
        match kind {
            JoinLoopKind::Singleton => self.stats.singleton_levels += 1,
            JoinLoopKind::UpperBound => self.stats.upper_bound_levels += 1,
        }
    }

    /// Record one created basic block.
    pub fn record_block(&mut self) {
        self.stats.blocks_created += 1;
    }

    /// Record a completed generation pass over `levels` descriptors.
    pub fn record_nest(&mut self, levels: usize) {
        self.stats.nests_generated += 1;
        self.stats.deepest_nest = self.stats.deepest_nest.max(levels);
    }

    /// Get generation statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

/// Statistics for one generation session.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Number of loop nests generated.
    pub nests_generated: usize,

    /// Number of join levels generated across all nests.
    pub levels_generated: usize,

    /// Number of basic blocks created by the generator.
    pub blocks_created: usize,

    /// Levels generated with `Singleton` kind.
    pub singleton_levels: usize,

    /// Levels generated with `UpperBound` kind.
    pub upper_bound_levels: usize,

    /// Deepest nest generated in this session.
    pub deepest_nest: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generation Session Statistics:")?;
        writeln!(f, "  Nests generated: {}", self.nests_generated)?;
        writeln!(
            f,
            "  Levels generated: {} ({} singleton, {} upper-bound)",
            self.levels_generated, self.singleton_levels, self.upper_bound_levels
        )?;
        writeln!(f, "  Blocks created: {}", self.blocks_created)?;
        writeln!(f, "  Deepest nest: {}", self.deepest_nest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let arena = Bump::new();
        let session = GenerationSession::new(&arena);

        assert_eq!(session.stats().nests_generated, 0);
        assert_eq!(session.stats().levels_generated, 0);
    }

    #[test]
    fn test_arena_allocation() {
        let arena = Bump::new();
        let session = GenerationSession::new(&arena);

        let name = session.alloc_str("i0");
        assert_eq!(name, "i0");

        let slice = session.alloc_slice(&[1, 2, 3, 4]);
        assert_eq!(slice, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let mut session = GenerationSession::new(&arena);

        session.record_level(JoinLoopKind::UpperBound);
        session.record_level(JoinLoopKind::Singleton);
        session.record_level(JoinLoopKind::UpperBound);
        session.record_block();
        session.record_block();
        session.record_nest(3);

        let stats = session.stats();
        assert_eq!(stats.levels_generated, 3);
        assert_eq!(stats.singleton_levels, 1);
        assert_eq!(stats.upper_bound_levels, 2);
        assert_eq!(stats.blocks_created, 2);
        assert_eq!(stats.nests_generated, 1);
        assert_eq!(stats.deepest_nest, 3);
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let mut session = GenerationSession::new(&arena);

        session.record_level(JoinLoopKind::UpperBound);
        session.record_nest(1);

        let output = format!("{}", session.stats());
        assert!(output.contains("Nests generated: 1"));
        assert!(output.contains("Levels generated: 1"));
        assert!(output.contains("Deepest nest: 1"));
    }
}
