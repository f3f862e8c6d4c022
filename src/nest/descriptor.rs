//! Join-level descriptors and their iteration domains.
//!
//! A [`LoopDescriptor`] describes one join level: how the level iterates
//! (`Singleton` probe vs `UpperBound` scan), its join semantics, and the
//! callback that produces the level's [`Domain`] for a given tuple of
//! enclosing iterator values. Descriptors are immutable once constructed and
//! an ordered list of them, outermost first, defines one loop nest.

use std::fmt;

use inkwell::builder::Builder;
use inkwell::types::IntType;
use inkwell::values::IntValue;

use crate::core::error::CodegenResult;

/// Slot value meaning "the probe found no match".
///
/// Any negative slot is treated as no-match by the generated comparison; this
/// is the canonical encoding used by constant-folding providers.
pub const NO_MATCH_SENTINEL: i64 = -1;

/// How a join level iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinLoopKind {
    /// At most one probe per enclosing tuple (e.g. a hash lookup).
    Singleton,
    /// A counted scan over `[0, upper_bound)`.
    UpperBound,
}

/// Join semantics of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSemantics {
    /// A failed probe skips the enclosing tuple entirely.
    Inner,
    /// A failed probe still produces one NULL-extended row, with the
    /// iterator value set to the no-match sentinel.
    LeftOuter,
}

/// The per-level, per-enclosing-tuple iteration domain.
///
/// Exactly one shape is valid for a given level: `UpperBound` levels must
/// produce [`Domain::UpperBound`], `Singleton` levels must produce
/// [`Domain::SlotLookup`]. A mismatch is descriptor misuse and fails
/// generation.
#[derive(Debug, Clone, Copy)]
pub enum Domain<'ctx> {
    /// Exclusive iteration bound, counted from zero.
    UpperBound(IntValue<'ctx>),
    /// Matched slot value; negative means "no match".
    SlotLookup(IntValue<'ctx>),
}

impl<'ctx> Domain<'ctx> {
    /// A constant slot-lookup result that never matches.
    pub fn no_match(ty: IntType<'ctx>) -> Self {
        Domain::SlotLookup(ty.const_int(NO_MATCH_SENTINEL as u64, true))
    }

    /// Shape name for diagnostics.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Domain::UpperBound(_) => "upper-bound",
            Domain::SlotLookup(_) => "slot-lookup",
        }
    }
}

/// Ordered iterator values for the levels evaluated so far.
///
/// Slot 0 is always a placeholder (`None`) standing in for "no enclosing
/// iterator" at the outermost level; the tuple grows by exactly one value as
/// control descends one nesting level.
#[derive(Debug, Clone)]
pub struct IteratorTuple<'ctx> {
    values: Vec<Option<IntValue<'ctx>>>,
}

impl Default for IteratorTuple<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> IteratorTuple<'ctx> {
    /// A tuple holding only the outermost placeholder.
    pub fn new() -> Self {
        Self {
            values: vec![None],
        }
    }

    /// Nesting depth: number of enclosing levels with a value.
    pub fn depth(&self) -> usize {
        self.values.len() - 1
    }

    /// All entries, the leading placeholder included.
    pub fn values(&self) -> &[Option<IntValue<'ctx>>] {
        &self.values
    }

    /// The per-level iterator values, placeholder skipped.
    pub fn level_values(&self) -> impl Iterator<Item = IntValue<'ctx>> + '_ {
        self.values.iter().filter_map(|v| *v)
    }

    pub(crate) fn push(&mut self, value: IntValue<'ctx>) {
        self.values.push(Some(value));
    }

    pub(crate) fn pop(&mut self) {
        debug_assert!(self.values.len() > 1);
        self.values.pop();
    }
}

/// Produces a level's [`Domain`] for the given enclosing iterators.
///
/// The tuple holds exactly one entry per enclosing level plus the leading
/// placeholder. The provider may emit IR at the builder's current insertion
/// point (hash probes, range checks) and closes over whatever state it needs.
pub type DomainProvider<'ctx> =
    Box<dyn Fn(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<Domain<'ctx>> + 'ctx>;

/// Emits extra IR on a level's no-match path, before the outgoing branch.
///
/// Invoked for `Singleton` levels whose probe failed and for `LeftOuter`
/// `UpperBound` levels whose bound was zero.
pub type ProbeFailHook<'ctx> =
    Box<dyn Fn(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<()> + 'ctx>;

/// One join level of a loop nest.
pub struct LoopDescriptor<'ctx> {
    kind: JoinLoopKind,
    semantics: JoinSemantics,
    domain_provider: DomainProvider<'ctx>,
    probe_fail_hook: Option<ProbeFailHook<'ctx>>,
    name: String,
}

impl<'ctx> LoopDescriptor<'ctx> {
    /// Create a descriptor for one join level.
    pub fn new<F>(
        kind: JoinLoopKind,
        semantics: JoinSemantics,
        name: impl Into<String>,
        domain_provider: F,
    ) -> Self
    where
        F: Fn(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<Domain<'ctx>> + 'ctx,
    {
        Self {
            kind,
            semantics,
            domain_provider: Box::new(domain_provider),
            probe_fail_hook: None,
            name: name.into(),
        }
    }

    /// Attach a hook emitted on this level's no-match path.
    pub fn with_probe_fail_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<()> + 'ctx,
    {
        self.probe_fail_hook = Some(Box::new(hook));
        self
    }

    pub fn kind(&self) -> JoinLoopKind {
        self.kind
    }

    pub fn semantics(&self) -> JoinSemantics {
        self.semantics
    }

    /// Diagnostic name; also used to label the level's basic blocks.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn evaluate_domain(
        &self,
        tuple: &IteratorTuple<'ctx>,
        builder: &Builder<'ctx>,
    ) -> CodegenResult<Domain<'ctx>> {
        (self.domain_provider)(tuple, builder)
    }

    pub(crate) fn probe_fail_hook(&self) -> Option<&ProbeFailHook<'ctx>> {
        self.probe_fail_hook.as_ref()
    }
}

impl fmt::Debug for LoopDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopDescriptor")
            .field("kind", &self.kind)
            .field("semantics", &self.semantics)
            .field("name", &self.name)
            .field("has_probe_fail_hook", &self.probe_fail_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn test_tuple_starts_with_placeholder() {
        let tuple = IteratorTuple::new();
        assert_eq!(tuple.values().len(), 1);
        assert_eq!(tuple.depth(), 0);
        assert!(tuple.values()[0].is_none());
        assert_eq!(tuple.level_values().count(), 0);
    }

    #[test]
    fn test_tuple_grows_one_value_per_level() {
        let context = Context::create();
        let i64_ty = context.i64_type();
        let mut tuple = IteratorTuple::new();

        tuple.push(i64_ty.const_int(0, false));
        tuple.push(i64_ty.const_int(7, false));
        assert_eq!(tuple.values().len(), 3);
        assert_eq!(tuple.depth(), 2);
        assert_eq!(tuple.level_values().count(), 2);

        tuple.pop();
        assert_eq!(tuple.depth(), 1);
    }

    #[test]
    fn test_domain_shapes() {
        let context = Context::create();
        let i64_ty = context.i64_type();

        let scan = Domain::UpperBound(i64_ty.const_int(5, false));
        assert_eq!(scan.shape_name(), "upper-bound");

        let probe = Domain::no_match(i64_ty);
        assert_eq!(probe.shape_name(), "slot-lookup");
        match probe {
            Domain::SlotLookup(slot) => {
                assert_eq!(slot.get_sign_extended_constant(), Some(NO_MATCH_SENTINEL));
            }
            Domain::UpperBound(_) => panic!("no_match must be a slot lookup"),
        }
    }

    #[test]
    fn test_descriptor_accessors() {
        let context = Context::create();
        let i64_ty = context.i64_type();
        let descriptor = LoopDescriptor::new(
            JoinLoopKind::UpperBound,
            JoinSemantics::Inner,
            "i0",
            move |_, _| Ok(Domain::UpperBound(i64_ty.const_int(3, false))),
        );

        assert_eq!(descriptor.kind(), JoinLoopKind::UpperBound);
        assert_eq!(descriptor.semantics(), JoinSemantics::Inner);
        assert_eq!(descriptor.name(), "i0");
        assert!(descriptor.probe_fail_hook().is_none());

        let debug = format!("{:?}", descriptor);
        assert!(debug.contains("UpperBound"));
        assert!(debug.contains("i0"));
    }
}
