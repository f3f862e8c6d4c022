//! Recursive loop-nest emission.
//!
//! [`LoopNestGenerator`] consumes an ordered list of [`LoopDescriptor`]s,
//! outermost first, and emits one fused nest of basic blocks into the
//! function under construction: an `UpperBound` level becomes a counted loop
//! (preheader, head with the induction-variable phi, body, increment), a
//! `Singleton` level becomes a single probe with a match test. A level that
//! finds no match branches straight to the advance point of its enclosing
//! loop, so everything nested inside it is skipped for that tuple. The
//! caller's body generator is invoked exactly once, at the innermost level,
//! with the full iterator tuple.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::values::{FunctionValue, IntValue};
use inkwell::IntPredicate;

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::session::GenerationSession;
use crate::nest::descriptor::{
    Domain, IteratorTuple, JoinLoopKind, JoinSemantics, LoopDescriptor, NO_MATCH_SENTINEL,
};

/// Basic blocks emitted for one join level.
#[derive(Debug, Clone, Copy)]
pub struct LevelBlocks<'arena, 'ctx> {
    /// Descriptor name the blocks are labeled with.
    pub name: &'arena str,
    pub kind: JoinLoopKind,
    pub semantics: JoinSemantics,
    /// The block enclosing control branches into.
    pub entry: BasicBlock<'ctx>,
    /// Bounds test (`UpperBound`) or probe (`Singleton`).
    pub head: BasicBlock<'ctx>,
    pub body: BasicBlock<'ctx>,
    /// Induction-variable step; `UpperBound` levels only.
    pub increment: Option<BasicBlock<'ctx>>,
}

/// Result of one generation pass: the nest's entry block plus the per-level
/// block layout, allocated in the session arena.
#[derive(Debug, Clone, Copy)]
pub struct NestLayout<'arena, 'ctx> {
    /// Entry of the outermost level; the caller branches into this.
    pub entry: BasicBlock<'ctx>,
    /// One record per level, outermost first.
    pub levels: &'arena [LevelBlocks<'arena, 'ctx>],
}

/// Emits a fused loop nest for an ordered list of join levels.
///
/// One generator works on one function within one module; generation is
/// synchronous and performs no I/O.
pub struct LoopNestGenerator<'g, 'ctx, 'arena> {
    context: &'ctx Context,
    builder: &'g Builder<'ctx>,
    function: FunctionValue<'ctx>,
    session: &'g mut GenerationSession<'arena>,
}

impl<'g, 'ctx, 'arena> LoopNestGenerator<'g, 'ctx, 'arena> {
    /// Create a generator emitting into `function`.
    pub fn new(
        context: &'ctx Context,
        builder: &'g Builder<'ctx>,
        function: FunctionValue<'ctx>,
        session: &'g mut GenerationSession<'arena>,
    ) -> Self {
        Self {
            context,
            builder,
            function,
            session,
        }
    }

    /// Emit the nest and return its entry block plus per-level layout.
    ///
    /// `body_gen` is invoked once with the full iterator tuple; it must
    /// return an unterminated block, which the generator branches into after
    /// the innermost match and terminates with a branch to the innermost
    /// advance point. A `Singleton` level that finds no match branches to the
    /// enclosing level's advance point; at the outermost level it branches to
    /// `failure_target`, or to `exit_block` when no failure target is given.
    /// `UpperBound` exhaustion is normal completion and always advances the
    /// enclosing level.
    pub fn generate<F>(
        &mut self,
        descriptors: &[LoopDescriptor<'ctx>],
        body_gen: &mut F,
        failure_target: Option<BasicBlock<'ctx>>,
        exit_block: BasicBlock<'ctx>,
    ) -> CodegenResult<NestLayout<'arena, 'ctx>>
    where
        F: FnMut(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<BasicBlock<'ctx>>,
    {
        if descriptors.is_empty() {
            return Err(CodegenError::EmptyLoopNest);
        }
        log::debug!(
            "generating {}-level loop nest in `{}`",
            descriptors.len(),
            self.function.get_name().to_string_lossy()
        );

        let mut tuple = IteratorTuple::new();
        let mut levels = Vec::with_capacity(descriptors.len());
        let outer_no_match = failure_target.unwrap_or(exit_block);
        let entry = self.generate_level(
            descriptors,
            0,
            &mut tuple,
            body_gen,
            exit_block,
            outer_no_match,
            &mut levels,
        )?;
        self.session.record_nest(descriptors.len());
        let levels = self.session.alloc_slice(&levels);
        Ok(NestLayout { entry, levels })
    }

    /// Emit one level and everything nested inside it. Returns the level's
    /// entry block.
    ///
    /// `advance_target` is where control continues once this level is done
    /// with the current enclosing tuple; `no_match_target` is where a failed
    /// probe sends control. They coincide for every nested level and differ
    /// only at the outermost one, where the caller may supply a dedicated
    /// failure target.
    #[allow(clippy::too_many_arguments)]
    fn generate_level<F>(
        &mut self,
        descriptors: &[LoopDescriptor<'ctx>],
        level: usize,
        tuple: &mut IteratorTuple<'ctx>,
        body_gen: &mut F,
        advance_target: BasicBlock<'ctx>,
        no_match_target: BasicBlock<'ctx>,
        levels: &mut Vec<LevelBlocks<'arena, 'ctx>>,
    ) -> CodegenResult<BasicBlock<'ctx>>
    where
        F: FnMut(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<BasicBlock<'ctx>>,
    {
        let descriptor = &descriptors[level];
        debug_assert_eq!(tuple.depth(), level);
        log::trace!(
            "level {}: `{}` {:?} {:?}",
            level,
            descriptor.name(),
            descriptor.kind(),
            descriptor.semantics()
        );
        self.session.record_level(descriptor.kind());

        match descriptor.kind() {
            JoinLoopKind::UpperBound => self.generate_upper_bound_level(
                descriptors,
                level,
                tuple,
                body_gen,
                advance_target,
                levels,
            ),
            JoinLoopKind::Singleton => self.generate_singleton_level(
                descriptors,
                level,
                tuple,
                body_gen,
                advance_target,
                no_match_target,
                levels,
            ),
        }
    }

    fn generate_upper_bound_level<F>(
        &mut self,
        descriptors: &[LoopDescriptor<'ctx>],
        level: usize,
        tuple: &mut IteratorTuple<'ctx>,
        body_gen: &mut F,
        advance_target: BasicBlock<'ctx>,
        levels: &mut Vec<LevelBlocks<'arena, 'ctx>>,
    ) -> CodegenResult<BasicBlock<'ctx>>
    where
        F: FnMut(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<BasicBlock<'ctx>>,
    {
        let descriptor = &descriptors[level];
        let name = descriptor.name();
        let i64_ty = self.context.i64_type();

        let preheader = self.append_block(&format!("{name}_preheader"));
        let head = self.append_block(&format!("{name}_head"));
        let body = self.append_block(&format!("{name}_body"));
        let increment = self.append_block(&format!("{name}_inc"));

        // Preheader: evaluate the domain once per enclosing tuple.
        self.builder.position_at_end(preheader);
        let bound = match descriptor.evaluate_domain(tuple, self.builder)? {
            Domain::UpperBound(bound) => bound,
            other => {
                return Err(CodegenError::DomainShapeMismatch {
                    name: name.to_owned(),
                    kind: descriptor.kind(),
                    returned: other.shape_name(),
                })
            }
        };
        let no_match_block = match descriptor.semantics() {
            JoinSemantics::LeftOuter => {
                let no_match = self.append_block(&format!("{name}_nomatch"));
                let is_empty = self.builder.build_int_compare(
                    IntPredicate::EQ,
                    bound,
                    i64_ty.const_zero(),
                    &format!("{name}_empty"),
                )?;
                self.builder
                    .build_conditional_branch(is_empty, no_match, head)?;
                Some(no_match)
            }
            JoinSemantics::Inner => {
                self.builder.build_unconditional_branch(head)?;
                None
            }
        };

        // Head: induction-variable merge point and bounds test. Exhaustion is
        // normal completion, so it advances the enclosing level.
        self.builder.position_at_end(head);
        let counter_phi = self.builder.build_phi(i64_ty, &format!("{name}_counter"))?;
        counter_phi.add_incoming(&[(&i64_ty.const_zero(), preheader)]);
        let counter = counter_phi.as_basic_value().into_int_value();
        let in_range = self.builder.build_int_compare(
            IntPredicate::SLT,
            counter,
            bound,
            &format!("{name}_in_range"),
        )?;
        self.builder
            .build_conditional_branch(in_range, body, advance_target)?;

        // LeftOuter with a zero bound runs the body once with the sentinel
        // iterator value instead of skipping the tuple.
        let iter_value = if let Some(no_match) = no_match_block {
            self.builder.position_at_end(no_match);
            if let Some(hook) = descriptor.probe_fail_hook() {
                hook(tuple, self.builder)?;
            }
            self.builder.build_unconditional_branch(body)?;

            self.builder.position_at_end(body);
            let merged = self.builder.build_phi(i64_ty, &format!("{name}_iter"))?;
            merged.add_incoming(&[(&counter, head), (&self.no_match_value(), no_match)]);
            merged.as_basic_value().into_int_value()
        } else {
            counter
        };

        // The sentinel row must not re-enter the loop, so a LeftOuter level
        // drains its inner control flow through a guard that leaves on the
        // sentinel value.
        let advance_here = match descriptor.semantics() {
            JoinSemantics::LeftOuter => {
                let after = self.append_block(&format!("{name}_after"));
                self.builder.position_at_end(after);
                let matched = self.builder.build_int_compare(
                    IntPredicate::SGE,
                    iter_value,
                    i64_ty.const_zero(),
                    &format!("{name}_matched"),
                )?;
                self.builder
                    .build_conditional_branch(matched, increment, advance_target)?;
                after
            }
            JoinSemantics::Inner => increment,
        };

        levels.push(LevelBlocks {
            name: self.session.alloc_str(name),
            kind: descriptor.kind(),
            semantics: descriptor.semantics(),
            entry: preheader,
            head,
            body,
            increment: Some(increment),
        });

        tuple.push(iter_value);
        self.wire_body(descriptors, level, tuple, body_gen, body, advance_here, levels)?;
        tuple.pop();

        // Increment: step the induction variable and loop back to the test.
        self.builder.position_at_end(increment);
        let next = self.builder.build_int_add(
            iter_value,
            i64_ty.const_int(1, false),
            &format!("{name}_next"),
        )?;
        counter_phi.add_incoming(&[(&next, increment)]);
        self.builder.build_unconditional_branch(head)?;

        Ok(preheader)
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_singleton_level<F>(
        &mut self,
        descriptors: &[LoopDescriptor<'ctx>],
        level: usize,
        tuple: &mut IteratorTuple<'ctx>,
        body_gen: &mut F,
        advance_target: BasicBlock<'ctx>,
        no_match_target: BasicBlock<'ctx>,
        levels: &mut Vec<LevelBlocks<'arena, 'ctx>>,
    ) -> CodegenResult<BasicBlock<'ctx>>
    where
        F: FnMut(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<BasicBlock<'ctx>>,
    {
        let descriptor = &descriptors[level];
        let name = descriptor.name();
        let i64_ty = self.context.i64_type();

        let head = self.append_block(&format!("{name}_probe"));
        let body = self.append_block(&format!("{name}_body"));

        // Probe: evaluate the slot once per enclosing tuple.
        self.builder.position_at_end(head);
        let slot = match descriptor.evaluate_domain(tuple, self.builder)? {
            Domain::SlotLookup(slot) => slot,
            other => {
                return Err(CodegenError::DomainShapeMismatch {
                    name: name.to_owned(),
                    kind: descriptor.kind(),
                    returned: other.shape_name(),
                })
            }
        };

        match descriptor.semantics() {
            JoinSemantics::Inner => {
                let matched = self.builder.build_int_compare(
                    IntPredicate::SGE,
                    slot,
                    i64_ty.const_zero(),
                    &format!("{name}_matched"),
                )?;
                if let Some(hook) = descriptor.probe_fail_hook() {
                    let no_match = self.append_block(&format!("{name}_nomatch"));
                    self.builder
                        .build_conditional_branch(matched, body, no_match)?;
                    self.builder.position_at_end(no_match);
                    hook(tuple, self.builder)?;
                    self.builder.build_unconditional_branch(no_match_target)?;
                } else {
                    self.builder
                        .build_conditional_branch(matched, body, no_match_target)?;
                }
            }
            JoinSemantics::LeftOuter => {
                // The sentinel slot rides into the body unchanged and becomes
                // the NULL-extended iterator value.
                if let Some(hook) = descriptor.probe_fail_hook() {
                    let matched = self.builder.build_int_compare(
                        IntPredicate::SGE,
                        slot,
                        i64_ty.const_zero(),
                        &format!("{name}_matched"),
                    )?;
                    let no_match = self.append_block(&format!("{name}_nomatch"));
                    self.builder
                        .build_conditional_branch(matched, body, no_match)?;
                    self.builder.position_at_end(no_match);
                    hook(tuple, self.builder)?;
                    self.builder.build_unconditional_branch(body)?;
                } else {
                    self.builder.build_unconditional_branch(body)?;
                }
            }
        }

        levels.push(LevelBlocks {
            name: self.session.alloc_str(name),
            kind: descriptor.kind(),
            semantics: descriptor.semantics(),
            entry: head,
            head,
            body,
            increment: None,
        });

        // A singleton runs its body once, then advances the enclosing loop.
        tuple.push(slot);
        self.wire_body(
            descriptors,
            level,
            tuple,
            body_gen,
            body,
            advance_target,
            levels,
        )?;
        tuple.pop();

        Ok(head)
    }

    /// Terminate `body`: descend into the next level, or invoke the caller's
    /// body generator at the innermost one.
    #[allow(clippy::too_many_arguments)]
    fn wire_body<F>(
        &mut self,
        descriptors: &[LoopDescriptor<'ctx>],
        level: usize,
        tuple: &mut IteratorTuple<'ctx>,
        body_gen: &mut F,
        body: BasicBlock<'ctx>,
        advance_here: BasicBlock<'ctx>,
        levels: &mut Vec<LevelBlocks<'arena, 'ctx>>,
    ) -> CodegenResult<()>
    where
        F: FnMut(&IteratorTuple<'ctx>, &Builder<'ctx>) -> CodegenResult<BasicBlock<'ctx>>,
    {
        if level + 1 == descriptors.len() {
            let body_block = body_gen(tuple, self.builder)?;
            self.builder.position_at_end(body);
            self.builder.build_unconditional_branch(body_block)?;
            self.builder.position_at_end(body_block);
            self.builder.build_unconditional_branch(advance_here)?;
        } else {
            let inner_entry = self.generate_level(
                descriptors,
                level + 1,
                tuple,
                body_gen,
                advance_here,
                advance_here,
                levels,
            )?;
            self.builder.position_at_end(body);
            self.builder.build_unconditional_branch(inner_entry)?;
        }
        Ok(())
    }

    fn append_block(&mut self, name: &str) -> BasicBlock<'ctx> {
        self.session.record_block();
        self.context.append_basic_block(self.function, name)
    }

    fn no_match_value(&self) -> IntValue<'ctx> {
        self.context
            .i64_type()
            .const_int(NO_MATCH_SENTINEL as u64, true)
    }
}
