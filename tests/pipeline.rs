//! Native compilation pipeline tests: verification, artifact ownership,
//! and error reporting.

use std::cell::Cell;

use bumpalo::Bump;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use nestjit::{
    Domain, GenerationSession, IteratorTuple, JoinLoopKind, JoinSemantics, LoopDescriptor,
    LoopNestGenerator, NativePipeline, PipelineError,
};

thread_local! {
    static TICKS: Cell<u64> = Cell::new(0);
}

extern "C" fn tick(amount: i64) {
    TICKS.with(|t| t.set(t.get() + amount as u64));
}

/// Build `void loop_test_func()` scanning `[0, bound)` and calling
/// `tick(step)` once per iteration.
fn build_ticking_nest<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    bound: u64,
    step: i64,
) -> FunctionValue<'ctx> {
    let i64_ty = context.i64_type();
    let tick_ty = context.void_type().fn_type(&[i64_ty.into()], false);
    let tick_fn = module.add_function("tick", tick_ty, None);

    let fn_type = context.void_type().fn_type(&[], false);
    let function = module.add_function("loop_test_func", fn_type, None);
    let entry = context.append_basic_block(function, "entry");
    let exit = context.append_basic_block(function, "exit");
    let builder = context.create_builder();
    builder.position_at_end(exit);
    builder.build_return(None).unwrap();

    let descriptors = vec![LoopDescriptor::new(
        JoinLoopKind::UpperBound,
        JoinSemantics::Inner,
        "i0",
        move |_: &IteratorTuple, _: &Builder| {
            Ok(Domain::UpperBound(i64_ty.const_int(bound, false)))
        },
    )];

    let arena = Bump::new();
    let mut session = GenerationSession::new(&arena);
    let mut generator = LoopNestGenerator::new(context, &builder, function, &mut session);
    let layout = generator
        .generate(
            &descriptors,
            &mut |_: &IteratorTuple, b: &Builder| {
                let body = context.append_basic_block(function, "loop_body");
                b.position_at_end(body);
                b.build_call(tick_fn, &[i64_ty.const_int(step as u64, true).into()], "")?;
                Ok(body)
            },
            None,
            exit,
        )
        .unwrap();
    builder.position_at_end(entry);
    builder.build_unconditional_branch(layout.entry).unwrap();
    function
}

#[test]
fn verification_is_idempotent() {
    let context = Context::create();
    let module = context.create_module("pipeline_test");
    build_ticking_nest(&context, &module, 3, 1);

    let pipeline = NativePipeline::new();
    pipeline.verify(&module).unwrap();
    pipeline.verify(&module).unwrap();

    let tick_fn = module.get_function("tick").unwrap();
    let compiled = pipeline
        .compile_with_symbols(&module, "loop_test_func", &[(tick_fn, tick as usize)])
        .unwrap();
    // Compilation does not invalidate the module's well-formedness.
    pipeline.verify(&module).unwrap();
    drop(compiled);
}

#[test]
fn verification_reports_malformed_function() {
    let context = Context::create();
    let module = context.create_module("pipeline_test");
    let fn_type = context.void_type().fn_type(&[], false);
    let function = module.add_function("broken", fn_type, None);
    // Unterminated block: structurally malformed.
    context.append_basic_block(function, "entry");

    let pipeline = NativePipeline::new();
    match pipeline.verify(&module) {
        Err(PipelineError::Verify(diag)) => assert!(!diag.is_empty()),
        other => panic!("expected verification failure, got {other:?}"),
    }
}

#[test]
fn missing_entry_point_is_reported() {
    let context = Context::create();
    let module = context.create_module("pipeline_test");
    build_ticking_nest(&context, &module, 1, 1);

    let result = NativePipeline::new().compile(&module, "no_such_function");
    match result {
        Err(PipelineError::FunctionLookup(name)) => assert_eq!(name, "no_such_function"),
        Ok(_) => panic!("lookup of a missing entry point must fail"),
        Err(other) => panic!("expected function lookup failure, got {other:?}"),
    }
}

#[test]
fn artifact_owns_code_for_repeated_invocation() {
    let context = Context::create();
    let module = context.create_module("pipeline_test");
    build_ticking_nest(&context, &module, 5, 1);

    let tick_fn = module.get_function("tick").unwrap();
    let compiled = NativePipeline::new()
        .compile_with_symbols(&module, "loop_test_func", &[(tick_fn, tick as usize)])
        .unwrap();

    let address = compiled.entry_address();
    TICKS.with(|t| t.set(0));
    compiled.invoke();
    compiled.invoke();
    assert_eq!(TICKS.with(|t| t.get()), 10);
    // The entry address is stable for the artifact's lifetime.
    assert_eq!(compiled.entry_address(), address);
}

#[test]
fn independent_modules_compile_independently() {
    let context = Context::create();

    let first_module = context.create_module("pipeline_first");
    build_ticking_nest(&context, &first_module, 2, 1);
    let second_module = context.create_module("pipeline_second");
    build_ticking_nest(&context, &second_module, 3, 100);

    let pipeline = NativePipeline::new();
    let first = pipeline
        .compile_with_symbols(
            &first_module,
            "loop_test_func",
            &[(first_module.get_function("tick").unwrap(), tick as usize)],
        )
        .unwrap();
    let second = pipeline
        .compile_with_symbols(
            &second_module,
            "loop_test_func",
            &[(second_module.get_function("tick").unwrap(), tick as usize)],
        )
        .unwrap();

    TICKS.with(|t| t.set(0));
    first.invoke();
    second.invoke();
    first.invoke();
    assert_eq!(TICKS.with(|t| t.get()), 2 + 300 + 2);
}
