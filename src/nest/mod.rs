//! Loop-nest code generation.
//!
//! The descriptor types describe one join level each ([`descriptor`]); the
//! generator lowers an ordered list of them into one fused nest of basic
//! blocks ([`generator`]).

pub mod descriptor;
pub mod generator;

pub use descriptor::{
    Domain, DomainProvider, IteratorTuple, JoinLoopKind, JoinSemantics, LoopDescriptor,
    ProbeFailHook, NO_MATCH_SENTINEL,
};
pub use generator::{LevelBlocks, LoopNestGenerator, NestLayout};
