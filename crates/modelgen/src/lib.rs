//! ModelGen: an embeddable scripting language whose programs emit vertex
//! tuples that compose into 3D meshes.
//!
//! The pipeline: source text is [tokenized](tokenize()) into a flat token
//! stream, [parsed](parse()) into a reference-counted AST, and evaluated
//! by a tree-walking interpreter owned by an [`Instance`]. The instance
//! holds the module registry, the base library, the call-stack frames and
//! the emitted vertex buffer; exporters turn the buffer into OBJ text or
//! packed triangles.
//!
//! ```
//! use modelgen::{CollectStringPrint, Instance};
//!
//! let mut instance = Instance::with_print(Box::new(CollectStringPrint::new()));
//! instance.run_source("print(1 + 2 * 3)", "<example>").unwrap();
//! assert_eq!(instance.collected_output(), "7\n");
//! ```
//!
//! All failures are fatal to the running program: every entry point
//! returns [`Error`] carrying the kind, position and captured traceback,
//! and the embedder decides the process exit.

mod args;
mod ast;
mod error;
mod export;
mod frame;
mod heap;
mod inspect;
mod instance;
mod interpret;
mod io;
mod modules;
mod parse;
mod tokenize;
mod types;
mod value;

pub use crate::ast::{BinOp, Node, NodeKind, UnaryOp};
pub use crate::error::{CodeLoc, Error, ErrorKind, RunResult, StackFrame};
pub use crate::export::{export_obj, export_triangles};
pub use crate::frame::FrameState;
pub use crate::heap::HeapStats;
pub use crate::inspect::{dump_instance, dump_node, dump_tokens};
pub use crate::instance::{Instance, VertexLayout};
pub use crate::io::{CollectStringPrint, PrintWriter, StdPrint};
pub use crate::parse::parse;
pub use crate::tokenize::{tokenize, Payload, Pos, Token, TokenKind};
pub use crate::types::module::ModuleSource;
pub use crate::value::Type;
