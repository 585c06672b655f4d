//! Sandboxed expression and render-function language for Lumo states.
//!
//! Agent-authored lamp behaviors run inside a small interpreted language
//! rather than the host language: a lexer, a recursive-descent parser, and
//! an AST walker over a whitelisted builtin table. The language has no
//! loops, no user-defined functions, no imports, and no reachable I/O
//! beyond two host bindings (`getData`/`setData` against the shared store,
//! plus `getTime` where the caller exposes it), so every evaluation
//! terminates and a bad program can at worst produce a wrong color.
//!
//! ## Entry points
//!
//! - [`RenderProgram`]: a `render(prev, t)` body producing a frame and a
//!   scheduling directive ([`RenderNext`])
//! - [`LegacyProgram`]: the older `(r, g, b, speed)` channel-expression form
//! - [`Condition`] / [`ActionProgram`]: rule guards and effects
//!
//! ## Example
//!
//! ```
//! use lumo_expr::{NoHooks, RenderNext, RenderProgram};
//! use lumo_core::Rgb;
//!
//! let program = RenderProgram::compile(
//!     "let pulse = (sin(t * tau) + 1) / 2\n\
//!      return lerp_color(rgb(0,0,40), rgb(0,0,255), pulse), 33",
//! ).unwrap();
//!
//! let out = program.render(Rgb::BLACK, 0.25, &NoHooks).unwrap();
//! assert_eq!(out.next, RenderNext::After(33));
//! ```

mod ast;
mod env;
mod error;
mod eval;
mod parser;
mod program;
mod token;
mod value;

pub use ast::{BinOp, Expr, Stmt, UnOp};
pub use env::{Env, HostHooks, NoHooks, StoreHooks};
pub use error::{ExprError, ExprResult};
pub use eval::{eval_expr, exec_block, Flow};
pub use parser::{parse_expr, parse_program, MAX_DEPTH};
pub use program::{ActionProgram, Condition, FrameOutput, LegacyProgram, RenderNext, RenderProgram};
pub use value::Value;
