//! Compiled programs: render functions, legacy channel expressions,
//! guard conditions, and rule actions.

use lumo_core::{Frame, Rgb};

use crate::ast::{Expr, Stmt};
use crate::env::{Env, HostHooks};
use crate::error::{ExprError, ExprResult};
use crate::eval::{eval_expr, exec_block, Flow};
use crate::parser::{parse_expr, parse_program};
use crate::value::Value;

/// What the engine should do after a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderNext {
    /// Render again after this many milliseconds.
    After(u64),
    /// Static output, no further renders.
    Static,
    /// The state finished; fire `state_complete`.
    Complete,
}

/// One frame of render output plus its scheduling directive.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub frame: Frame,
    pub next: RenderNext,
}

// =============================================================================
// Code-mode render programs
// =============================================================================

/// A compiled `render(prev, t)` body.
///
/// The body sees `prev` (the previous frame's primary color) and `t`
/// (seconds since state entry) plus the builtin table. Its return value
/// follows one of three conventions:
///
/// - `return color, ms` — render `color`, call again after `ms`
/// - `return color` — static output (same as `return color, null`)
/// - `return {primary: c, pixels: [...], next: ms}` — multi-channel frame
///
/// `ms == 0` signals state completion; `null` means static.
#[derive(Debug, Clone)]
pub struct RenderProgram {
    body: Vec<Stmt>,
}

impl RenderProgram {
    /// Compile a render body from source.
    pub fn compile(code: &str) -> ExprResult<Self> {
        Ok(Self {
            body: parse_program(code)?,
        })
    }

    /// Run one frame.
    pub fn render(&self, prev: Rgb, t: f64, hooks: &dyn HostHooks) -> ExprResult<FrameOutput> {
        let mut env = Env::new(hooks);
        env.define("prev", Value::Color(prev));
        env.define("t", Value::Num(t));

        match exec_block(&self.body, &mut env)? {
            Flow::Return(value, next) => interpret_return(prev, value, next),
            // Fell off the end without returning: hold the previous color.
            Flow::Normal => Ok(FrameOutput {
                frame: Frame::solid(prev),
                next: RenderNext::Static,
            }),
        }
    }
}

fn interpret_return(
    prev: Rgb,
    value: Value,
    next: Option<Value>,
) -> ExprResult<FrameOutput> {
    // Map convention: {primary, pixels/secondary, next}.
    if let Value::Map(entries) = &value {
        let primary = match entries.get("primary") {
            Some(v) => v.as_color()?,
            None => prev,
        };
        let pixels = match entries.get("pixels").or_else(|| entries.get("secondary")) {
            Some(Value::List(items)) => Some(
                items
                    .iter()
                    .map(Value::as_color)
                    .collect::<ExprResult<Vec<_>>>()?,
            ),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(ExprError::BadRenderResult {
                    message: format!("pixels must be a list, got {}", other.type_name()),
                })
            }
        };
        // An explicit second return value overrides the map's `next` key.
        let next_value = next.or_else(|| entries.get("next").cloned());
        return Ok(FrameOutput {
            frame: Frame { primary, pixels },
            next: interpret_next(next_value)?,
        });
    }

    // List of colors: primary is the first entry, rest are pixels.
    if let Value::List(items) = &value {
        let all_colors = !items.is_empty() && items.iter().all(|v| v.as_color().is_ok());
        let is_plain_rgb = items.len() == 3 && items.iter().all(|v| matches!(v, Value::Num(_)));
        if all_colors && !is_plain_rgb {
            let colors: Vec<Rgb> = items
                .iter()
                .map(Value::as_color)
                .collect::<ExprResult<_>>()?;
            return Ok(FrameOutput {
                frame: Frame {
                    primary: colors[0],
                    pixels: Some(colors),
                },
                next: interpret_next(next)?,
            });
        }
    }

    Ok(FrameOutput {
        frame: Frame::solid(value.as_color()?),
        next: interpret_next(next)?,
    })
}

fn interpret_next(next: Option<Value>) -> ExprResult<RenderNext> {
    match next {
        None | Some(Value::Null) => Ok(RenderNext::Static),
        Some(value) => {
            let ms = value.as_num()?;
            if ms <= 0.0 {
                Ok(RenderNext::Complete)
            } else {
                Ok(RenderNext::After(ms.round() as u64))
            }
        }
    }
}

// =============================================================================
// Legacy channel-expression programs
// =============================================================================

/// A compiled legacy `(r, g, b, speed)` state.
///
/// Each channel is a scalar expression of `t`; `speed` is the re-render
/// period in milliseconds, or `None` for a static color.
#[derive(Debug, Clone)]
pub struct LegacyProgram {
    r: Expr,
    g: Expr,
    b: Expr,
    speed: Option<f64>,
}

impl LegacyProgram {
    /// Compile three channel expressions.
    pub fn compile(r: &str, g: &str, b: &str, speed: Option<f64>) -> ExprResult<Self> {
        Ok(Self {
            r: parse_expr(r)?,
            g: parse_expr(g)?,
            b: parse_expr(b)?,
            speed,
        })
    }

    /// Run one frame.
    pub fn render(&self, prev: Rgb, t: f64, hooks: &dyn HostHooks) -> ExprResult<FrameOutput> {
        let mut env = Env::new(hooks);
        env.define("prev", Value::Color(prev));
        env.define("t", Value::Num(t));

        let r = eval_expr(&self.r, &mut env)?.as_num()?;
        let g = eval_expr(&self.g, &mut env)?.as_num()?;
        let b = eval_expr(&self.b, &mut env)?.as_num()?;

        let next = match self.speed {
            Some(ms) if ms > 0.0 => RenderNext::After(ms.round() as u64),
            _ => RenderNext::Static,
        };

        Ok(FrameOutput {
            frame: Frame::solid(Rgb::from_f64(r, g, b)),
            next,
        })
    }
}

// =============================================================================
// Guards and actions
// =============================================================================

/// A compiled guard condition: one expression evaluated for truthiness.
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr,
    source: String,
}

impl Condition {
    pub fn compile(source: &str) -> ExprResult<Self> {
        Ok(Self {
            expr: parse_expr(source)?,
            source: source.to_string(),
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, hooks: &dyn HostHooks) -> ExprResult<bool> {
        let mut env = Env::new(hooks);
        Ok(eval_expr(&self.expr, &mut env)?.truthy())
    }
}

/// A compiled rule action: a statement list run for its side effects.
#[derive(Debug, Clone)]
pub struct ActionProgram {
    body: Vec<Stmt>,
}

impl ActionProgram {
    pub fn compile(source: &str) -> ExprResult<Self> {
        Ok(Self {
            body: parse_program(source)?,
        })
    }

    pub fn run(&self, hooks: &dyn HostHooks) -> ExprResult<()> {
        let mut env = Env::new(hooks);
        exec_block(&self.body, &mut env)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{NoHooks, StoreHooks};
    use lumo_core::DataStore;
    use serde_json::json;

    #[test]
    fn test_static_color() {
        let program = RenderProgram::compile("return rgb(255, 0, 0)").unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(255, 0, 0));
        assert_eq!(out.next, RenderNext::Static);
    }

    #[test]
    fn test_animated_next_ms() {
        let program = RenderProgram::compile("return hsv(t * 60, 1, 1), 33").unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &NoHooks).unwrap();
        assert_eq!(out.next, RenderNext::After(33));
    }

    #[test]
    fn test_zero_next_means_complete() {
        let program = RenderProgram::compile("return prev, 0").unwrap();
        let out = program.render(Rgb(5, 5, 5), 1.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(5, 5, 5));
        assert_eq!(out.next, RenderNext::Complete);
    }

    #[test]
    fn test_prev_seed_flows_through() {
        let program = RenderProgram::compile("return prev").unwrap();
        let out = program.render(Rgb(200, 0, 0), 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(200, 0, 0));
    }

    #[test]
    fn test_multi_channel_map() {
        let program = RenderProgram::compile(
            "return {primary: rgb(1,1,1), pixels: [rgb(2,2,2), rgb(3,3,3)], next: 50}",
        )
        .unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(1, 1, 1));
        assert_eq!(
            out.frame.pixels,
            Some(vec![Rgb(2, 2, 2), Rgb(3, 3, 3)])
        );
        assert_eq!(out.next, RenderNext::After(50));
    }

    #[test]
    fn test_plain_rgb_list_is_one_color() {
        let program = RenderProgram::compile("return [255, 0, 0], 20").unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(255, 0, 0));
        assert_eq!(out.frame.pixels, None);
    }

    #[test]
    fn test_no_return_holds_prev() {
        let program = RenderProgram::compile("let unused = 1").unwrap();
        let out = program.render(Rgb(7, 7, 7), 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(7, 7, 7));
        assert_eq!(out.next, RenderNext::Static);
    }

    #[test]
    fn test_render_reads_data_store() {
        let data = DataStore::new();
        data.set("vision", json!({"person": true}));
        let hooks = StoreHooks::new(data);
        let program = RenderProgram::compile(
            "let seen = getData(\"vision\", {})[\"person\"]\nreturn seen ? rgb(0,255,0) : rgb(255,0,0)",
        )
        .unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &hooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(0, 255, 0));
    }

    #[test]
    fn test_legacy_static() {
        let program = LegacyProgram::compile("255", "128", "0", None).unwrap();
        let out = program.render(Rgb::BLACK, 0.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(255, 128, 0));
        assert_eq!(out.next, RenderNext::Static);
    }

    #[test]
    fn test_legacy_animated() {
        let program =
            LegacyProgram::compile("clamp(t * 100, 0, 255)", "0", "0", Some(40.0)).unwrap();
        let out = program.render(Rgb::BLACK, 1.0, &NoHooks).unwrap();
        assert_eq!(out.frame.primary, Rgb(100, 0, 0));
        assert_eq!(out.next, RenderNext::After(40));
    }

    #[test]
    fn test_condition_truthiness() {
        let data = DataStore::new();
        data.set("volume", json!(0.8));
        let hooks = StoreHooks::with_clock(data);
        let cond = Condition::compile("getData(\"volume\", 0) > 0.5").unwrap();
        assert!(cond.eval(&hooks).unwrap());
    }

    #[test]
    fn test_action_side_effects() {
        let data = DataStore::new();
        let hooks = StoreHooks::with_clock(data.clone());
        let action = ActionProgram::compile("setData(\"count\", getData(\"count\", 0) + 1)").unwrap();
        action.run(&hooks).unwrap();
        action.run(&hooks).unwrap();
        assert_eq!(data.get("count"), Some(json!(2.0)));
    }

    #[test]
    fn test_compile_error_surfaces() {
        assert!(RenderProgram::compile("return ][").is_err());
        assert!(Condition::compile("1 +").is_err());
    }
}
