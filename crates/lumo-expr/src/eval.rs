//! AST evaluator with the whitelisted builtin table.

use std::collections::BTreeMap;

use lumo_core::Rgb;
use rand::Rng;

use crate::ast::{BinOp, Expr, Stmt, UnOp};
use crate::env::Env;
use crate::error::{ExprError, ExprResult};
use crate::value::Value;

/// Control flow out of a statement list.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// `return value` / `return value, next` was executed.
    Return(Value, Option<Value>),
}

/// Execute a statement list until it returns or runs out of statements.
pub fn exec_block(stmts: &[Stmt], env: &mut Env<'_>) -> ExprResult<Flow> {
    for stmt in stmts {
        match stmt {
            Stmt::Let(name, expr) | Stmt::Assign(name, expr) => {
                let value = eval_expr(expr, env)?;
                env.define(name.clone(), value);
            }
            Stmt::If(cond, then_branch, else_branch) => {
                let flow = if eval_expr(cond, env)?.truthy() {
                    exec_block(then_branch, env)?
                } else if let Some(else_branch) = else_branch {
                    exec_block(else_branch, env)?
                } else {
                    Flow::Normal
                };
                if let Flow::Return(..) = flow {
                    return Ok(flow);
                }
            }
            Stmt::Return(value, next) => {
                let value = eval_expr(value, env)?;
                let next = next.as_ref().map(|e| eval_expr(e, env)).transpose()?;
                return Ok(Flow::Return(value, next));
            }
            Stmt::Expr(expr) => {
                eval_expr(expr, env)?;
            }
        }
    }
    Ok(Flow::Normal)
}

/// Evaluate a single expression.
pub fn eval_expr(expr: &Expr, env: &mut Env<'_>) -> ExprResult<Value> {
    match expr {
        Expr::Num(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => lookup(name, env),
        Expr::Unary(op, inner) => {
            let value = eval_expr(inner, env)?;
            match op {
                UnOp::Neg => Ok(Value::Num(-value.as_num()?)),
                UnOp::Not => Ok(Value::Bool(!value.truthy())),
            }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, env),
        Expr::Ternary(cond, then, other) => {
            if eval_expr(cond, env)?.truthy() {
                eval_expr(then, env)
            } else {
                eval_expr(other, env)
            }
        }
        Expr::Call(name, args) => {
            let args: Vec<Value> = args
                .iter()
                .map(|a| eval_expr(a, env))
                .collect::<ExprResult<_>>()?;
            call_builtin(name, args, env)
        }
        Expr::Index(target, index) => {
            let target = eval_expr(target, env)?;
            let index = eval_expr(index, env)?;
            eval_index(&target, &index)
        }
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|e| eval_expr(e, env))
                .collect::<ExprResult<_>>()?,
        )),
        Expr::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, expr) in entries {
                map.insert(key.clone(), eval_expr(expr, env)?);
            }
            Ok(Value::Map(map))
        }
    }
}

fn lookup(name: &str, env: &Env<'_>) -> ExprResult<Value> {
    if let Some(value) = env.get(name) {
        return Ok(value.clone());
    }
    match name {
        "pi" => Ok(Value::Num(std::f64::consts::PI)),
        "tau" => Ok(Value::Num(std::f64::consts::TAU)),
        _ => Err(ExprError::UndefinedVariable {
            name: name.to_string(),
        }),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, env: &mut Env<'_>) -> ExprResult<Value> {
    // Short-circuit forms first.
    match op {
        BinOp::And => {
            let l = eval_expr(lhs, env)?;
            if !l.truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval_expr(rhs, env)?.truthy()));
        }
        BinOp::Or => {
            let l = eval_expr(lhs, env)?;
            if l.truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval_expr(rhs, env)?.truthy()));
        }
        _ => {}
    }

    let l = eval_expr(lhs, env)?;
    let r = eval_expr(rhs, env)?;

    match op {
        BinOp::Add => match (&l, &r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", l.display(), r.display())))
            }
            _ => Ok(Value::Num(l.as_num()? + r.as_num()?)),
        },
        BinOp::Sub => Ok(Value::Num(l.as_num()? - r.as_num()?)),
        BinOp::Mul => Ok(Value::Num(l.as_num()? * r.as_num()?)),
        BinOp::Div => Ok(Value::Num(l.as_num()? / r.as_num()?)),
        BinOp::Rem => Ok(Value::Num(l.as_num()? % r.as_num()?)),
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::NotEq => Ok(Value::Bool(l != r)),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let ordering = match (&l, &r) {
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => l
                    .as_num()?
                    .partial_cmp(&r.as_num()?)
                    .ok_or_else(|| ExprError::type_err("cannot compare NaN"))?,
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::LtEq => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn eval_index(target: &Value, index: &Value) -> ExprResult<Value> {
    match target {
        Value::List(items) => {
            let i = index.as_num()?.floor();
            if i < 0.0 || i >= items.len() as f64 {
                Ok(Value::Null)
            } else {
                Ok(items[i as usize].clone())
            }
        }
        Value::Color(c) => {
            let channels = [c.r(), c.g(), c.b()];
            let i = index.as_num()?.floor();
            if (0.0..3.0).contains(&i) {
                Ok(Value::Num(channels[i as usize] as f64))
            } else {
                Ok(Value::Null)
            }
        }
        Value::Map(entries) => Ok(entries.get(index.as_str()?).cloned().unwrap_or(Value::Null)),
        other => Err(ExprError::type_err(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

// =============================================================================
// Builtin function table
// =============================================================================

fn arity(name: &str, expected: &str, args: &[Value], ok: bool) -> ExprResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ExprError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got: args.len(),
        })
    }
}

fn call_builtin(name: &str, args: Vec<Value>, env: &mut Env<'_>) -> ExprResult<Value> {
    match name {
        // Single-argument math.
        "sin" | "cos" | "tan" | "abs" | "floor" | "ceil" | "round" | "sqrt" | "exp" => {
            arity(name, "1", &args, args.len() == 1)?;
            let x = args[0].as_num()?;
            let y = match name {
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "abs" => x.abs(),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                "round" => x.round(),
                "sqrt" => x.sqrt(),
                _ => x.exp(),
            };
            Ok(Value::Num(y))
        }
        "log" => {
            arity(name, "1 or 2", &args, (1..=2).contains(&args.len()))?;
            let x = args[0].as_num()?;
            if args.len() == 2 {
                Ok(Value::Num(x.log(args[1].as_num()?)))
            } else {
                Ok(Value::Num(x.ln()))
            }
        }
        "pow" => {
            arity(name, "2", &args, args.len() == 2)?;
            Ok(Value::Num(args[0].as_num()?.powf(args[1].as_num()?)))
        }
        "min" | "max" => {
            arity(name, "at least 2", &args, args.len() >= 2)?;
            let mut acc = args[0].as_num()?;
            for arg in &args[1..] {
                let x = arg.as_num()?;
                acc = if name == "min" { acc.min(x) } else { acc.max(x) };
            }
            Ok(Value::Num(acc))
        }

        // Range helpers.
        "clamp" => {
            arity(name, "3", &args, args.len() == 3)?;
            let (x, lo, hi) = (args[0].as_num()?, args[1].as_num()?, args[2].as_num()?);
            Ok(Value::Num(x.clamp(lo.min(hi), hi.max(lo))))
        }
        "lerp" => {
            arity(name, "3", &args, args.len() == 3)?;
            let (a, b, t) = (args[0].as_num()?, args[1].as_num()?, args[2].as_num()?);
            Ok(Value::Num(a + (b - a) * t))
        }
        "map_range" => {
            arity(name, "5", &args, args.len() == 5)?;
            let x = args[0].as_num()?;
            let (in_lo, in_hi) = (args[1].as_num()?, args[2].as_num()?);
            let (out_lo, out_hi) = (args[3].as_num()?, args[4].as_num()?);
            let t = if in_hi == in_lo {
                0.0
            } else {
                (x - in_lo) / (in_hi - in_lo)
            };
            Ok(Value::Num(out_lo + (out_hi - out_lo) * t))
        }

        // Easing (cubic), input clamped to 0..=1.
        "ease_in" | "ease_out" | "ease_in_out" => {
            arity(name, "1", &args, args.len() == 1)?;
            let t = args[0].as_num()?.clamp(0.0, 1.0);
            let y = match name {
                "ease_in" => t * t * t,
                "ease_out" => 1.0 - (1.0 - t).powi(3),
                _ => {
                    if t < 0.5 {
                        4.0 * t * t * t
                    } else {
                        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                    }
                }
            };
            Ok(Value::Num(y))
        }

        // Color constructors.
        "rgb" => {
            arity(name, "3", &args, args.len() == 3)?;
            Ok(Value::Color(Rgb::from_f64(
                args[0].as_num()?,
                args[1].as_num()?,
                args[2].as_num()?,
            )))
        }
        "hsv" => {
            arity(name, "3", &args, args.len() == 3)?;
            Ok(Value::Color(Rgb::from_hsv(
                args[0].as_num()?,
                args[1].as_num()?,
                args[2].as_num()?,
            )))
        }
        "lerp_color" => {
            arity(name, "3", &args, args.len() == 3)?;
            let a = args[0].as_color()?;
            let b = args[1].as_color()?;
            Ok(Value::Color(a.lerp(b, args[2].as_num()?)))
        }
        "red" | "green" | "blue" => {
            arity(name, "1", &args, args.len() == 1)?;
            let c = args[0].as_color()?;
            let channel = match name {
                "red" => c.r(),
                "green" => c.g(),
                _ => c.b(),
            };
            Ok(Value::Num(channel as f64))
        }

        // Randomness.
        "random" => {
            arity(name, "0", &args, args.is_empty())?;
            Ok(Value::Num(rand::rng().random_range(0.0..1.0)))
        }
        "randint" => {
            arity(name, "2", &args, args.len() == 2)?;
            let lo = args[0].as_num()?.floor() as i64;
            let hi = args[1].as_num()?.floor() as i64;
            let (lo, hi) = (lo.min(hi), lo.max(hi));
            Ok(Value::Num(rand::rng().random_range(lo..=hi) as f64))
        }

        // Collections.
        "len" => {
            arity(name, "1", &args, args.len() == 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(ExprError::type_err(format!(
                        "len() expects string, list, or map, got {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Num(n as f64))
        }

        // Host bindings.
        "getData" => {
            arity(name, "1 or 2", &args, (1..=2).contains(&args.len()))?;
            let key = args[0].as_str()?;
            match env.hooks().get_data(key) {
                Some(json) => Ok(Value::from_json(&json)),
                None => Ok(args.get(1).cloned().unwrap_or(Value::Null)),
            }
        }
        "setData" => {
            arity(name, "2", &args, args.len() == 2)?;
            let key = args[0].as_str()?.to_string();
            env.hooks().set_data(&key, args[1].to_json());
            Ok(Value::Null)
        }
        "getTime" => {
            arity(name, "0", &args, args.is_empty())?;
            let clock = env.hooks().clock().ok_or(ExprError::Unavailable {
                name: "getTime".to_string(),
            })?;
            let mut map = BTreeMap::new();
            map.insert("hour".to_string(), Value::Num(clock.hour as f64));
            map.insert("minute".to_string(), Value::Num(clock.minute as f64));
            map.insert("second".to_string(), Value::Num(clock.second as f64));
            map.insert("weekday".to_string(), Value::Num(clock.weekday as f64));
            Ok(Value::Map(map))
        }

        _ => Err(ExprError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}
