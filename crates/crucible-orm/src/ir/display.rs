//! One-line outline rendering of intermediate trees.
//!
//! The outline is a diagnostic notation, not SQL. It is what log lines,
//! test assertions and the outline renderer show.

use super::{Expr, Insert, JoinKind, Values};
use crate::types::{BinaryOp, UnaryOp};
use serde_json::Value;
use std::fmt;

fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.placeholders.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "@{}", param.name)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Insert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("insert")?;
        if self.behavior != super::ConflictBehavior::Fail {
            write!(f, "[{}]", self.behavior.as_str())?;
        }
        write!(f, " {}(", self.target)?;
        list(f, &self.columns)?;
        f.write_str(") values ")?;
        list(f, &self.rows)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(c) => match &c.value {
                Value::String(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
            Expr::QueryParameter(p) => write!(f, "@{}", p.name),
            Expr::Parameter(p) => f.write_str(&p.name),
            Expr::QuerySource(s) => write!(f, "table({})", s.entity),
            Expr::Special(s) => write!(f, "special({})", s.text),
            Expr::SimpleBinding(b) => write!(f, "{}.{}", b.source, b.member.name),
            Expr::NamedBinding(b) => write!(f, "({} as {})", b.binding, b.name),
            Expr::ColumnChain(c) => {
                write!(f, "{}", c.source)?;
                for member in &c.members {
                    write!(f, ".{}", member.name)?;
                }
                Ok(())
            }
            Expr::Binary(b) => write!(f, "({} {} {})", b.left, b.op.symbol(), b.right),
            Expr::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "not({})", u.operand),
                UnaryOp::Negate => write!(f, "-({})", u.operand),
                UnaryOp::Convert => write!(f, "convert({}, {})", u.operand, u.ty),
            },
            Expr::Conditional(c) => {
                write!(f, "case({}, {}, {})", c.test, c.if_true, c.if_false)
            }
            Expr::MethodCall(m) => {
                write!(f, "{}(", m.name)?;
                if let Some(receiver) = &m.receiver {
                    write!(f, "{receiver}")?;
                    if !m.args.is_empty() {
                        f.write_str(", ")?;
                    }
                }
                list(f, &m.args)?;
                f.write_str(")")
            }
            Expr::New(n) => {
                write!(f, "new {}(", n.ty)?;
                list(f, &n.members)?;
                f.write_str(")")
            }
            Expr::InList(i) => write!(f, "({} in {})", i.value, i.list),
            Expr::Projection(p) => {
                f.write_str("project")?;
                let flags: Vec<&str> = [
                    (p.flags.to_class, "class"),
                    (p.flags.distinct, "distinct"),
                ]
                .into_iter()
                .filter_map(|(set, name)| set.then_some(name))
                .collect();
                if !flags.is_empty() {
                    write!(f, "[{}]", flags.join(","))?;
                }
                write!(f, "({}", p.source)?;
                if !p.bindings.is_empty() {
                    f.write_str("; ")?;
                    list(f, &p.bindings)?;
                }
                f.write_str(")")
            }
            Expr::Filter(x) => write!(f, "filter({}, {})", x.source, x.predicate),
            Expr::Join(j) => {
                let name = match j.kind {
                    JoinKind::Inner => "join",
                    JoinKind::Left => "left_join",
                };
                write!(f, "{name}({}, {}, {})", j.left, j.right, j.on)
            }
            Expr::NamedSource(n) => write!(f, "named({}, {})", n.source, n.alias.name),
            Expr::GroupBy(g) => {
                write!(f, "group({}, {}", g.source, g.keys)?;
                if let Some(values) = &g.values {
                    write!(f, ", {values}")?;
                }
                f.write_str(")")
            }
            Expr::OrderBy(o) => {
                write!(f, "order({}; ", o.source)?;
                for (i, binding) in o.bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", binding.expr, binding.direction.as_str())?;
                }
                f.write_str(")")
            }
            Expr::OrderByBinding(b) => write!(f, "{} {}", b.expr, b.direction.as_str()),
            Expr::RowsFetchLimit(l) => write!(f, "limit({}, {})", l.source, l.fetch),
            Expr::Insert(i) => write!(f, "{i}"),
            Expr::Values(v) => write!(f, "{v}"),
            Expr::Set(s) => {
                write!(f, "update({}; ", s.target)?;
                for (i, assignment) in s.assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match assignment {
                        Expr::Binary(b) if b.op == BinaryOp::Assign => {
                            write!(f, "{} := {}", b.left, b.right)?
                        }
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str(")")
            }
            Expr::Delete(d) => write!(f, "delete({})", d.target),
            Expr::Batch(b) => {
                f.write_str("batch[")?;
                for (i, insert) in b.inserts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{insert}")?;
                }
                f.write_str("]")
            }
            Expr::Parentheses(p) => write!(f, "({})", p.child),
            Expr::Rename(r) => write!(f, "rename({}, {})", r.child, r.name),
            Expr::JsonAttribute(j) => write!(f, "json({}, {})", j.child, j.attribute),
        }
    }
}
