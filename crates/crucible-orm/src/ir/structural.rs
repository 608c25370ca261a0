//! Structural identity of intermediate trees.
//!
//! A tree's identity is a blake3 digest over a canonical encoding:
//! names are case-folded, strings are length-prefixed, ordered children are
//! encoded in place and unordered children (update assignments) are encoded
//! as the sorted multiset of their own digests. Equality and hashing of
//! [`Expr`] both go through the digest, so they can never disagree.

use super::{Expr, Insert, QueryParameter};
use crate::types::{MemberRef, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Digest of a tree's canonical structure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructuralHash(pub [u8; 32]);

impl StructuralHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex, used in logs
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for StructuralHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Debug for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuralHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

struct Canonical {
    hasher: blake3::Hasher,
}

impl Canonical {
    fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    fn tag(&mut self, tag: &str) {
        self.raw(tag.as_bytes());
    }

    /// Case-insensitive name
    fn name(&mut self, name: &str) {
        self.raw(name.to_lowercase().as_bytes());
    }

    fn count(&mut self, n: usize) {
        self.hasher.update(&(n as u64).to_le_bytes());
    }

    fn ty(&mut self, ty: &TypeRef) {
        self.name(&ty.name());
    }

    fn member(&mut self, member: &MemberRef) {
        self.name(&member.owner);
        self.name(&member.name);
        self.ty(&member.ty);
    }

    fn placeholder(&mut self, param: &QueryParameter) {
        self.tag("QueryParameter");
        self.name(&param.name);
        self.ty(&param.ty);
    }

    fn insert(&mut self, insert: &Insert) {
        self.tag("Insert");
        self.ty(&insert.target);
        self.tag(insert.behavior.as_str());
        self.count(insert.columns.len());
        for column in &insert.columns {
            self.name(column);
        }
        self.count(insert.rows.len());
        for row in &insert.rows {
            self.count(row.placeholders.len());
            for param in &row.placeholders {
                self.placeholder(param);
            }
        }
    }

    fn children<'a>(&mut self, children: impl ExactSizeIterator<Item = &'a Expr>) {
        self.count(children.len());
        for child in children {
            self.expr(child);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        self.tag(expr.kind().as_str());
        match expr {
            Expr::Constant(c) => {
                self.ty(&c.ty);
                self.raw(c.value.to_string().as_bytes());
            }
            Expr::QueryParameter(p) => {
                self.name(&p.name);
                self.ty(&p.ty);
            }
            Expr::Parameter(p) => {
                self.name(&p.name);
                self.ty(&p.ty);
            }
            Expr::QuerySource(s) => self.ty(&s.entity),
            Expr::Special(s) => {
                self.raw(s.text.as_bytes());
                self.ty(&s.ty);
            }
            Expr::SimpleBinding(b) => {
                self.member(&b.member);
                self.expr(&b.source);
            }
            Expr::NamedBinding(b) => {
                self.name(&b.name);
                self.expr(&b.binding);
            }
            Expr::ColumnChain(c) => {
                self.count(c.members.len());
                for member in &c.members {
                    self.member(member);
                }
                self.expr(&c.source);
            }
            Expr::Binary(b) => {
                self.tag(b.op.symbol());
                self.ty(&b.ty);
                self.expr(&b.left);
                self.expr(&b.right);
            }
            Expr::Unary(u) => {
                self.tag(u.op.as_str());
                self.ty(&u.ty);
                self.expr(&u.operand);
            }
            Expr::Conditional(c) => {
                self.ty(&c.ty);
                self.expr(&c.test);
                self.expr(&c.if_true);
                self.expr(&c.if_false);
            }
            Expr::MethodCall(m) => {
                self.name(&m.name);
                self.ty(&m.ty);
                match &m.receiver {
                    Some(receiver) => {
                        self.count(1);
                        self.expr(receiver);
                    }
                    None => self.count(0),
                }
                self.children(m.args.iter());
            }
            Expr::New(n) => {
                self.ty(&n.ty);
                self.children(n.members.iter());
            }
            Expr::InList(i) => {
                self.expr(&i.value);
                self.expr(&i.list);
            }
            Expr::Projection(p) => {
                self.ty(&p.row);
                self.count(p.flags.to_class as usize);
                self.count(p.flags.anonymous as usize);
                self.count(p.flags.distinct as usize);
                self.expr(&p.source);
                self.children(p.bindings.iter());
            }
            Expr::Filter(f) => {
                self.expr(&f.source);
                self.expr(&f.predicate);
            }
            Expr::Join(j) => {
                self.tag(match j.kind {
                    super::JoinKind::Inner => "inner",
                    super::JoinKind::Left => "left",
                });
                self.ty(&j.row);
                self.expr(&j.left);
                self.expr(&j.right);
                self.expr(&j.on);
            }
            Expr::NamedSource(n) => {
                self.name(&n.alias.name);
                self.ty(&n.alias.ty);
                self.expr(&n.source);
            }
            Expr::GroupBy(g) => {
                self.ty(&g.row);
                self.expr(&g.source);
                self.expr(&g.keys);
                match &g.values {
                    Some(values) => {
                        self.count(1);
                        self.expr(values);
                    }
                    None => self.count(0),
                }
            }
            Expr::OrderBy(o) => {
                self.expr(&o.source);
                self.count(o.bindings.len());
                for binding in &o.bindings {
                    self.tag(binding.direction.as_str());
                    self.expr(&binding.expr);
                }
            }
            Expr::OrderByBinding(b) => {
                self.tag(b.direction.as_str());
                self.expr(&b.expr);
            }
            Expr::RowsFetchLimit(l) => {
                self.count(l.fetch as usize);
                self.expr(&l.source);
            }
            Expr::Insert(i) => self.insert(i),
            Expr::Values(v) => {
                self.count(v.placeholders.len());
                for param in &v.placeholders {
                    self.placeholder(param);
                }
            }
            Expr::Set(s) => {
                self.expr(&s.target);
                // Assignment order carries no meaning
                let mut digests: Vec<StructuralHash> =
                    s.assignments.iter().map(Expr::structural_hash).collect();
                digests.sort();
                self.count(digests.len());
                for digest in &digests {
                    self.hasher.update(digest.as_bytes());
                }
            }
            Expr::Delete(d) => self.ty(&d.target),
            Expr::Batch(b) => {
                self.count(b.inserts.len());
                for insert in &b.inserts {
                    self.insert(insert);
                }
            }
            Expr::Parentheses(p) => self.expr(&p.child),
            Expr::Rename(r) => {
                self.name(&r.name);
                self.expr(&r.child);
            }
            Expr::JsonAttribute(j) => {
                self.name(&j.attribute);
                self.ty(&j.ty);
                self.expr(&j.child);
            }
        }
    }

    fn finish(self) -> StructuralHash {
        self.hasher.finalize().into()
    }
}

impl Expr {
    /// Digest of this tree's canonical structure
    pub fn structural_hash(&self) -> StructuralHash {
        let mut canonical = Canonical::new();
        canonical.expr(self);
        canonical.finish()
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.structural_hash() == other.structural_hash()
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structural_hash().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;
    use crate::types::{BinaryOp, MemberRef, UnaryOp};
    use serde_json::json;

    fn user() -> TypeRef {
        TypeRef::entity("User")
    }

    fn column(source: &str, name: &str) -> Expr {
        Expr::binding(
            Expr::parameter(source, user()),
            MemberRef::new(&user(), name, TypeRef::string()),
        )
    }

    fn assign(name: &str, param: &str) -> Expr {
        Expr::binary(
            BinaryOp::Assign,
            column("a", name),
            Expr::query_parameter(param, TypeRef::string()),
        )
    }

    /// One node of `kind` whose content depends on `seed`
    fn sample(kind: NodeKind, seed: u8) -> Expr {
        let leaf = || Expr::constant(json!(seed), TypeRef::int());
        let row = Parameter::new("a", user());
        let placeholder = QueryParameter::new(format!("p{seed}"), TypeRef::int());
        let insert = Insert {
            target: user(),
            behavior: ConflictBehavior::Fail,
            columns: vec!["Age".to_string()],
            rows: vec![Values {
                placeholders: vec![placeholder.clone()],
            }],
        };
        match kind {
            NodeKind::Constant => leaf(),
            NodeKind::QueryParameter => Expr::QueryParameter(placeholder),
            NodeKind::Parameter => Expr::parameter(format!("r{seed}"), user()),
            NodeKind::QuerySource => Expr::source(TypeRef::entity(format!("T{seed}"))),
            NodeKind::Special => Expr::special(format!("S{seed}"), TypeRef::int()),
            NodeKind::SimpleBinding => column("a", &format!("C{seed}")),
            NodeKind::NamedBinding => Expr::named("Out", leaf()),
            NodeKind::ColumnChain => Expr::ColumnChain(ColumnChain {
                source: Box::new(row.to_expr()),
                members: vec![
                    MemberRef::new(&user(), "Address", TypeRef::entity("Address")),
                    MemberRef::new(&TypeRef::entity("Address"), format!("C{seed}"), TypeRef::string()),
                ],
            }),
            NodeKind::Binary => Expr::binary(BinaryOp::Add, leaf(), leaf()),
            NodeKind::Unary => Expr::Unary(Unary {
                op: UnaryOp::Negate,
                operand: Box::new(leaf()),
                ty: TypeRef::int(),
            }),
            NodeKind::Conditional => Expr::Conditional(Conditional {
                test: Box::new(Expr::constant(json!(true), TypeRef::bool())),
                if_true: Box::new(leaf()),
                if_false: Box::new(Expr::constant(json!(-1), TypeRef::int())),
                ty: TypeRef::int(),
            }),
            NodeKind::MethodCall => Expr::MethodCall(MethodCall {
                name: "abs".to_string(),
                receiver: None,
                args: vec![leaf()],
                ty: TypeRef::int(),
            }),
            NodeKind::New => Expr::New(New {
                ty: TypeRef::anonymous("<>f__0"),
                members: vec![Expr::named("Out", leaf())],
            }),
            NodeKind::InList => Expr::InList(InList {
                value: Box::new(leaf()),
                list: Box::new(Expr::query_parameter("ages", TypeRef::int())),
            }),
            NodeKind::Projection => Expr::Projection(Projection {
                source: Box::new(Expr::named_source(Expr::source(user()), row)),
                bindings: vec![leaf()],
                row: TypeRef::int(),
                flags: ProjectionFlags::default(),
            }),
            NodeKind::Filter => Expr::Filter(Filter {
                source: Box::new(Expr::named_source(Expr::source(user()), row)),
                predicate: Box::new(Expr::binary(BinaryOp::GreaterThan, leaf(), leaf())),
            }),
            NodeKind::Join => Expr::Join(Join {
                kind: JoinKind::Inner,
                left: Box::new(Expr::named_source(Expr::source(user()), row)),
                right: Box::new(Expr::named_source(
                    Expr::source(TypeRef::entity("Order")),
                    Parameter::new("b", TypeRef::entity("Order")),
                )),
                on: Box::new(Expr::binary(BinaryOp::Equal, leaf(), leaf())),
                row: TypeRef::anonymous("<>f__1"),
            }),
            NodeKind::NamedSource => Expr::named_source(
                Expr::source(user()),
                Parameter::new(format!("r{seed}"), user()),
            ),
            NodeKind::GroupBy => Expr::GroupBy(GroupBy {
                source: Box::new(Expr::named_source(Expr::source(user()), row.clone())),
                keys: Box::new(leaf()),
                values: None,
                element_row: Some(row),
                row: TypeRef::entity("Grouping"),
            }),
            NodeKind::OrderBy => Expr::OrderBy(OrderBy {
                source: Box::new(Expr::named_source(Expr::source(user()), row)),
                bindings: vec![OrderByBinding {
                    expr: Box::new(leaf()),
                    direction: Direction::Ascending,
                }],
            }),
            NodeKind::OrderByBinding => Expr::OrderByBinding(OrderByBinding {
                expr: Box::new(leaf()),
                direction: Direction::Descending,
            }),
            NodeKind::RowsFetchLimit => Expr::RowsFetchLimit(RowsFetchLimit {
                source: Box::new(Expr::source(user())),
                fetch: u64::from(seed),
            }),
            NodeKind::Insert => Expr::Insert(insert),
            NodeKind::Values => Expr::Values(Values {
                placeholders: vec![placeholder],
            }),
            NodeKind::Set => Expr::Set(Set {
                target: Box::new(Expr::named_source(Expr::source(user()), row)),
                assignments: vec![assign("Name", &format!("p{seed}"))],
            }),
            NodeKind::Delete => Expr::Delete(Delete {
                target: TypeRef::entity(format!("T{seed}")),
            }),
            NodeKind::Batch => Expr::Batch(Batch {
                inserts: vec![insert],
            }),
            NodeKind::Parentheses => Expr::parenthesize(leaf()),
            NodeKind::Rename => Expr::rename(leaf(), "Out"),
            NodeKind::JsonAttribute => Expr::JsonAttribute(JsonAttribute {
                child: Box::new(leaf()),
                attribute: "Color".to_string(),
                ty: TypeRef::string(),
            }),
        }
    }

    fn any_node() -> impl proptest::strategy::Strategy<Value = (usize, u8)> {
        (0..NodeKind::ALL.len(), 0u8..4)
    }

    #[test]
    fn test_samples_cover_every_kind() {
        for kind in NodeKind::ALL {
            assert_eq!(sample(kind, 0).kind(), kind);
        }
    }

    #[test]
    fn test_names_compare_case_insensitively() {
        assert_eq!(column("a", "Name"), column("A", "NAME"));
        assert_ne!(column("a", "Name"), column("a", "Email"));
    }

    #[test]
    fn test_argument_order_is_significant() {
        let forward = Expr::binary(BinaryOp::Subtract, column("a", "X"), column("a", "Y"));
        let backward = Expr::binary(BinaryOp::Subtract, column("a", "Y"), column("a", "X"));
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_assignment_order_is_ignored() {
        let target = Expr::named_source(Expr::source(user()), Parameter::new("a", user()));
        let set = |assignments| {
            Expr::Set(Set {
                target: Box::new(target.clone()),
                assignments,
            })
        };
        let one = set(vec![assign("Name", "p0"), assign("Email", "p1")]);
        let two = set(vec![assign("Email", "p1"), assign("Name", "p0")]);
        assert_eq!(one, two);
        assert_eq!(one.structural_hash(), two.structural_hash());
    }

    #[test]
    fn test_literal_values_take_part_in_identity() {
        let one = Expr::constant(json!(1), TypeRef::int());
        let two = Expr::constant(json!(2), TypeRef::int());
        assert_ne!(one, two);
    }

    #[test]
    fn test_query_parameters_compare_by_name_and_type() {
        let a = Expr::query_parameter("p0", TypeRef::int());
        let b = Expr::query_parameter("P0", TypeRef::int());
        let c = Expr::query_parameter("p0", TypeRef::long());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_is_short_hex() {
        let hash = column("a", "Name").structural_hash();
        assert_eq!(hash.to_string().len(), 16);
        assert_eq!(hash.to_hex().len(), 64);
    }

    proptest::proptest! {
        #[test]
        fn prop_case_changes_keep_identity(name in "[A-Za-z]{1,12}", upper in proptest::bool::ANY) {
            let respelled = if upper {
                name.to_ascii_uppercase()
            } else {
                name.to_ascii_lowercase()
            };
            let original = column("a", &name);
            let other = column("a", &respelled);
            proptest::prop_assert_eq!(original.structural_hash(), other.structural_hash());
            proptest::prop_assert_eq!(original, other);
        }

        #[test]
        fn prop_equality_agrees_with_digest(left in any_node(), right in any_node()) {
            let a = sample(NodeKind::ALL[left.0], left.1);
            let b = sample(NodeKind::ALL[right.0], right.1);
            proptest::prop_assert_eq!(a == b, a.structural_hash() == b.structural_hash());
            // Distinct nodes never share a digest
            proptest::prop_assert_eq!(a == b, left == right);
        }

        #[test]
        fn prop_distinct_columns_differ(left in "[a-z]{1,8}", right in "[a-z]{1,8}") {
            proptest::prop_assume!(left != right);
            proptest::prop_assert_ne!(column("a", &left), column("a", &right));
        }
    }
}
