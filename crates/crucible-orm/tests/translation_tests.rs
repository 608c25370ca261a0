//! End-to-end translation tests
//!
//! Host trees are built with the fluent `Query` API and the resulting
//! intermediate trees are compared through their outline rendering.

use crucible_orm::host::{HostExpr, HostParam, Lambda, Query, ENUMERABLE};
use crucible_orm::recognize::{MemberRecognizer, Recognition, RecognizerRegistry};
use crucible_orm::types::{MemberKey, MemberRef, TypeRef};
use crucible_orm::{
    MemoryCache, NodeKind, OutlineRenderer, QueryRenderer, TranslateError, Translator,
    TranslatorConfig,
};
use serde_json::json;
use std::sync::Arc;
use test_case::test_case;

// ============================================================================
// Fixtures
// ============================================================================

fn user() -> TypeRef {
    TypeRef::entity("User")
}

fn order() -> TypeRef {
    TypeRef::entity("Order")
}

fn customer() -> TypeRef {
    TypeRef::entity("Customer")
}

fn shape() -> TypeRef {
    TypeRef::anonymous("<>f__AnonymousType0")
}

fn int(v: i64) -> HostExpr {
    HostExpr::constant(json!(v), TypeRef::int())
}

fn text(v: &str) -> HostExpr {
    HostExpr::constant(json!(v), TypeRef::string())
}

fn age(param: &HostParam) -> HostExpr {
    param.expr().field("Age", TypeRef::int())
}

fn name(param: &HostParam) -> HostExpr {
    param.expr().field("Name", TypeRef::string())
}

fn older_than(years: i64) -> Lambda {
    let u = HostParam::new("u", user());
    u.lambda(age(&u).greater_than(int(years)))
}

fn outline(host: &HostExpr) -> String {
    Translator::default()
        .translate(host)
        .unwrap()
        .root
        .to_string()
}

fn outline_with(config: TranslatorConfig, host: &HostExpr) -> String {
    Translator::new(config)
        .unwrap()
        .translate(host)
        .unwrap()
        .root
        .to_string()
}

fn unsupported(host: &HostExpr) -> String {
    match Translator::default().translate(host) {
        Err(TranslateError::UnsupportedShape { signature }) => signature,
        other => panic!("expected an unsupported shape, got {other:?}"),
    }
}

fn count(group: &HostParam) -> HostExpr {
    HostExpr::call(ENUMERABLE, "Count", None, vec![group.expr()], TypeRef::int())
}

fn aggregate(function: &str, group: &HostParam, selector: Option<Lambda>) -> HostExpr {
    let mut args = vec![group.expr()];
    args.extend(selector.map(HostExpr::Lambda));
    HostExpr::call(ENUMERABLE, function, None, args, TypeRef::int())
}

// ============================================================================
// Filtering and projection
// ============================================================================

#[test]
fn test_chained_filters_collapse_into_one() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(older_than(18))
        .filter(u.lambda(name(&u).not_equals(HostExpr::null(TypeRef::string()))))
        .into_expr();

    let translation = Translator::default().translate(&host).unwrap();
    assert_eq!(
        translation.root.to_string(),
        "filter(named(project(table(User)), a), ((a.Age > @p0) and (a.Name != null)))"
    );
    assert_eq!(translation.parameters.names(), vec!["p0"]);
}

#[test]
fn test_or_clause_is_parenthesized_when_combined() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(age(&u).less_than(int(13)).or(age(&u).greater_than(int(65)))))
        .filter(u.lambda(name(&u).not_equals(HostExpr::null(TypeRef::string()))))
        .into_expr();

    assert_eq!(
        outline(&host),
        "filter(named(project(table(User)), a), ((((a.Age < @p0) or (a.Age > @p1))) and (a.Name != null)))"
    );
}

#[test]
fn test_filter_after_projection_uses_output_binding() {
    let u = HostParam::new("u", user());
    let r = HostParam::new("r", shape());
    let host = Query::all(user())
        .select(u.lambda(HostExpr::new_object(
            shape(),
            vec![("A", u.expr().field("Foo", TypeRef::string()))],
        )))
        .filter(r.lambda(
            r.expr()
                .field("A", TypeRef::string())
                .not_equals(HostExpr::null(TypeRef::string())),
        ))
        .into_expr();

    let translation = Translator::default().translate(&host).unwrap();
    assert_eq!(
        translation.root.to_string(),
        "filter(named(project(named(table(User), a); (a.Foo as A)), b), (b.A != null))"
    );

    let crucible_orm::Expr::Filter(filter) = &translation.root else {
        panic!("expected a filter root");
    };
    let crucible_orm::Expr::Binary(predicate) = filter.predicate.as_ref() else {
        panic!("expected a comparison");
    };
    assert_eq!(predicate.left.output_name(), Some("A"));
}

#[test]
fn test_projection_of_a_filtered_source_shares_the_row() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(older_than(18))
        .select(u.lambda(HostExpr::new_object(
            shape(),
            vec![("Name", name(&u)), ("Years", age(&u))],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(filter(named(project(table(User)), a), (a.Age > @p0)); a.Name, (a.Age as Years))"
    );
}

#[test]
fn test_class_projection_is_flagged() {
    let u = HostParam::new("u", user());
    let summary = TypeRef::class("UserSummary");
    let host = Query::all(user())
        .select(u.lambda(HostExpr::new_object(summary, vec![("Name", name(&u))])))
        .into_expr();

    assert_eq!(outline(&host), "project[class](named(table(User), a); a.Name)");
}

#[test]
fn test_identity_projection_selects_everything() {
    let u = HostParam::new("u", user());
    let host = Query::all(user()).select(u.lambda(u.expr())).into_expr();

    assert_eq!(outline(&host), "project(table(User))");
}

#[test]
fn test_distinct_marks_the_projection() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .select(u.lambda(name(&u)))
        .distinct()
        .into_expr();

    assert_eq!(outline(&host), "project[distinct](named(table(User), a); a.Name)");
}

#[test]
fn test_distinct_over_a_table() {
    let host = Query::all(user()).distinct().into_expr();
    assert_eq!(outline(&host), "project[distinct](table(User))");
}

#[test]
fn test_conditional_and_negation() {
    let u = HostParam::new("u", user());
    let active = u.expr().field("Active", TypeRef::bool());
    let host = Query::all(user())
        .select(u.lambda(HostExpr::new_object(
            shape(),
            vec![(
                "Label",
                HostExpr::conditional(active.logical_not(), text("inactive"), name(&u)),
            )],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(named(table(User), a); (case(not(a.Active), @p0, a.Name) as Label))"
    );
}

// ============================================================================
// Ordering and limits
// ============================================================================

#[test]
fn test_then_by_extends_the_ordering() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .order_by(u.lambda(name(&u)))
        .then_by_descending(u.lambda(age(&u)))
        .into_expr();

    assert_eq!(outline(&host), "order(named(project(table(User)), a); a.Name asc, a.Age desc)");
}

#[test]
fn test_then_by_without_ordering_is_unsupported() {
    let u = HostParam::new("u", user());
    let host = Query::all(user()).then_by(u.lambda(name(&u))).into_expr();

    assert_eq!(unsupported(&host), "Queryable.ThenBy(Sequence<User>, String)");
}

#[test]
fn test_take_limits_the_filtered_rows() {
    let host = Query::all(user()).filter(older_than(18)).take(10).into_expr();

    assert_eq!(
        outline(&host),
        "limit(filter(named(project(table(User)), a), (a.Age > @p0)), 10)"
    );
}

#[test]
fn test_first_with_predicate() {
    let host = Query::all(user())
        .operator("FirstOrDefault", vec![HostExpr::Lambda(older_than(18))], user())
        .into_expr();

    assert_eq!(
        outline(&host),
        "limit(filter(named(project(table(User)), a), (a.Age > @p0)), 1)"
    );
}

#[test]
fn test_ordering_after_projection_is_compacted() {
    let u = HostParam::new("u", user());
    let r = HostParam::new("r", shape());
    let host = Query::all(user())
        .filter(older_than(18))
        .select(u.lambda(HostExpr::new_object(
            shape(),
            vec![("Name", name(&u)), ("Age", age(&u))],
        )))
        .order_by(r.lambda(r.expr().field("Name", TypeRef::string())))
        .take(5)
        .into_expr();

    insta::assert_snapshot!(
        outline(&host),
        @"limit(order(named(project(filter(named(project(table(User)), a), (a.Age > @p0)); a.Name, a.Age), b); b.Name asc), 5)"
    );
}

// ============================================================================
// Joins
// ============================================================================

fn orders_with_customers() -> Query {
    let o = HostParam::new("o", order());
    let c = HostParam::new("c", customer());
    let on = Lambda::new(
        vec![o.clone(), c.clone()],
        o.expr()
            .field("CustomerId", TypeRef::int())
            .equals(c.expr().field("Id", TypeRef::int())),
    );
    Query::all(order()).join(Query::all(customer()), on)
}

#[test]
fn test_join_sides_are_named() {
    assert_eq!(
        outline(&orders_with_customers().into_expr()),
        "join(named(project(table(Order)), a), named(project(table(Customer)), b), (a.CustomerId = b.Id))"
    );
}

#[test]
fn test_projection_over_join_addresses_sides() {
    let query = orders_with_customers();
    let p = HostParam::new("p", query.row().clone());
    let left = p.expr().field("Left", order());
    let right = p.expr().field("Right", customer());
    let host = query
        .select(p.lambda(HostExpr::new_object(
            shape(),
            vec![
                ("Name", right.field("Name", TypeRef::string())),
                ("Total", left.field("Total", TypeRef::double())),
            ],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(join(named(project(table(Order)), a), named(project(table(Customer)), b), (a.CustomerId = b.Id)); b.Name, a.Total)"
    );
}

#[test]
fn test_self_join_binds_sides_positionally() {
    let x = HostParam::new("x", user());
    let y = HostParam::new("y", user());
    let on = Lambda::new(
        vec![x.clone(), y.clone()],
        x.expr()
            .field("ManagerId", TypeRef::int())
            .equals(y.expr().field("Id", TypeRef::int())),
    );
    let host = Query::all(user()).left_join(Query::all(user()), on).into_expr();

    assert_eq!(
        outline(&host),
        "left_join(named(project(table(User)), a), named(project(table(User)), b), (a.ManagerId = b.Id))"
    );
}

// ============================================================================
// Grouping
// ============================================================================

fn by_city() -> Query {
    let u = HostParam::new("u", user());
    Query::all(user()).group_by(u.lambda(u.expr().field("City", TypeRef::string())))
}

#[test]
fn test_group_key_and_count() {
    let query = by_city();
    let g = HostParam::new("g", query.row().clone());
    let host = query
        .select(g.lambda(HostExpr::new_object(
            shape(),
            vec![
                ("City", g.expr().field("Key", TypeRef::string())),
                ("Total", count(&g)),
            ],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(group(named(project(table(User)), a), a.City); a.City, (count() as Total))"
    );
}

#[test]
fn test_aggregate_selector_binds_the_element_row() {
    let query = by_city();
    let g = HostParam::new("g", query.row().clone());
    let x = HostParam::new("x", user());
    let host = query
        .select(g.lambda(HostExpr::new_object(
            shape(),
            vec![("Years", aggregate("Sum", &g, Some(x.lambda(age(&x)))))],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(group(named(project(table(User)), a), a.City); (sum(a.Age) as Years))"
    );
}

#[test]
fn test_element_selector_feeds_aggregates() {
    let u = HostParam::new("u", user());
    let query = Query::all(user()).group_by_with(
        u.lambda(u.expr().field("City", TypeRef::string())),
        u.lambda(age(&u)),
    );
    let g = HostParam::new("g", query.row().clone());
    let host = query
        .select(g.lambda(HostExpr::new_object(
            shape(),
            vec![
                ("Key", g.expr().field("Key", TypeRef::string())),
                ("Oldest", aggregate("Max", &g, None)),
            ],
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        "project(group(named(project(table(User)), a), a.City, a.Age); (a.City as Key), (max(a.Age) as Oldest))"
    );
}

#[test]
fn test_unknown_aggregate_names_its_signature() {
    let query = by_city();
    let g = HostParam::new("g", query.row().clone());
    let x = HostParam::new("x", user());
    let host = query
        .select(g.lambda(HostExpr::new_object(
            shape(),
            vec![("Spread", aggregate("StdDev", &g, Some(x.lambda(age(&x)))))],
        )))
        .into_expr();

    let err = Translator::default().translate(&host).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unsupported query shape: Enumerable.StdDev(Grouping<String, User>, Int)"
    );
}

#[test]
fn test_count_with_predicate_is_unsupported() {
    let query = by_city();
    let g = HostParam::new("g", query.row().clone());
    let x = HostParam::new("x", user());
    let host = query
        .select(g.lambda(HostExpr::new_object(
            shape(),
            vec![("Adults", aggregate("Count", &g, Some(older_than_param(&x))))],
        )))
        .into_expr();

    assert!(matches!(
        Translator::default().translate(&host),
        Err(TranslateError::UnsupportedShape { .. })
    ));
}

fn older_than_param(x: &HostParam) -> Lambda {
    x.lambda(age(x).greater_than(int(18)))
}

// ============================================================================
// Mutations
// ============================================================================

fn new_user(name: &str, years: i64) -> HostExpr {
    HostExpr::new_object(user(), vec![("Name", text(name)), ("Age", int(years))])
}

#[test]
fn test_bulk_insert_is_chunked_into_a_batch() {
    let config = TranslatorConfig {
        max_rows_per_insert: 2,
        ..Default::default()
    };
    let host = Query::all(user())
        .insert(vec![new_user("ann", 30), new_user("bob", 41), new_user("cy", 25)])
        .into_expr();

    let translation = Translator::new(config).unwrap().translate(&host).unwrap();
    assert_eq!(
        translation.root.to_string(),
        "batch[insert User(Name, Age) values (@p0, @p1), (@p2, @p3); insert User(Name, Age) values (@p4, @p5)]"
    );
    assert_eq!(
        translation.bind(&host).unwrap(),
        vec![
            ("p0".to_string(), json!("ann")),
            ("p1".to_string(), json!(30)),
            ("p2".to_string(), json!("bob")),
            ("p3".to_string(), json!(41)),
            ("p4".to_string(), json!("cy")),
            ("p5".to_string(), json!(25)),
        ]
    );
}

#[test_case("Insert", "insert User(Name, Age) values (@p0, @p1)" ; "fail on conflict")]
#[test_case("InsertOrIgnore", "insert[ignore] User(Name, Age) values (@p0, @p1)" ; "ignore")]
#[test_case("InsertOrReplace", "insert[replace] User(Name, Age) values (@p0, @p1)" ; "replace")]
fn test_insert_conflict_behavior(operator: &str, expected: &str) {
    let host = Query::all(user())
        .operator(operator, vec![new_user("ann", 30)], user())
        .into_expr();
    assert_eq!(outline(&host), expected);
}

#[test]
fn test_insert_rows_must_share_columns() {
    let partial = HostExpr::new_object(user(), vec![("Name", text("dee"))]);
    let host = Query::all(user())
        .insert(vec![new_user("ann", 30), partial])
        .into_expr();

    assert!(unsupported(&host).starts_with("Queryable.Insert("));
}

#[test]
fn test_insert_values_must_be_literals() {
    let u = HostParam::new("u", user());
    let row = HostExpr::new_object(user(), vec![("Name", name(&u))]);
    let host = Query::all(user()).insert(vec![row]).into_expr();

    assert!(matches!(
        Translator::default().translate(&host),
        Err(TranslateError::UnsupportedShape { .. })
    ));
}

fn rename_to(value: &str) -> Lambda {
    let u = HostParam::new("u", user());
    u.lambda(HostExpr::new_object(user(), vec![("Name", text(value))]))
}

#[test]
fn test_update_assigns_through_the_target_row() {
    let host = Query::all(user()).update_set(rename_to("anon")).into_expr();
    assert_eq!(outline(&host), "update(named(table(User), a); a.Name := @p0)");
}

#[test]
fn test_update_where_shares_the_row_symbol() {
    let host = Query::all(user())
        .update_where(rename_to("anon"), older_than(65))
        .into_expr();

    let translation = Translator::default().translate(&host).unwrap();
    assert_eq!(
        translation.root.to_string(),
        "filter(update(named(table(User), a); a.Name := @p0), (a.Age > @p1))"
    );
    assert_eq!(
        translation.bind(&host).unwrap(),
        vec![("p0".to_string(), json!("anon")), ("p1".to_string(), json!(65))]
    );
}

#[test]
fn test_delete_and_delete_where() {
    assert_eq!(outline(&Query::all(user()).delete().into_expr()), "delete(User)");
    assert_eq!(
        outline(&Query::all(user()).delete_where(older_than(99)).into_expr()),
        "filter(named(delete(User), a), (a.Age > @p0))"
    );
}

#[test]
fn test_mutation_over_a_filtered_source_is_unsupported() {
    let host = Query::all(user())
        .filter(older_than(18))
        .delete()
        .into_expr();
    assert_eq!(unsupported(&host), "Queryable.Delete(Sequence<User>)");
}

// ============================================================================
// Members and methods
// ============================================================================

#[test]
fn test_recognized_members() {
    let u = HostParam::new("u", user());
    let born = u.expr().field("Born", TypeRef::datetime());
    let now = HostExpr::static_member(&TypeRef::datetime(), "Now", TypeRef::datetime());
    let empty = HostExpr::static_member(&TypeRef::string(), "Empty", TypeRef::string());
    let host = Query::all(user())
        .filter(u.lambda(name(&u).field("Length", TypeRef::int()).greater_than(int(3))))
        .filter(u.lambda(born.clone().less_than(now)))
        .filter(u.lambda(name(&u).not_equals(empty)))
        .filter(u.lambda(born.field("Year", TypeRef::int()).equals(int(1990))))
        .into_expr();

    assert_eq!(
        outline(&host),
        "filter(named(project(table(User)), a), ((((length(a.Name) > @p0) and (a.Born < special(CURRENT_TIMESTAMP))) and (a.Name != '')) and (year(a.Born) = @p1)))"
    );
}

#[test_case("StartsWith", "starts_with")]
#[test_case("EndsWith", "ends_with")]
#[test_case("Contains", "contains")]
fn test_string_predicates(method: &str, function: &str) {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(HostExpr::call(
            "String",
            method,
            Some(name(&u)),
            vec![text("an")],
            TypeRef::bool(),
        )))
        .into_expr();

    assert_eq!(
        outline(&host),
        format!("filter(named(project(table(User)), a), {function}(a.Name, @p0))")
    );
}

#[test]
fn test_static_math_call() {
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(
            HostExpr::call("Math", "Abs", None, vec![age(&u)], TypeRef::int()).greater_than(int(5)),
        ))
        .into_expr();

    assert_eq!(outline(&host), "filter(named(project(table(User)), a), (abs(a.Age) > @p0))");
}

#[test]
fn test_json_member_access() {
    let u = HostParam::new("u", user());
    let meta = u.expr().field("Meta", TypeRef::json());
    let host = Query::all(user())
        .filter(u.lambda(meta.field("Color", TypeRef::string()).equals(text("red"))))
        .into_expr();

    assert_eq!(
        outline(&host),
        "filter(named(project(table(User)), a), (json(a.Meta, Color) = @p0))"
    );
}

#[test]
fn test_contains_produces_in_list() {
    let u = HostParam::new("u", user());
    let ids = HostExpr::constant(json!([1, 2, 3]), TypeRef::list(TypeRef::int()));
    let host = Query::all(user())
        .filter(u.lambda(HostExpr::call(
            ENUMERABLE,
            "Contains",
            None,
            vec![ids, u.expr().field("Id", TypeRef::int())],
            TypeRef::bool(),
        )))
        .into_expr();

    let translation = Translator::default().translate(&host).unwrap();
    assert_eq!(
        translation.root.to_string(),
        "filter(named(project(table(User)), a), (a.Id in @p0))"
    );
    assert_eq!(
        translation.bind(&host).unwrap(),
        vec![("p0".to_string(), json!([1, 2, 3]))]
    );
}

#[test]
fn test_unknown_operator_is_unsupported() {
    let host = Query::all(user())
        .operator("Reverse", Vec::new(), user())
        .into_expr();
    assert_eq!(unsupported(&host), "Queryable.Reverse(Sequence<User>)");
}

#[test]
fn test_scalar_root_is_unsupported() {
    assert!(matches!(
        Translator::default().translate(&int(1)),
        Err(TranslateError::UnsupportedShape { .. })
    ));
}

// ============================================================================
// Recognizer registry
// ============================================================================

/// Claims `String.Length` per call without declaring it
struct ShoutyLength;

impl MemberRecognizer for ShoutyLength {
    fn name(&self) -> &'static str {
        "shouty_length"
    }

    fn declared_members(&self) -> Vec<MemberKey> {
        Vec::new()
    }

    fn recognize(&self, member: &MemberRef, _has_receiver: bool) -> Option<Recognition> {
        member.is_named("Length").then(|| Recognition::Call {
            function: "char_length".to_string(),
            ty: TypeRef::int(),
        })
    }
}

/// Declares `String.Empty` like the built-in string recognizer
struct EmptyString;

impl MemberRecognizer for EmptyString {
    fn name(&self) -> &'static str {
        "empty_string"
    }

    fn declared_members(&self) -> Vec<MemberKey> {
        vec![MemberKey::new("string", "empty")]
    }

    fn recognize(&self, _member: &MemberRef, _has_receiver: bool) -> Option<Recognition> {
        None
    }
}

#[test]
fn test_overlapping_claims_are_ambiguous() {
    let mut registry = RecognizerRegistry::with_defaults();
    registry.register(Arc::new(ShoutyLength)).unwrap();

    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(name(&u).field("Length", TypeRef::int()).greater_than(int(3))))
        .into_expr();

    let err = Translator::default()
        .with_recognizers(registry)
        .translate(&host)
        .unwrap_err();
    assert_eq!(
        err,
        TranslateError::AmbiguousRecognition {
            member: "String.Length".to_string(),
            recognizers: vec!["string_members".to_string(), "shouty_length".to_string()],
        }
    );
}

#[test]
fn test_custom_recognizer_replaces_defaults() {
    let mut registry = RecognizerRegistry::new();
    registry.register(Arc::new(ShoutyLength)).unwrap();

    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(name(&u).field("Length", TypeRef::int()).greater_than(int(3))))
        .into_expr();

    let translation = Translator::default()
        .with_recognizers(registry)
        .translate(&host)
        .unwrap();
    assert_eq!(
        translation.root.to_string(),
        "filter(named(project(table(User)), a), (char_length(a.Name) > @p0))"
    );
}

#[test]
fn test_overlapping_declarations_are_rejected_at_registration() {
    let mut registry = RecognizerRegistry::with_defaults();
    let err = registry.register(Arc::new(EmptyString)).unwrap_err();
    assert!(matches!(
        err,
        TranslateError::AmbiguousRecognition { ref recognizers, .. }
            if recognizers == &["string_members".to_string(), "empty_string".to_string()]
    ));
}

// ============================================================================
// Configuration, caching and rendering
// ============================================================================

#[test]
fn test_inline_constants_are_folded() {
    let config = TranslatorConfig::from_toml_str("parameterize_constants = false").unwrap();
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(age(&u).greater_than(int(10).plus(int(8)))))
        .into_expr();

    assert_eq!(
        outline_with(config, &host),
        "filter(named(project(table(User)), a), (a.Age > 18))"
    );
}

#[test]
fn test_parameter_prefix_is_configurable() {
    let config = TranslatorConfig::from_toml_str(r#"parameter_prefix = "arg""#).unwrap();
    let host = Query::all(user()).filter(older_than(18)).into_expr();

    assert_eq!(
        outline_with(config, &host),
        "filter(named(project(table(User)), a), (a.Age > @arg0))"
    );
}

#[test]
fn test_cache_separates_null_from_values() {
    let translator = Translator::default();
    let cache = MemoryCache::new();
    let u = HostParam::new("u", user());
    let named = |value: HostExpr| {
        Query::all(user())
            .filter(u.lambda(name(&u).equals(value)))
            .into_expr()
    };

    let by_value = translator
        .translate_cached(&cache, "by-name", &named(text("ann")))
        .unwrap();
    let by_other_value = translator
        .translate_cached(&cache, "by-name", &named(text("bob")))
        .unwrap();
    let by_null = translator
        .translate_cached(&cache, "by-name", &named(HostExpr::null(TypeRef::string())))
        .unwrap();

    assert!(Arc::ptr_eq(&by_value, &by_other_value));
    assert!(!Arc::ptr_eq(&by_value, &by_null));
    assert_eq!(cache.len(), 2);
    assert_eq!(
        by_other_value.bind(&named(text("bob"))).unwrap(),
        vec![("p0".to_string(), json!("bob"))]
    );
    assert_eq!(by_null.root.to_string(), "filter(named(project(table(User)), a), (a.Name = null))");
}

#[test]
fn test_cache_entries_follow_translator_settings() {
    let cache = MemoryCache::new();
    let prefixed =
        Translator::new(TranslatorConfig::from_toml_str(r#"parameter_prefix = "arg""#).unwrap())
            .unwrap();
    let plain = Translator::default();
    let host = Query::all(user()).filter(older_than(18)).into_expr();

    let by_prefixed = prefixed.translate_cached(&cache, "q", &host).unwrap();
    let by_plain = plain.translate_cached(&cache, "q", &host).unwrap();

    assert_eq!(
        by_prefixed.root.to_string(),
        "filter(named(project(table(User)), a), (a.Age > @arg0))"
    );
    assert_eq!(
        by_plain.root.to_string(),
        "filter(named(project(table(User)), a), (a.Age > @p0))"
    );
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_entries_follow_recognizers() {
    let cache = MemoryCache::new();
    let mut registry = RecognizerRegistry::new();
    registry.register(Arc::new(ShoutyLength)).unwrap();
    let custom = Translator::default().with_recognizers(registry);
    let u = HostParam::new("u", user());
    let host = Query::all(user())
        .filter(u.lambda(name(&u).field("Length", TypeRef::int()).greater_than(int(3))))
        .into_expr();

    let by_default = Translator::default()
        .translate_cached(&cache, "q", &host)
        .unwrap();
    let by_custom = custom.translate_cached(&cache, "q", &host).unwrap();

    assert_ne!(by_default.root, by_custom.root);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_take_count_is_part_of_the_cache_key() {
    let translator = Translator::default();
    let cache = MemoryCache::new();
    let five = Query::all(user()).take(5).into_expr();
    let six = Query::all(user()).take(6).into_expr();

    let first = translator.translate_cached(&cache, "page", &five).unwrap();
    let second = translator.translate_cached(&cache, "page", &six).unwrap();
    assert_eq!(first.root.to_string(), "limit(project(table(User)), 5)");
    assert_eq!(second.root.to_string(), "limit(project(table(User)), 6)");
}

#[test]
fn test_outline_renderer_lists_parameters() {
    let host = Query::all(user())
        .update_where(rename_to("anon"), older_than(65))
        .into_expr();
    let translation = Translator::default().translate(&host).unwrap();

    let rendered = OutlineRenderer
        .render(&translation.root, &translation.parameters)
        .unwrap();
    assert_eq!(OutlineRenderer.name(), "outline");
    assert_eq!(rendered.parameters, vec!["p0".to_string(), "p1".to_string()]);
    assert_eq!(rendered.text, translation.root.to_string());
    assert_eq!(translation.root.kind(), NodeKind::Filter);
}
