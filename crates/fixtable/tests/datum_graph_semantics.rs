use fixtable::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

fn metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.add_table(TableDef::new(
        "teams",
        vec![
            ColumnDef::new("id").primary_key(true).auto_increment(true),
            ColumnDef::new("name"),
        ],
    ));
    metadata.add_table(TableDef::new(
        "heroes",
        vec![
            ColumnDef::new("id").primary_key(true).auto_increment(true),
            ColumnDef::new("name").default("unnamed"),
            ColumnDef::new("team_id"),
            ColumnDef::new("enrolled_at").default_expression("current_timestamp"),
        ],
    ));
    metadata.add_table(TableDef::new(
        "members",
        vec![
            ColumnDef::new("code").primary_key(true),
            ColumnDef::new("partner_code"),
        ],
    ));
    metadata.add_table(TableDef::new(
        "memberships",
        vec![
            ColumnDef::new("team_id").primary_key(true),
            ColumnDef::new("hero_id").primary_key(true),
            ColumnDef::new("role"),
        ],
    ));
    metadata
}

fn factory() -> DatumFactory {
    DatumFactory::new(metadata())
}

#[test]
fn single_autoincrement_key_infers_the_auto_marker() {
    let datum = factory().datum("heroes").unwrap();
    assert_eq!(datum.identity(), IdentityFields::Auto("id".into()));
}

#[test]
fn explicit_id_fields_must_match_the_declared_key_in_order() {
    let factory = factory();

    let exact = factory
        .datum_with_ids("memberships", &["team_id", "hero_id"])
        .unwrap();
    assert_eq!(
        exact.identity(),
        IdentityFields::Keys(vec!["team_id".into(), "hero_id".into()])
    );

    let permuted = factory
        .datum_with_ids("memberships", &["hero_id", "team_id"])
        .unwrap_err();
    assert!(matches!(permuted, Error::IdentityMismatch { .. }));
    assert!(permuted.to_string().contains("[hero_id,team_id]"));
    assert!(permuted.to_string().contains("[team_id,hero_id]"));

    let subset = factory
        .datum_with_ids("memberships", &["team_id"])
        .unwrap_err();
    assert!(matches!(subset, Error::IdentityMismatch { .. }));
}

#[test]
fn assigning_a_datum_equals_an_explicit_many_to_one_declaration() {
    let factory = factory();
    let team = factory.datum("teams").unwrap();

    let implicit = factory.datum("heroes").unwrap();
    implicit.set("team_id", &team).unwrap();

    let explicit = factory.datum("heroes").unwrap();
    explicit
        .set("team_id", FieldValue::many_to_one(&team, &["team_id"]))
        .unwrap();

    assert_eq!(implicit.field("team_id"), explicit.field("team_id"));
    assert_eq!(implicit.field_kind("team_id"), Some(FieldKind::ManyToOne));
}

#[test]
fn wrapping_an_already_declared_relationship_changes_nothing() {
    let factory = factory();
    let team = factory.datum("teams").unwrap();
    let hero = factory.datum("heroes").unwrap();

    let declared = FieldValue::many_to_one(&team, &["team_id"]);
    hero.set("team_id", declared.clone()).unwrap();
    assert_eq!(hero.field("team_id"), Some(declared));
}

#[test]
fn assigning_a_datum_collection_equals_an_explicit_one_to_many() {
    let factory = factory();
    let a = factory.datum("heroes").unwrap();
    let b = factory.datum("heroes").unwrap();

    let implicit = factory.datum("teams").unwrap();
    implicit
        .set("name", vec![a.clone(), b.clone()])
        .unwrap();

    let explicit = factory.datum("teams").unwrap();
    explicit
        .set("name", FieldValue::one_to_many(vec![a, b], None))
        .unwrap();

    assert_eq!(implicit.field("name"), explicit.field("name"));
    assert_eq!(implicit.field_kind("name"), Some(FieldKind::OneToMany));
}

#[test]
fn undeclared_names_fail_for_scalar_lazy_and_relationship_values() {
    let factory = factory();
    let datum = factory.datum("heroes").unwrap();
    let other = factory.datum("teams").unwrap();

    for err in [
        datum.set("sidekick", "Bubastis").unwrap_err(),
        datum.set("sidekick", lazy(|| Value::Int(1))).unwrap_err(),
        datum.set("sidekick", &other).unwrap_err(),
        datum.set("sidekick", vec![other.clone()]).unwrap_err(),
    ] {
        assert_eq!(
            err,
            Error::UndeclaredField {
                schema: "heroes".into(),
                field: "sidekick".into()
            }
        );
    }
}

#[test]
fn deferred_values_are_evaluated_at_most_once() {
    let calls = Rc::new(Cell::new(0_i64));
    let counter = calls.clone();

    let datum = factory()
        .datum_with_fields(
            "heroes",
            vec![(
                "name",
                lazy(move || {
                    counter.set(counter.get() + 1);
                    Value::Int(counter.get())
                }),
            )],
        )
        .unwrap();

    let first = datum.get_value("name").unwrap();
    let second = datum.get_value("name").unwrap();
    assert_eq!(first, Value::Int(1));
    assert_eq!(first, second);

    // Repeated fixation does not re-run the computation either.
    datum.fixate().unwrap();
    datum.fixate().unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn mutual_references_resolve_regardless_of_assignment_order() {
    let factory = factory();

    // a references b before b references a.
    let a = factory.datum("members").unwrap();
    a.set("code", "a1").unwrap();
    let b = factory.datum("members").unwrap();
    b.set("code", "b1").unwrap();

    a.set("partner_code", &b).unwrap();
    b.set("partner_code", &a).unwrap();
    a.fixate().unwrap();
    b.fixate().unwrap();

    assert_eq!(a.get_value("partner_code").unwrap(), Value::Text("b1".into()));
    assert_eq!(b.get_value("partner_code").unwrap(), Value::Text("a1".into()));

    // Same graph, opposite assignment order.
    let c = factory.datum("members").unwrap();
    c.set("code", "c1").unwrap();
    let d = factory.datum("members").unwrap();
    d.set("code", "d1").unwrap();

    d.set("partner_code", &c).unwrap();
    c.set("partner_code", &d).unwrap();
    d.fixate().unwrap();
    c.fixate().unwrap();

    assert_eq!(c.get_value("partner_code").unwrap(), Value::Text("d1".into()));
    assert_eq!(d.get_value("partner_code").unwrap(), Value::Text("c1".into()));
}

#[test]
fn composite_keys_resolve_to_value_tuples() {
    let factory = factory();
    let membership = factory.datum("memberships").unwrap();
    membership.set("team_id", 3_i64).unwrap();
    membership.set("hero_id", 9_i64).unwrap();

    let roster = factory.datum("memberships").unwrap();
    roster.set("role", &membership).unwrap();

    assert_eq!(
        roster.get("role").unwrap(),
        Resolved::Tuple(vec![Value::Int(3), Value::Int(9)])
    );
}

#[test]
fn non_scalar_defaults_degrade_to_null_instead_of_failing() {
    let datum = factory().datum("heroes").unwrap();
    assert_eq!(datum.get_value("enrolled_at").unwrap(), Value::Null);
    // Scalar defaults still seed normally.
    assert_eq!(datum.get_value("name").unwrap(), Value::Text("unnamed".into()));
}

#[test]
fn reading_an_unassigned_name_reports_the_schema() {
    let datum = factory().datum("teams").unwrap();
    let err = datum.get("motto").unwrap_err();
    assert_eq!(
        err,
        Error::UnresolvedAttribute {
            schema: "teams".into(),
            field: "motto".into()
        }
    );
}

#[test]
fn deferred_values_may_read_sibling_fields_assigned_later() {
    let factory = factory();
    let hero = factory.datum("heroes").unwrap();

    let handle = hero.clone();
    hero.set(
        "name",
        lazy(move || {
            let team = handle.get_value("team_id").unwrap();
            Value::Text(format!("hero of team {team}"))
        }),
    )
    .unwrap();

    // The sibling arrives after the deferred declaration.
    hero.set("team_id", 12_i64).unwrap();

    assert_eq!(
        hero.get_value("name").unwrap(),
        Value::Text("hero of team 12".into())
    );
}

#[test]
fn a_table_definition_can_be_used_directly_as_the_schema() {
    let factory = factory();
    let table = factory.metadata().table("teams").unwrap();
    let datum = factory.datum(&table).unwrap();
    assert_eq!(datum.schema_name(), "teams");
}
