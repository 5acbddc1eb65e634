/// NDL integration tests: parsing, printing and validating fixture documents.

use ndl_bridge::core::emit::emit_event;
use ndl_bridge::ndl::validate::has_errors;
use ndl_bridge::ndl::{
    parse, parse_lenient, validate, Arg, ArgValue, Clause, Document, EntityKey, Statement,
    Severity,
};
use ndl_bridge::schema::entity::{Entity, EntityId, Value};
use ndl_bridge::schema::event::{Effect, EntityRef, Event, Mood, Outcome, Stakes};
use ndl_bridge::schema::narrative_fn::NarrativeFunction;
use ndl_bridge::schema::world::{load_entities_from_ron, WorldState};
use std::collections::HashMap;
use std::path::Path;

fn world_table() -> HashMap<EntityId, Entity> {
    load_entities_from_ron(Path::new("tests/fixtures/world.ron")).unwrap()
}

fn scene() -> String {
    std::fs::read_to_string("tests/fixtures/scene.ndl").unwrap()
}

#[test]
fn scene_fixture_parses() {
    let doc = parse(&scene()).unwrap();
    assert_eq!(doc.statements.len(), 5);
    let lines: Vec<usize> = doc.statements.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![2, 3, 4, 6, 6]);

    let fight = &doc.statements[2];
    assert_eq!(fight.clauses.len(), 3);
    assert_eq!(fight.outcome(), Some(Outcome::Success));
    assert_eq!(fight.hint_symbol("tone"), Some("grim"));
    assert_eq!(fight.numbers(), vec![-12.0]);
}

#[test]
fn every_reference_form_resolves() {
    let entities = world_table();
    let world = WorldState::new(&entities);
    let doc = parse(&scene()).unwrap();

    let say_actor = doc.statements[0].primary().unwrap().actor().unwrap();
    let reveal_actor = doc.statements[3].primary().unwrap().actor().unwrap();
    let map = doc.statements[4].primary().unwrap().actor().unwrap();
    assert_eq!(say_actor.as_str(), "innkeeper");
    assert_eq!(reveal_actor.as_str(), "npc.innkeeper");
    assert_eq!(map.as_str(), "the old map");

    assert_eq!(world.resolve(say_actor.as_str()).map(|e| e.id), Some(EntityId(2)));
    assert_eq!(world.resolve(reveal_actor.as_str()).map(|e| e.id), Some(EntityId(2)));
    assert_eq!(world.resolve(map.as_str()).map(|e| e.id), Some(EntityId(5)));
}

#[test]
fn canonical_form_round_trips() {
    let doc = parse(&scene()).unwrap();
    let printed = doc.to_string();
    assert_eq!(printed.lines().count(), 5);
    assert!(printed.contains("reveal(${npc.innkeeper}, \"the map is a forgery\")\n"));
    assert!(printed.contains("describe($\"the old map\", \"crumbles to dust\")\n"));

    let reparsed = parse(&printed).unwrap();
    assert_eq!(reparsed, doc);
    assert_eq!(reparsed.to_string(), printed);
}

#[test]
fn awkward_keys_and_numbers_survive_printing() {
    let keys = [
        "007", "0", "a b", "x.1", "room.0", "1.5", "a..b", "true", "false", "é", "say \"hi\"",
        "tab\there",
    ];
    let numbers = [
        0.0,
        -0.0,
        -2.5,
        1e-7,
        1e21,
        123456789.125,
        f64::MAX,
        f64::MIN_POSITIVE,
    ];
    let statements = keys
        .iter()
        .zip(numbers.iter().cycle())
        .map(|(key, n)| {
            Statement::new(
                vec![Clause::new(
                    "change",
                    vec![
                        Arg::positional(ArgValue::Entity(EntityKey::new(key))),
                        Arg::named("by", ArgValue::Number(*n)),
                    ],
                )],
                Vec::new(),
            )
        })
        .collect();
    let doc = Document {
        statements,
        ..Document::default()
    };

    let printed = doc.to_string();
    assert!(printed.contains("change($\"007\", by=0)\n"));
    assert!(printed.contains("change(${room.0}, by="));
    assert!(printed.contains("change($\"true\", by="));
    let reparsed = parse(&printed).unwrap();
    assert_eq!(reparsed, doc);
    for (stmt, key) in reparsed.statements.iter().zip(keys) {
        assert_eq!(stmt.clauses[0].actor().map(EntityKey::as_str), Some(key));
    }
}

#[test]
fn scene_validates_against_world() {
    let entities = world_table();
    let world = WorldState::new(&entities);
    let doc = parse(&scene()).unwrap();
    let diagnostics = validate(&doc, &world);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
}

#[test]
fn lenient_parse_keeps_good_statements() {
    let source = "describe($goblin, \"snarls\")\n\
                  do($player, \"swing\" target=$goblin)\n\
                  move($player, to=$cellar)\n";
    let (doc, errors) = parse_lenient(source);
    assert_eq!(doc.statements.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 2);
    assert!(parse(source).is_err());
}

#[test]
fn validation_reports_each_problem() {
    let entities = world_table();
    let world = WorldState::new(&entities);
    let doc = parse(
        "say($dragon, \"Roar\")\n\
         outcome(success)\n\
         do($player, \"dodge\") ~ tempo(fast)\n",
    )
    .unwrap();
    let diagnostics = validate(&doc, &world);
    assert!(has_errors(&diagnostics));

    let errors: Vec<usize> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.line)
        .collect();
    assert!(errors.contains(&1));
    assert!(errors.contains(&2));

    let warnings: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("tempo"));
}

#[test]
fn emitted_events_round_trip_through_text() {
    let entities = world_table();
    let world = WorldState::new(&entities);
    let event = Event {
        event_type: "do".to_string(),
        participants: vec![EntityRef::new(1, "actor"), EntityRef::new(3, "target")],
        location: Some(EntityRef::new(4, "location")),
        mood: Mood::Dread,
        stakes: Stakes::Critical,
        outcome: Some(Outcome::Partial),
        narrative_fn: NarrativeFunction::Escalation,
        effects: vec![
            Effect {
                entity_id: EntityId(1),
                key: "hp".to_string(),
                delta: Value::Int(-3),
            },
            Effect {
                entity_id: EntityId(3),
                key: "fleeing".to_string(),
                delta: Value::Bool(true),
            },
        ],
        metadata: HashMap::from([
            ("action".to_string(), Value::String("wrestle the goblin".to_string())),
            ("roll".to_string(), Value::Int(11)),
        ]),
    };

    let stmt = emit_event(&event, &world).unwrap();
    let text = stmt.to_string();
    assert_eq!(
        text,
        "do($player, \"wrestle the goblin\", target=$goblin, at=$cellar, roll=11) \
         -> outcome(partial) -> change($player, hp=-3) -> change($goblin, fleeing=true) \
         ~ fn(escalation) ~ mood(dread) ~ stakes(critical)"
    );

    let doc = parse(&text).unwrap();
    assert_eq!(
        doc,
        Document {
            statements: vec![stmt],
            ..Document::default()
        }
    );
    assert!(validate(&doc, &world).is_empty());
    assert_eq!(
        doc.statements[0].primary().unwrap().get("roll"),
        Some(&ArgValue::Number(11.0))
    );
}
