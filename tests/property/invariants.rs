use cairn::config::{merge_policy, ContextConfig, ContextOverrides};
use cairn::context::resolve_access_mode;
use cairn::driver::{AccessMode, Record};
use cairn::normalize::{normalize_record, Normalize, QueryOutput};
use cairn::value::{Value, MAX_SAFE_INTEGER};
use proptest::prelude::*;

/// Readonly forces read mode whatever the write flag says
#[test]
fn test_readonly_dominates_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<bool>(), |write| {
            assert_eq!(resolve_access_mode(write, true), Some(AccessMode::Read));
            Ok(())
        })
        .unwrap();
}

/// Integers serialize as numbers only while exactly representable
#[test]
fn test_integer_interchange_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<i64>(), |n| {
            let json = serde_json::to_value(Value::Integer(n)).unwrap();
            if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&n) {
                assert_eq!(json, serde_json::json!(n));
            } else {
                assert_eq!(json, serde_json::Value::String(n.to_string()));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_integer_interchange_boundaries() {
    let json = |n: i64| serde_json::to_string(&Value::Integer(n)).unwrap();
    assert_eq!(json(42), "42");
    assert_eq!(json(9007199254740991), "9007199254740991");
    assert_eq!(json(9007199254740993), "\"9007199254740993\"");
    assert_eq!(json(-9007199254740993), "\"-9007199254740993\"");
}

/// Normalizing normalized rows changes nothing, with or without projection
#[test]
fn test_normalization_idempotence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..8),
            |fields| {
                let (keys, values): (Vec<String>, Vec<Value>) = fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::Integer(v)))
                    .unzip();
                let record = Record::new(keys.clone(), values);
                let once = vec![normalize_record(&record, None)];
                let twice = QueryOutput::Rows(once.clone()).normalize();
                assert_eq!(&once, &twice);

                let projection: Vec<&str> = keys.iter().rev().map(String::as_str).collect();
                let projected = QueryOutput::Rows(once.clone()).into_rows(Some(&projection));
                let again = QueryOutput::Rows(projected.clone()).into_rows(Some(&projection));
                assert_eq!(projected, again);
                Ok(())
            },
        )
        .unwrap();
}

/// Set overrides win field-by-field; unset overrides keep the base
#[test]
fn test_override_precedence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                any::<(bool, bool, bool)>(),
                any::<(Option<bool>, Option<bool>, Option<bool>)>(),
                proptest::option::of("[a-z]{1,8}"),
            ),
            |((readonly, write, ignore), (o_readonly, o_write, o_ignore), o_database)| {
                let base = ContextConfig {
                    readonly,
                    write,
                    ignore_bookmarks: ignore,
                    database: Some("base".to_string()),
                    ..ContextConfig::with_url("memory://base")
                };
                let overrides = ContextOverrides {
                    readonly: o_readonly,
                    write: o_write,
                    ignore_bookmarks: o_ignore,
                    database: o_database.clone(),
                    ..ContextOverrides::default()
                };
                let merged = merge_policy::apply(&base, &overrides);
                assert_eq!(merged.readonly, o_readonly.unwrap_or(readonly));
                assert_eq!(merged.write, o_write.unwrap_or(write));
                assert_eq!(merged.ignore_bookmarks, o_ignore.unwrap_or(ignore));
                assert_eq!(
                    merged.database,
                    Some(o_database.unwrap_or_else(|| "base".to_string()))
                );
                assert_eq!(merged.url, base.url);
                Ok(())
            },
        )
        .unwrap();
}
