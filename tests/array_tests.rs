//! Arrays, variables, JSON paths, and regex subtags, end to end.

mod common;

use bbtag::runtime::external::VariableStore;
use common::{run, Harness};

// ----------------------------------------------------------------------------
// Variables
// ----------------------------------------------------------------------------

#[tokio::test]
async fn set_then_get_round_trips_within_one_invocation() {
    let result = run("{set;~name;hello}{get;~name}").await;
    assert_eq!(result.output, "hello");
    assert_eq!(result.variable_write_count, 1);
}

#[tokio::test]
async fn variadic_set_stores_an_array() {
    let result = run("{set;~arr;a;b;c}{get;~arr;1}").await;
    assert_eq!(result.output, "b");
}

#[tokio::test]
async fn out_of_range_index_is_a_contained_error() {
    let result = run("{set;~arr;a;b}{get;~arr;9}").await;
    assert_eq!(result.output, "`Index out of range: 9 (length 2)`");
}

#[tokio::test]
async fn unset_variables_read_as_empty() {
    let result = run("[{get;~nothing}]").await;
    assert_eq!(result.output, "[]");
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn writes_persist_to_the_store_after_the_run() {
    let harness = Harness::new();
    harness.run("{set;~kept;value}").await;
    assert_eq!(
        harness.store.get("~kept").await.unwrap(),
        Some(serde_json::json!("value"))
    );
}

// ----------------------------------------------------------------------------
// Array mutation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn variable_arrays_write_back_on_mutation() {
    let result = run("{set;~arr;a;b}{pop;~arr}/{get;~arr}").await;
    // pop outputs the removed element; the shrunken array persists.
    assert_eq!(result.output, r#"b/["a"]"#);
}

#[tokio::test]
async fn shift_removes_from_the_front() {
    let result = run("{set;~arr;a;b}{shift;~arr}/{get;~arr}").await;
    assert_eq!(result.output, r#"a/["b"]"#);
}

#[tokio::test]
async fn literal_arrays_return_their_new_serialization() {
    let result = run("{push;[1,2];3}").await;
    assert_eq!(result.output, r#"[1,2,"3"]"#);
}

#[tokio::test]
async fn sort_is_numeric_first() {
    assert_eq!(run("{sort;[10,2,1]}").await.output, "[1,2,10]");
    assert_eq!(
        run(r#"{sort;["pear","apple"]}"#).await.output,
        r#"["apple","pear"]"#
    );
    assert_eq!(run("{sort;[1,2,10];true}").await.output, "[10,2,1]");
}

#[tokio::test]
async fn reverse_flips_element_order() {
    assert_eq!(run("{reverse;[1,2,3]}").await.output, "[3,2,1]");
}

#[tokio::test]
async fn shuffle_keeps_the_same_elements() {
    let result = run("{shuffle;[1,2,3,4,5]}").await;
    let mut values: Vec<i64> = serde_json::from_str(&result.output).unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn foreach_visits_every_element_in_order() {
    let result = run("{foreach;~x;[1,2,3];<{get;~x}>}").await;
    assert_eq!(result.output, "<1><2><3>");
}

#[tokio::test]
async fn non_array_input_is_a_contained_error() {
    let result = run("{pop;not an array}").await;
    assert_eq!(result.output, "`Not an array: not an array`");
}

// ----------------------------------------------------------------------------
// JSON paths
// ----------------------------------------------------------------------------

#[tokio::test]
async fn jget_walks_arrays_and_objects() {
    assert_eq!(run("{jget;[10,20,30];1}").await.output, "20");
    assert_eq!(
        run(r#"{jget;{lb}"a":[1,2]{rb};a.1}"#).await.output,
        "2"
    );
}

#[tokio::test]
async fn jget_without_a_path_displays_the_whole_value() {
    assert_eq!(run("{jget;[1,2]}").await.output, "[1,2]");
}

#[tokio::test]
async fn bad_paths_name_the_failing_segment() {
    let result = run(r#"{jget;{lb}"a":1{rb};b}"#).await;
    assert_eq!(
        result.output,
        "`Invalid JSON path `b`: no property named `b``"
    );
}

// ----------------------------------------------------------------------------
// Regex safety
// ----------------------------------------------------------------------------

#[tokio::test]
async fn regextest_matches_raw_patterns() {
    assert_eq!(run(r"{regextest;hello123;\d+}").await.output, "true");
    assert_eq!(run(r"{regextest;hello;\d+}").await.output, "false");
}

#[tokio::test]
async fn regexmatch_collects_all_matches() {
    assert_eq!(
        run(r"{regexmatch;a1b22c333;\d+}").await.output,
        r#"["1","22","333"]"#
    );
}

#[tokio::test]
async fn regexsplit_splits_on_the_pattern() {
    assert_eq!(
        run(r"{regexsplit;a1b2c;\d}").await.output,
        r#"["a","b","c"]"#
    );
}

#[tokio::test]
async fn vulnerable_patterns_are_rejected() {
    let result = run("{regextest;aaaa;(a+)+$}").await;
    assert_eq!(
        result.output,
        "`Unsafe regex: nested unbounded quantifiers`"
    );
}
