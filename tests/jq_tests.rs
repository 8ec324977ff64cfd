//! Integration tests for the jq engine, run directly through `parse`/`eval`.

use jqhost::jq::{eval, parse, Env, Map, Value};

/// Run a script against a JSON document and compare the compact JSON of
/// every output.
macro_rules! query {
    ($json:expr, $script:expr => [$($expected:expr),* $(,)?]) => {{
        let expr = parse($script).expect("parse failed");
        let input = Value::from_json_str($json).expect("invalid test input");
        let globals = Map::new();
        let got: Vec<String> = eval(&expr, input, &Env::new(&globals))
            .map(|r| r.expect("eval failed").to_json())
            .collect();
        let expected: Vec<&str> = vec![$($expected),*];
        assert_eq!(got, expected, "script: {}", $script);
    }};
}

/// Run a script and expect its first failure to carry `message`.
macro_rules! query_err {
    ($json:expr, $script:expr => $message:expr) => {{
        let expr = parse($script).expect("parse failed");
        let input = Value::from_json_str($json).expect("invalid test input");
        let globals = Map::new();
        let err = eval(&expr, input, &Env::new(&globals))
            .find_map(Result::err)
            .expect("expected an error");
        assert_eq!(err.message(), $message, "script: {}", $script);
    }};
}

// =============================================================================
// Paths
// =============================================================================

#[test]
fn test_field_and_index() {
    let doc = r#"{"a": {"b": [1, 2, 3]}}"#;
    query!(doc, ".a.b[1]" => ["2"]);
    query!(doc, ".a.b[-1]" => ["3"]);
    query!(doc, r#"."a".b[0]"# => ["1"]);
    query!(doc, ".a.b[1:]" => ["[2,3]"]);
    query!(doc, ".missing" => ["null"]);
    query!(doc, ".a.b[10]" => ["null"]);
}

#[test]
fn test_iterate() {
    query!("[1, [2], {\"x\": 3}]", ".[]" => ["1", "[2]", r#"{"x":3}"#]);
    query!(r#"{"a": 1, "b": 2}"#, ".[]" => ["1", "2"]);
    query!("[]", ".[]" => []);
}

#[test]
fn test_recursive_descent() {
    query!("[1, [2]]", "[..]" => ["[[1,[2]],1,[2],2]"]);
    query!(r#"{"a": {"a": 1}}"#, "[.. | .a?]" => [r#"[{"a":1},1]"#]);
}

#[test]
fn test_optional() {
    query!("5", "[.a?]" => ["[]"]);
    query!("5", "[.[]?]" => ["[]"]);
    query!("[1, 2]", "[.[\"x\"]?, 3]" => ["[3]"]);
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn test_pipe_and_comma() {
    query!("null", "1, 2 | . * 10" => ["10", "20"]);
    query!(r#"{"a": [1, 2]}"#, ".a | length" => ["2"]);
}

#[test]
fn test_arithmetic() {
    query!("null", "7 / 2" => ["3.5"]);
    query!("null", "10 % 3" => ["1"]);
    query!("null", "-(1 + 2) * 3" => ["-9"]);
    query!("null", r#""a,b" / ",""# => [r#"["a","b"]"#]);
    query!("null", "[1, 2, 2, 3] - [2]" => ["[1,3]"]);
    query!("null", r#"{"a": 1} + {"b": 2}"# => [r#"{"a":1,"b":2}"#]);
    query!(
        "null",
        r#"{"a": {"x": 1}, "b": 0} * {"a": {"y": 2}}"# => [r#"{"a":{"x":1,"y":2},"b":0}"#]
    );
    query!("null", "null + 1" => ["1"]);
}

#[test]
fn test_arithmetic_errors() {
    query_err!("null", r#""a" + 1"# => r#"string ("a") and number (1) cannot be added"#);
    query_err!("null", "1 / 0" => "number (1) and number (0) cannot be divided because the divisor is zero");
    query_err!("{}", "{} - 1" => "object ({}) and number (1) cannot be subtracted");
    query_err!("null", r#""ab" * 1e19"# => "Repeat string result too long");
    query_err!("null", r#""a" * 1e18"# => "Repeat string result too long");
}

#[test]
fn test_number_edges() {
    query!("null", "1e1000" => ["1.7976931348623157e+308"]);
    query!("null", "-1e1000" => ["-1.7976931348623157e+308"]);
    query!("[1e1000]", ".[0]" => ["1.7976931348623157e+308"]);
    query!("null", "-0 | tostring" => [r#""-0""#]);
    query!("null", "1e17, 1e-5, 0.001, 1.5" => ["1e+17", "1e-05", "0.001", "1.5"]);
}

#[test]
fn test_comparison_and_logic() {
    query!("null", "1 < 2, 2 <= 1, \"a\" == \"a\", [1] != [1]" => ["true", "false", "true", "false"]);
    query!("null", "null < false, false < 0, 0 < \"\", \"\" < [], [] < {}" => ["true", "true", "true", "true", "true"]);
    query!("null", "true and (null or 1)" => ["true"]);
    query!("null", "(true, false) | not" => ["false", "true"]);
}

#[test]
fn test_alternative() {
    query!(r#"{"a": null}"#, ".a // \"default\"" => [r#""default""#]);
    query!("[false, 1, null, 2]", ".[] // 0" => ["1", "2"]);
    query!("5", ".a // 7" => ["7"]);
    query!("null", "first(recurse(. + 1) // 0)" => ["1"]);
    query!("null", "first(range(1e18) // 0)" => ["0"]);
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_array_and_object_construction() {
    query!("[1, 2]", "[.[] | . * 2]" => ["[2,4]"]);
    query!(r#"{"a": 1, "b": 2}"#, "{a, c: .b}" => [r#"{"a":1,"c":2}"#]);
    query!(r#"{"k": "name"}"#, "{(.k): 1}" => [r#"{"name":1}"#]);
    query!("null", "{a: (1, 2)}" => [r#"{"a":1}"#, r#"{"a":2}"#]);
    query!("3", ". as $x | {$x}" => [r#"{"x":3}"#]);
}

#[test]
fn test_object_key_must_be_string() {
    query_err!("null", "{(1): 2}" => "Object keys must be strings, not number");
}

#[test]
fn test_string_interpolation() {
    query!(r#"{"n": "jq", "v": 1.5}"#, r#""\(.n) v\(.v)""# => [r#""jq v1.5""#]);
    query!("[1, 2]", r#""x\(.[])""# => [r#""x1""#, r#""x2""#]);
}

// =============================================================================
// Control flow and variables
// =============================================================================

#[test]
fn test_conditionals() {
    query!("[1, 2, 3]", ".[] | if . == 1 then \"one\" elif . == 2 then \"two\" else \"many\" end"
        => [r#""one""#, r#""two""#, r#""many""#]);
    query!("4", "if . > 3 then \"big\" end" => [r#""big""#]);
    query!("2", "if . > 3 then \"big\" end" => ["2"]);
}

#[test]
fn test_try_catch() {
    query!("null", "try error(\"x\") catch ." => [r#""x""#]);
    query!("[1, \"a\", 2]", "[.[] | try (. + 1) catch \"bad\"]" => [r#"[2,"bad",3]"#]);
    query!("null", "try error({\"code\": 1}) catch .code" => ["1"]);
    query!("null", "[.a, error(\"x\")?, 1]" => ["[null,1]"]);
}

#[test]
fn test_variables() {
    query!("[1, 2]", ".[] as $x | $x * 10" => ["10", "20"]);
    query!("{\"a\": 1}", ". as $o | .a as $a | [$o.a, $a]" => ["[1,1]"]);
    query_err!("null", "$nope" => "$nope is not defined");
}

#[test]
fn test_reduce_and_foreach() {
    query!("[1, 2, 3, 4]", "reduce .[] as $x (0; . + $x)" => ["10"]);
    query!("[1, 2, 3]", "[foreach .[] as $x (0; . + $x)]" => ["[1,3,6]"]);
    query!("null", "reduce empty as $x (7; . + 1)" => ["7"]);
}

#[test]
fn test_comments() {
    query!("[1]", ".[] # take each\n| . + 1" => ["2"]);
}

// =============================================================================
// Builtins
// =============================================================================

#[test]
fn test_length_and_keys() {
    query!(r#"[[1, 2], "héllo", {"a": 1}, null, -3]"#, ".[] | length" => ["2", "5", "1", "0", "3"]);
    query!(r#""héllo""#, "utf8bytelength" => ["6"]);
    query!(r#"{"b": 1, "a": 2}"#, "keys, keys_unsorted" => [r#"["a","b"]"#, r#"["b","a"]"#]);
    query!(r#"{"a": 1}"#, "has(\"a\"), has(\"b\")" => ["true", "false"]);
    query!("\"a\"", "in({\"a\": 1})" => ["true"]);
}

#[test]
fn test_selection_and_mapping() {
    query!("[1, 2, 3, 4]", "map(select(. % 2 == 0))" => ["[2,4]"]);
    query!(r#"{"a": 1, "b": 2}"#, "map_values(. + 1)" => [r#"{"a":2,"b":3}"#]);
    query!("[1, null, \"a\"]", "[.[] | numbers], [.[] | strings], [.[] | nulls]" => ["[1]", r#"["a"]"#, "[null]"]);
    query!("[[1], 2]", "[.[] | scalars], [.[] | iterables]" => ["[2]", "[[1]]"]);
}

#[test]
fn test_aggregates() {
    query!("[1, 2, 3]", "add" => ["6"]);
    query!(r#"["a", "b"]"#, "add" => [r#""ab""#]);
    query!("[]", "add" => ["null"]);
    query!("[true, false]", "any, all" => ["true", "false"]);
    query!("[3, 1, 2]", "min, max" => ["1", "3"]);
    query!(r#"[{"n": 2}, {"n": 1}]"#, "min_by(.n), max_by(.n)" => [r#"{"n":1}"#, r#"{"n":2}"#]);
    query!("[]", "min" => ["null"]);
}

#[test]
fn test_sorting_and_grouping() {
    query!(r#"[3, "a", null, [1], true, 1]"#, "sort" => [r#"[null,true,1,3,"a",[1]]"#]);
    query!(r#"[{"n": 2}, {"n": 1}]"#, "sort_by(.n) | map(.n)" => ["[1,2]"]);
    query!("[1, 2, 1, 3, 2]", "unique" => ["[1,2,3]"]);
    query!(r#"["ab", "c", "de"]"#, "unique_by(length)" => [r#"["c","ab"]"#]);
    query!(
        r#"[{"k": "b", "v": 1}, {"k": "a", "v": 2}, {"k": "b", "v": 3}]"#,
        "group_by(.k) | map(map(.v))" => ["[[2],[1,3]]"]
    );
    query!("[1, 2, 3]", "reverse" => ["[3,2,1]"]);
}

#[test]
fn test_entries() {
    query!(r#"{"a": 1}"#, "to_entries" => [r#"[{"key":"a","value":1}]"#]);
    query!(r#"[{"key": "a", "value": 1}, {"name": "b", "value": 2}]"#, "from_entries" => [r#"{"a":1,"b":2}"#]);
    query!(r#"{"a": 1}"#, "with_entries({key: (.key | ascii_upcase), value})" => [r#"{"A":1}"#]);
}

#[test]
fn test_generators() {
    query!("null", "[range(3)], [range(2; 4)]" => ["[0,1,2]", "[2,3]"]);
    query!("null", "[limit(3; range(100))]" => ["[0,1,2]"]);
    query!("null", "[limit(-1; 1, 2)]" => ["[1,2]"]);
    query!("null", "[range(10; 0; -4)]" => ["[10,6,2]"]);
    query!("[1, 5, 9]", "any(. > 8), all(. > 0), any(.[]; . == 5)" => ["true", "true", "true"]);
    query!("null", "first(range(5; 10)), last(range(3))" => ["5", "2"]);
    query!("[4, 5]", "first, last" => ["4", "5"]);
    query!("[[1, [2]], 3]", "[recurse | numbers]" => ["[1,2,3]"]);
    query!("2", "[recurse(if . < 16 then . * . else empty end)]" => ["[2,4,16]"]);
}

#[test]
fn test_string_builtins() {
    query!(r#""Hello""#, "ascii_downcase, ascii_upcase" => [r#""hello""#, r#""HELLO""#]);
    query!(r#""prefix-body""#, "startswith(\"prefix\"), endswith(\"x\")" => ["true", "false"]);
    query!(r#""prefix-body""#, "ltrimstr(\"prefix-\"), rtrimstr(\"-body\")" => [r#""body""#, r#""prefix""#]);
    query!(r#""a-b-c""#, "split(\"-\") | join(\"+\")" => [r#""a+b+c""#]);
    query!(r#""foobar""#, "contains(\"bar\")" => ["true"]);
    query!(r#"{"a": [1, 2], "b": "x"}"#, "contains({a: [1]})" => ["true"]);
}

#[test]
fn test_conversions() {
    query!("[1, \"2\", [3]]", ".[] | tostring" => [r#""1""#, r#""2""#, r#""[3]""#]);
    query!(r#""42""#, "tonumber" => ["42"]);
    query!(r#"{"a": [1]}"#, "tojson" => [r#""{\"a\":[1]}""#]);
    query!(r#""[1,2]""#, "fromjson | add" => ["3"]);
    query!("[1, null, \"s\", [], {}, true]", "map(type)"
        => [r#"["number","null","string","array","object","boolean"]"#]);
    query!("17.9", "floor" => ["17"]);
    query!("16", "sqrt" => ["4"]);
}

#[test]
fn test_errors_from_builtins() {
    query_err!("null", "error(\"custom\")" => "custom");
    query_err!("5", ".foo" => "Cannot index number with \"foo\"");
    query_err!("5", ".[]" => "Cannot iterate over number (5)");
    query_err!("null", "keys" => "null (null) has no keys");
    query_err!("true", "length" => "boolean (true) has no length");
}
