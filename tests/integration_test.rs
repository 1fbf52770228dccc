use js_deobfuscate_rs::{deobfuscate, deobfuscate_with, BoaSandbox, Options, Sandbox};

fn run(code: &str) -> String {
    deobfuscate(code, &Options::default())
        .expect("deobfuscation failed")
        .code
}

fn run_with(code: &str, options: &Options) -> String {
    deobfuscate(code, options).expect("deobfuscation failed").code
}

#[test]
fn test_sequence_statements_split() {
    let output = run("a = 1, b = 2; console.log(a);");
    assert!(output.contains("a = 1;\n"), "got: {}", output);
    assert!(output.contains("b = 2;\n"), "got: {}", output);
    assert!(output.contains("console.log(a)"), "got: {}", output);
}

#[test]
fn test_object_member_inlined_and_table_removed() {
    let output = run(r#"var r = { k: "hello" }; console.log(r["k"]);"#);
    assert!(output.contains(r#"console.log("hello")"#), "got: {}", output);
    assert!(!output.contains("var r"), "unused table removed: {}", output);
}

#[test]
fn test_string_constant_inlined() {
    let output = run(r#"let a = "debugger"; f(a);"#);
    assert!(output.contains(r#"f("debugger")"#), "got: {}", output);
    assert!(!output.contains("let a"), "constant declaration removed: {}", output);
    assert!(
        !output.contains("TOLOOK"),
        "string content alone must not trigger a mark: {}",
        output
    );
}

#[test]
fn test_constant_false_branch_pruned() {
    let output = run("if(false){x()}else{y()}");
    assert!(output.contains("y()"), "got: {}", output);
    assert!(!output.contains("x()"), "got: {}", output);
    assert!(!output.contains("if"), "got: {}", output);
}

#[test]
fn test_bang_iife_unwrapped_to_block() {
    let output = run("!function(){a()}();");
    assert!(output.contains("a()"), "got: {}", output);
    assert!(!output.contains("function"), "got: {}", output);
}

#[test]
fn test_for_init_sequence_hoisted() {
    let output =
        run(r#"for(a=1, w="2|1|2|3".split("|"), void 0;;){ var a; var w; break; }"#);
    assert!(
        output.contains(r#"var w = "2|1|2|3".split("|");"#),
        "hoisted declaration: {}",
        output
    );
    assert!(output.contains("for (void 0;;)"), "got: {}", output);
    assert!(output.contains("break"), "loop body kept: {}", output);
    assert!(!output.contains("var w;"), "interior declarator gone: {}", output);
}

#[test]
fn test_flattened_function_restored() {
    let code = r#"
function f(n) {
    var o = "1|3|2|0".split("|"), i = 0;
    while (true) {
        switch (o[i++]) {
            case "0": return x;
            case "1": if (!n) return; continue;
            case "2": x.c = "u"; continue;
            case "3": var x = d(n); continue;
        }
        break;
    }
}
f(1);
"#;
    let output = run(code);
    assert!(!output.contains("switch"), "dispatch gone: {}", output);
    assert!(!output.contains("while"), "loop gone: {}", output);
    assert!(!output.contains(r#""1|3|2|0""#), "alphabet gone: {}", output);
    let step1 = output.find("if (!n)").expect("case 1 body");
    let step3 = output.find("var x = d(n)").expect("case 3 body");
    let step0 = output.find("return x").expect("case 0 body");
    assert!(step1 < step3 && step3 < step0, "alphabet order: {}", output);
}

#[test]
fn test_decoder_pipeline_end_to_end() {
    let code = r#"var _0x5a3b = ["alpha", "beta", "gamma", "delta"];
(function (_0x4d8f, _0x3c2a) {
    var _0x1b9e = function (_0x2f7d) {
        while (--_0x2f7d) {
            _0x4d8f.push(_0x4d8f.shift());
        }
    };
    _0x1b9e(2);
})(_0x5a3b, 0x192);
function _0xdec(_0x4c3d) {
    return _0x5a3b[_0x4c3d];
}
console.log(_0xdec(0));
console.log(_0xdec(1));
console.log(_0xdec(2));
"#;
    let options = Options {
        call_count_threshold: 3,
        array_size_threshold: 4,
        ..Options::default()
    };
    let output = run_with(code, &options);

    // `while (--n) push(shift())` with n = 2 rotates once:
    // ["alpha","beta","gamma","delta"] becomes ["beta","gamma","delta","alpha"].
    assert!(output.contains(r#"console.log("beta")"#), "got: {}", output);
    assert!(output.contains(r#"console.log("gamma")"#), "got: {}", output);
    assert!(output.contains(r#"console.log("delta")"#), "got: {}", output);
    assert!(!output.contains("_0xdec"), "decoder removed once spent: {}", output);
    assert!(
        !output.contains("_0xdec(0)"),
        "no decoder calls survive: {}",
        output
    );
}

#[test]
fn test_sandbox_required_error() {
    let code = r#"var _t = ["x", "y", "z"];
function dec(i) { return _t[i]; }
log(dec(0));
"#;
    let options = Options {
        call_count_threshold: 3,
        array_size_threshold: 3,
        ..Options::default()
    };
    let err = deobfuscate_with(code, &options, None).expect_err("sandbox required");
    assert!(
        matches!(err, js_deobfuscate_rs::DeobfuscateError::SandboxRequired),
        "got: {:?}",
        err
    );
}

#[test]
fn test_full_pipeline_idempotent() {
    let code = r#"
var out = [];
out.push((1 + 2) * 3);
if (false) { out.push("dead"); } else { out.push("live"); }
var t = { k: "hello" };
out.push(t["k"]);
!function () { out.push("iife"); }();
a = 1, b = 2;
report(out, a, b);
"#;
    let once = run(code);
    let twice = run(&once);
    assert_eq!(once, twice, "running the engine on its own output is a no-op");
}

#[test]
fn test_semantics_preserved_under_sandbox() {
    let code = r#"
var out = [];
out.push((1 + 2) * 3);
if (false) { out.push("dead"); } else { out.push("live"); }
var t = { op: function (a, b) { return a + b; } };
out.push(t["op"](4, 5));
!function () { out.push("iife"); }();
"#;
    let output = run(code);

    let sandbox = BoaSandbox::new();
    let observe = |source: &str| {
        sandbox
            .evaluate(&format!("(() => {{ {} ;return out; }})()", source))
            .expect("observation program runs")
    };
    assert_eq!(
        observe(code),
        observe(&output),
        "deobfuscated output diverged:\n{}",
        output
    );
}

#[test]
fn test_fixpoint_terminates_within_cap() {
    let code = r#"
function w1(a) { return w2(a + 1); }
function w2(a) { return target(a * 2); }
var key = "se" + "cret";
if (1) { use(w1(3), key); }
"#;
    let result = deobfuscate(code, &Options::default()).expect("converges");
    assert!(result.changes > 0);
    assert!(result.code.contains("target"), "got: {}", result.code);
}

#[test]
fn test_mark_keywords() {
    let options = Options {
        mark_keywords: vec!["token".to_string()],
        ..Options::default()
    };
    let output = run_with("sendToken(secretToken);\nharmless();", &options);
    assert!(output.contains("// TOLOOK"), "got: {}", output);
    let mark = output.find("// TOLOOK").unwrap();
    let call = output.find("sendToken").unwrap();
    assert!(mark < call, "mark precedes the flagged line: {}", output);
}

#[test]
fn test_debugger_statement_marked() {
    let output = run("before();\ndebugger;\nafter();");
    assert!(output.contains("// TOLOOK\ndebugger;"), "got: {}", output);
}

#[test]
fn test_timer_calls_marked() {
    let output = run("setTimeout(f, 100);");
    assert!(output.contains("// TOLOOK"), "got: {}", output);
}

#[test]
fn test_forced_decoder_alias_removed() {
    let code = r#"var short = decode; g(short(1)); g(short(2));"#;
    let options = Options {
        decoders: vec!["decode".to_string()],
        ..Options::default()
    };
    let output = run_with(code, &options);
    assert!(output.contains("g(decode(1))"), "got: {}", output);
    assert!(output.contains("g(decode(2))"), "got: {}", output);
    assert!(!output.contains("short"), "alias gone: {}", output);
}

#[test]
fn test_rename_vars_option() {
    let options = Options {
        rename_vars: true,
        ..Options::default()
    };
    let output = run_with("var _0x4d8f = g(); use(_0x4d8f);", &options);
    assert!(!output.contains("_0x4d8f"), "got: {}", output);
    assert!(output.contains("var_1"), "got: {}", output);
}
