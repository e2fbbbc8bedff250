//! Library functions called from compiled chunks.

use tidal_runtime::{ExecutionContext, Executor, SharedBuffer, Value};
use tidal_std::StandardLibrary;
use tidalc::ast::build::*;
use tidalc::ast::Stmt;
use tidalc::ChunkLoader;

fn run(stmts: Vec<Stmt>) -> (Vec<Value>, String) {
    let buffer = SharedBuffer::new();
    let mut ctx = ExecutionContext::new().with_output(buffer.clone());
    let env = StandardLibrary::new().env();
    let main = ChunkLoader::default().load(&chunk(stmts), env).unwrap();
    let results = Executor::call(&mut ctx, main, vec![]).unwrap();
    (results, buffer.contents())
}

#[test]
fn test_table_functions_from_script() {
    // local t = {}
    // for i = 1, 5 do table.insert(t, i * i) end
    // table.remove(t, 1)
    // return table.concat(t, " "), table.unpack(t, 1, 2)
    let (results, _) = run(vec![
        local(&["t"], vec![list(vec![])]),
        numeric_for(
            "i",
            int(1),
            int(5),
            None,
            vec![call_stmt(
                field(name("table"), "insert"),
                vec![name("t"), mul(name("i"), name("i"))],
            )],
        ),
        call_stmt(field(name("table"), "remove"), vec![name("t"), int(1)]),
        ret(vec![
            call(field(name("table"), "concat"), vec![name("t"), string(" ")]),
            call(field(name("table"), "unpack"), vec![name("t"), int(1), int(2)]),
        ]),
    ]);
    assert_eq!(
        results,
        vec![Value::from("4 9 16 25"), Value::Integer(4), Value::Integer(9)]
    );
}

#[test]
fn test_pack_counts_trailing_nils() {
    // local p = table.pack(1, nil, nil); return p.n, select("#", table.unpack(p, 1, p.n))
    let (results, _) = run(vec![
        local(
            &["p"],
            vec![call(field(name("table"), "pack"), vec![int(1), nil(), nil()])],
        ),
        ret(vec![
            field(name("p"), "n"),
            call(
                name("select"),
                vec![
                    string("#"),
                    call(
                        field(name("table"), "unpack"),
                        vec![name("p"), int(1), field(name("p"), "n")],
                    ),
                ],
            ),
        ]),
    ]);
    assert_eq!(results, vec![Value::Integer(3), Value::Integer(3)]);
}

#[test]
fn test_print_formats_values() {
    // print(1, 2.5, true, nil, "s", tostring(10 // 3), type(print))
    let (_, out) = run(vec![call_stmt(
        name("print"),
        vec![
            int(1),
            float(2.5),
            boolean(true),
            nil(),
            string("s"),
            call(name("tostring"), vec![bin(tidalc::ast::BinOp::IDiv, int(10), int(3))]),
            call(name("type"), vec![name("print")]),
        ],
    )]);
    assert_eq!(out, "1\t2.5\ttrue\tnil\ts\t3\tfunction\n");
}

#[test]
fn test_tonumber_and_arithmetic() {
    // return tonumber("10") + tonumber("ff", 16), tonumber("x") == nil
    let (results, _) = run(vec![ret(vec![
        add(
            call(name("tonumber"), vec![string("10")]),
            call(name("tonumber"), vec![string("ff"), int(16)]),
        ),
        eq(call(name("tonumber"), vec![string("x")]), nil()),
    ])]);
    assert_eq!(results, vec![Value::Integer(265), Value::Boolean(true)]);
}

#[test]
fn test_assert_failure_message() {
    let env = StandardLibrary::new().env();
    let stmts = vec![call_stmt(name("assert"), vec![boolean(false), string("boom")])];
    let main = ChunkLoader::default().load(&chunk(stmts), env).unwrap();
    let err = Executor::call(&mut ExecutionContext::new(), main, vec![]).unwrap_err();
    assert_eq!(err.as_failure().unwrap().message(), "boom");
}

#[test]
fn test_os_clock_advances() {
    // local a = os.clock(); for i = 1, 1000 do end; return os.clock() >= a
    let (results, _) = run(vec![
        local(&["a"], vec![call(field(name("os"), "clock"), vec![])]),
        numeric_for("i", int(1), int(1000), None, vec![]),
        ret(vec![bin(
            tidalc::ast::BinOp::Ge,
            call(field(name("os"), "clock"), vec![]),
            name("a"),
        )]),
    ]);
    assert_eq!(results, vec![Value::Boolean(true)]);
}

#[test]
fn test_sort_and_move_from_script() {
    // local t = {"b", "d", "a", "c"}
    // table.sort(t)
    // local u = table.move(t, 1, 2, 3, {})
    // table.sort(t, function(x, y) return x > y end)
    // return table.concat(t), table.concat(u, "", 3, 4)
    let (results, _) = run(vec![
        local(
            &["t"],
            vec![list(vec![string("b"), string("d"), string("a"), string("c")])],
        ),
        call_stmt(field(name("table"), "sort"), vec![name("t")]),
        local(
            &["u"],
            vec![call(
                field(name("table"), "move"),
                vec![name("t"), int(1), int(2), int(3), list(vec![])],
            )],
        ),
        call_stmt(
            field(name("table"), "sort"),
            vec![
                name("t"),
                func(&["x", "y"], vec![ret(vec![gt(name("x"), name("y"))])]),
            ],
        ),
        ret(vec![
            call(field(name("table"), "concat"), vec![name("t")]),
            call(
                field(name("table"), "concat"),
                vec![name("u"), string(""), int(3), int(4)],
            ),
        ]),
    ]);
    assert_eq!(results, vec![Value::from("dcba"), Value::from("ab")]);
}
