//! Property-based tests for the Tidal compiler.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use std::collections::HashSet;

use proptest::prelude::*;
use tidal_runtime::{ExecutionContext, Executor, TableRef, Value};
use tidalc::ast::build::*;
use tidalc::ir::{FunctionBuilder, FunctionId, IrError, ModuleBuilder, Origin, OriginKind, Terminator};
use tidalc::{ChunkLoader, CompileOptions};

fn empty_function(id: u32, name: &str) -> tidalc::IrFunction {
    let mut b = FunctionBuilder::new(FunctionId(id), name, vec![], false);
    b.terminate(Terminator::Return {
        values: vec![],
        spread: None,
    });
    b.finish().unwrap()
}

fn run(stmts: Vec<tidalc::ast::Stmt>, optimize: bool) -> Vec<Value> {
    let loader = ChunkLoader::new(CompileOptions::new("prop").optimize(optimize));
    let main = loader.load(&chunk(stmts), TableRef::new()).unwrap();
    Executor::call(&mut ExecutionContext::new(), main, vec![]).unwrap()
}

proptest! {
    /// Non-negative indices build origins that report their kind and index
    #[test]
    fn indexed_origin_round_trips(index in 0i64..=u32::MAX as i64) {
        for kind in [OriginKind::Argument, OriginKind::Constant] {
            let origin = Origin::of(kind, index).unwrap();
            prop_assert_eq!(origin.kind(), Some(kind));
            prop_assert_eq!(origin.index(), Some(index as u32));
            prop_assert!(origin.is_stable());
        }
    }

    /// Negative indices are rejected for both kinds
    #[test]
    fn negative_origin_rejected(index in i64::MIN..0) {
        let err = Origin::argument(index).unwrap_err();
        prop_assert_eq!(err, IrError::InvalidIndex { kind: OriginKind::Argument, index });
        prop_assert!(Origin::constant(index).is_err());
    }

    /// Indexed origins compare by kind and index only
    #[test]
    fn indexed_origin_equality(a in 0i64..64, b in 0i64..64) {
        let arg_a = Origin::argument(a).unwrap();
        prop_assert_eq!(arg_a == Origin::argument(b).unwrap(), a == b);
        prop_assert_ne!(arg_a, Origin::constant(a).unwrap());
        prop_assert_ne!(arg_a, Origin::entry());
    }

    /// Fresh computed origins never collide
    #[test]
    fn computed_origins_distinct(n in 1usize..200) {
        let origins: HashSet<Origin> = (0..n).map(|_| Origin::computed()).collect();
        prop_assert_eq!(origins.len(), n);
        prop_assert!(!origins.contains(&Origin::entry()));
    }

    /// A module keeps functions in insertion order and snapshots stay fixed
    #[test]
    fn module_order_and_snapshots(first in 0usize..8, later in 0usize..8) {
        let mut builder = ModuleBuilder::new();
        for i in 0..first {
            builder.add(empty_function(i as u32, &format!("f{}", i))).unwrap();
        }
        let snapshot = builder.build();
        for i in first..first + later {
            builder.add(empty_function(i as u32, &format!("f{}", i))).unwrap();
        }
        let module = builder.finish();

        prop_assert_eq!(snapshot.len(), first);
        prop_assert_eq!(module.len(), first + later);
        for (i, f) in module.iter().enumerate() {
            prop_assert_eq!(f.name(), format!("f{}", i));
        }
        for (a, b) in snapshot.iter().zip(module.iter()) {
            prop_assert_eq!(a, b);
        }
    }

    /// Compiled integer arithmetic wraps like the host's
    #[test]
    fn compiled_arithmetic_wraps(a in any::<i64>(), b in any::<i64>()) {
        // local x, y = a, b; return x + y, x * y, x - y
        let stmts = vec![
            local(&["x", "y"], vec![int(a), int(b)]),
            ret(vec![
                add(name("x"), name("y")),
                mul(name("x"), name("y")),
                sub(name("x"), name("y")),
            ]),
        ];
        let expected = vec![
            Value::Integer(a.wrapping_add(b)),
            Value::Integer(a.wrapping_mul(b)),
            Value::Integer(a.wrapping_sub(b)),
        ];
        prop_assert_eq!(run(stmts.clone(), true), expected.clone());
        prop_assert_eq!(run(stmts, false), expected);
    }

    /// A counted loop sums to the closed form
    #[test]
    fn compiled_loop_sum(n in 0i64..300, step in 1i64..5) {
        // local s = 0; for i = 1, n, step do s = s + i end; return s
        let stmts = vec![
            local(&["s"], vec![int(0)]),
            numeric_for("i", int(1), int(n), Some(int(step)), vec![set("s", add(name("s"), name("i")))]),
            ret(vec![name("s")]),
        ];
        let expected: i64 = (1..=n).step_by(step as usize).sum();
        prop_assert_eq!(run(stmts, true), vec![Value::Integer(expected)]);
    }
}
