//! Test suite for the interop module

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::error::{Error, Result};
use crate::ffi::{sys, Reference};
use crate::state::{RuntimeState, StateOptions};

fn runtime() -> Rc<RuntimeState> {
    RuntimeState::open(StateOptions::default(), Some(fail_closed())).unwrap()
}

fn run(rt: &Rc<RuntimeState>, source: &str) -> Result<()> {
    let stack = rt.stack();
    let status = load_source(stack, source, EVAL_CHUNK)?;
    if !rt.check(status)? {
        return Ok(());
    }
    let status = unsafe { sys::lua_pcall(stack.as_ptr(), 0, 0, 0) };
    rt.protect(status)
}

fn global(rt: &Rc<RuntimeState>, name: &str) -> Variant {
    let stack = rt.stack();
    let cname = std::ffi::CString::new(name).unwrap();
    unsafe { sys::lua_getglobal(stack.as_ptr(), cname.as_ptr()) };
    marshal::pop(stack)
}

// ============================================================================
// Marshalling
// ============================================================================

#[test]
fn test_push_pop_round_trip() {
    let rt = runtime();
    let stack = rt.stack();
    let values = [
        Variant::from(2.5),
        Variant::from("hello"),
        Variant::from(true),
        Variant::from(false),
        Variant::Nil,
    ];
    for value in values {
        marshal::push(stack, &value);
        assert_eq!(stack.top(), 1);
        assert_eq!(marshal::pop(stack), value);
        assert_eq!(stack.top(), 0);
    }
}

#[test]
fn test_integer_comes_back_as_float() {
    let rt = runtime();
    let stack = rt.stack();
    marshal::push(stack, &Variant::from(9));
    let back = marshal::pop(stack);
    assert_eq!(back, Variant::Float(9.0));
    assert!(back.same_value(&Variant::from(9)));
}

#[test]
fn test_string_with_interior_nul() {
    let rt = runtime();
    let stack = rt.stack();
    marshal::push(stack, &Variant::from("a\0b"));
    assert_eq!(marshal::pop(stack).as_str(), Some("a\0b"));
}

#[test]
fn test_peek_does_not_pop() {
    let rt = runtime();
    let stack = rt.stack();
    stack.push_number(1.0);
    stack.push_str("x");
    assert_eq!(marshal::peek(stack, 1), Variant::Float(1.0));
    assert_eq!(marshal::peek(stack, -1), Variant::from("x"));
    assert_eq!(stack.top(), 2);
    stack.pop(2);
}

#[test]
fn test_unclassifiable_pop_stays_balanced() {
    let rt = runtime();
    let stack = rt.stack();

    stack.new_table();
    assert_eq!(marshal::pop(stack), Variant::Nil);
    assert_eq!(stack.top(), 0);

    stack.new_table();
    let err = marshal::pop_with(stack, MarshalMode::Strict).unwrap_err();
    assert!(matches!(err, Error::Marshal { found: "table", .. }));
    assert_eq!(stack.top(), 0);

    stack.new_table();
    let promoted = marshal::pop_with(stack, MarshalMode::Promote).unwrap();
    assert_eq!(stack.top(), 0);
    assert!(promoted.as_reference().map_or(false, Reference::is_table));
}

#[test]
fn test_reference_variant_pushes_object() {
    let rt = runtime();
    let stack = rt.stack();
    stack.new_table();
    let r = Reference::acquire(stack, -1).unwrap();
    marshal::push(stack, &Variant::from(r));
    assert!(stack.raw_equal(-1, -2));
    stack.pop(2);
}

// ============================================================================
// Protection
// ============================================================================

#[test]
fn test_protect_pops_exactly_one_slot() {
    let rt = runtime();
    let stack = rt.stack();
    stack.push_str("keep me");
    stack.push_str("the error");

    let err = rt.protect(sys::LUA_ERRRUN).unwrap_err();
    assert_eq!(err.as_runtime().map(|f| f.message.as_str()), Some("the error"));
    assert_eq!(stack.top(), 1);
    assert_eq!(marshal::pop(stack), Variant::from("keep me"));
}

#[test]
fn test_protect_placeholder_message() {
    let rt = runtime();
    let stack = rt.stack();
    stack.new_table();
    let err = rt.protect(sys::LUA_ERRRUN).unwrap_err();
    assert_eq!(err.as_runtime().unwrap().message, PLACEHOLDER_MESSAGE);
    assert_eq!(stack.top(), 0);
}

#[test]
fn test_protect_success_is_noop() {
    let rt = runtime();
    let stack = rt.stack();
    stack.push_nil();
    rt.protect(sys::LUA_OK).unwrap();
    assert_eq!(stack.top(), 1);
    assert_eq!(rt.protector().failures(), 0);
    stack.pop(1);
}

#[test]
fn test_handler_runs_once_per_failure() {
    let rt = RuntimeState::open(StateOptions::default(), None).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    rt.protector().set_handler(Some(Rc::new(move |f: &RuntimeFailure| {
        sink.borrow_mut().push(f.status);
        Ok(())
    })));

    run(&rt, "local x = nil; return x[5]").unwrap();
    assert_eq!(*seen.borrow(), vec![Status::Runtime]);

    run(&rt, "this is not lua").unwrap();
    assert_eq!(*seen.borrow(), vec![Status::Runtime, Status::Syntax]);
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn test_no_handler_absorbs_failure() {
    let rt = RuntimeState::open(StateOptions::default(), None).unwrap();
    run(&rt, "error('ignored')").unwrap();
    assert_eq!(rt.protector().failures(), 1);
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn test_status_codes() {
    assert_eq!(Status::from_code(sys::LUA_ERRSYNTAX), Status::Syntax);
    assert_eq!(Status::from_code(42), Status::Unknown(42));
    assert_eq!(Status::Memory.code(), sys::LUA_ERRMEM);
    assert!(Status::Ok.is_ok());
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_parameters_arrive_in_declaration_order() {
    let rt = runtime();
    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let f = move |a: f64, b: f64, c: String| {
        *sink.borrow_mut() = Some((a, b, c));
    };
    install(&rt, "plop_xyz", Box::new(wrap("plop_xyz", f))).unwrap();

    run(&rt, "plop_xyz(2, 6, 'hello')").unwrap();
    assert_eq!(*seen.borrow(), Some((2.0, 6.0, "hello".to_string())));
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn test_result_is_pushed() {
    let rt = runtime();
    install(&rt, "add", Box::new(wrap("add", |a: i64, b: i64| a + b))).unwrap();
    run(&rt, "sum = add(40, 2)").unwrap();
    assert_eq!(global(&rt, "sum"), Variant::Float(42.0));
}

#[test]
fn test_eight_parameters() {
    let rt = runtime();
    let f = |a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32| {
        format!("{}{}{}{}{}{}{}{}", a, b, c, d, e, f, g, h)
    };
    install(&rt, "digits", Box::new(wrap("digits", f))).unwrap();
    run(&rt, "out = digits(1, 2, 3, 4, 5, 6, 7, 8)").unwrap();
    assert_eq!(global(&rt, "out"), Variant::from("12345678"));
}

#[test]
fn test_arity_mismatch_is_a_runtime_error() {
    let rt = runtime();
    install(&rt, "pair", Box::new(wrap("pair", |_a: f64, _b: f64| ()))).unwrap();

    let err = run(&rt, "pair(1)").unwrap_err();
    let message = &err.as_runtime().unwrap().message;
    assert!(message.contains("bad argument count to 'pair'"), "{}", message);
    assert!(message.contains("expected 2, got 1"), "{}", message);
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn test_argument_type_mismatch_names_position() {
    let rt = runtime();
    install(&rt, "twice", Box::new(wrap("twice", |_s: String, n: f64| n * 2.0))).unwrap();

    let err = run(&rt, "twice('x', {})").unwrap_err();
    let message = &err.as_runtime().unwrap().message;
    assert!(message.contains("bad argument #2 to 'twice'"), "{}", message);
    assert!(message.contains("got table"), "{}", message);
}

#[test]
fn test_optional_parameters_accept_nil() {
    let rt = runtime();
    let f = |label: Option<String>| label.unwrap_or_else(|| "none".to_string());
    install(&rt, "label", Box::new(wrap("label", f))).unwrap();
    run(&rt, "a = label(nil); b = label('x')").unwrap();
    assert_eq!(global(&rt, "a"), Variant::from("none"));
    assert_eq!(global(&rt, "b"), Variant::from("x"));
}

#[test]
fn test_host_error_becomes_runtime_error() {
    let rt = runtime();
    let f = |n: f64| -> std::result::Result<f64, String> {
        if n < 0.0 {
            Err(format!("negative input {}", n))
        } else {
            Ok(n.sqrt())
        }
    };
    install(&rt, "root", Box::new(wrap("root", f))).unwrap();

    run(&rt, "r = root(9)").unwrap();
    assert_eq!(global(&rt, "r"), Variant::Float(3.0));

    run(&rt, "ok, msg = pcall(root, -1)").unwrap();
    assert_eq!(global(&rt, "ok"), Variant::from(false));
    assert_eq!(global(&rt, "msg"), Variant::from("negative input -1"));
}

#[test]
fn test_panic_is_caught_at_dispatch() {
    let rt = runtime();
    install(&rt, "boom", Box::new(wrap("boom", || -> f64 { panic!("kaboom") }))).unwrap();

    let err = run(&rt, "boom()").unwrap_err();
    assert!(err.as_runtime().unwrap().message.contains("kaboom"));
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn test_create_function_is_callable() {
    let rt = runtime();
    let r = create_function(&rt, Box::new(wrap("neg", |n: f64| -n))).unwrap();
    assert!(r.is_function());

    let stack = rt.stack();
    r.push(stack);
    stack.push_number(5.0);
    let status = unsafe { sys::lua_pcall(stack.as_ptr(), 1, 1, 0) };
    rt.protect(status).unwrap();
    assert_eq!(marshal::pop(stack), Variant::Float(-5.0));
    assert_eq!(rt.dispatch_table().names(), vec!["neg".to_string()]);
}

#[test]
fn test_invalid_global_name() {
    let rt = runtime();
    let err = install(&rt, "bad\0name", Box::new(wrap("bad", || ()))).unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)));
    assert!(rt.dispatch_table().is_empty());
}

#[test]
fn test_install_under_strict_globals() {
    let rt = runtime();
    run(
        &rt,
        "setmetatable(_G, { __newindex = function(_, k) error('undeclared global ' .. k) end })",
    )
    .unwrap();

    let err = install(&rt, "late", Box::new(wrap("late", || 1.0))).unwrap_err();
    let message = &err.as_runtime().unwrap().message;
    assert!(message.contains("undeclared global late"), "{}", message);
    assert_eq!(rt.stack().top(), 0);

    // Names declared up front go through rawset and stay bindable.
    run(&rt, "rawset(_G, 'early', false)").unwrap();
    install(&rt, "early", Box::new(wrap("early", || 2.0))).unwrap();
    run(&rt, "rawset(_G, 'out', early())").unwrap();
    assert_eq!(global(&rt, "out"), Variant::Float(2.0));
}

#[test]
fn test_release_all_drops_captures() {
    let rt = runtime();
    let captured = Rc::new(());
    let held = Rc::clone(&captured);
    install(&rt, "keep", Box::new(wrap("keep", move || Rc::strong_count(&held) as f64))).unwrap();
    assert_eq!(Rc::strong_count(&captured), 2);

    assert_eq!(rt.dispatch_table().release_all(), 1);
    assert_eq!(Rc::strong_count(&captured), 1);
    assert_eq!(rt.dispatch_table().release_all(), 0);

    let err = run(&rt, "keep()").unwrap_err();
    let message = &err.as_runtime().unwrap().message;
    assert!(message.contains("host function 'keep' has been released"), "{}", message);
    assert_eq!(rt.dispatch_table().names(), vec!["keep".to_string()]);
    assert_eq!(rt.stack().top(), 0);
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_reader_streams_chunks() {
    let rt = runtime();
    let stack = rt.stack();
    let body = format!("total = 0\n{}", "total = total + 1\n".repeat(500));
    let mut reader = std::io::Cursor::new(body.into_bytes());

    let status = load_reader(stack, &mut reader, "=stream").unwrap();
    rt.protect(status).unwrap();
    let status = unsafe { sys::lua_pcall(stack.as_ptr(), 0, 0, 0) };
    rt.protect(status).unwrap();
    assert_eq!(global(&rt, "total"), Variant::Float(500.0));
}

#[test]
fn test_load_reader_io_failure() {
    struct Broken;
    impl std::io::Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    let rt = runtime();
    let err = load_reader(rt.stack(), &mut Broken, "=broken").unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(rt.stack().top(), 0);
}
