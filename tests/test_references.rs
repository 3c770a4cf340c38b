use moonbridge::{Error, MarshalMode, Session, Variant};
use std::rc::Rc;

fn alive(session: &Session) -> bool {
    session.eval("alive = tracker.t ~= nil").unwrap();
    session.get_global("alive").unwrap() == Variant::from(true)
}

#[test]
fn test_reference_keeps_object_alive_until_dropped() {
    let session = Session::new().unwrap();
    session
        .eval("tracker = setmetatable({}, { __mode = 'v' }); held = {}; tracker.t = held")
        .unwrap();

    let reference = session.get_reference("held").unwrap().unwrap();
    let copy = reference.clone();
    assert_eq!(session.live_references(), 1);

    session.eval("held = nil").unwrap();
    session.collect_garbage();
    assert!(alive(&session));

    drop(reference);
    session.collect_garbage();
    assert!(alive(&session), "a remaining copy must keep the table alive");

    drop(copy);
    assert_eq!(session.live_references(), 0);
    session.collect_garbage();
    assert!(!alive(&session));
}

#[test]
fn test_table_round_trip_keeps_stack_depth() {
    let session = Session::new().unwrap();
    let table = session.create_table().unwrap();
    let depth = session.stack_depth();

    table.set("answer", 42).unwrap();
    table.set(1, "first").unwrap();
    assert_eq!(table.get("answer").unwrap(), Variant::Float(42.0));
    assert_eq!(table.get(1).unwrap(), Variant::from("first"));
    assert_eq!(session.stack_depth(), depth);

    session.set_global("config", table.clone()).unwrap();
    session.eval("config.answer = config.answer + 1").unwrap();
    assert_eq!(table.entry("answer").get().unwrap(), Variant::Float(43.0));
}

#[test]
fn test_table_view_of_script_table() {
    let session = Session::new().unwrap();
    session.eval("point = { x = 3, y = 4, 'a', 'b' }").unwrap();

    let point = session.get_table("point").unwrap().unwrap();
    assert_eq!(point.get("x").unwrap(), Variant::Float(3.0));
    assert_eq!(point.len(), 2);
    assert_eq!(point.pairs().unwrap().len(), 4);

    assert!(session.get_table("missing").unwrap().is_none());
    session.eval("text = 'not a table'").unwrap();
    assert!(matches!(session.get_table("text"), Err(Error::Marshal { .. })));
}

#[test]
fn test_metamethod_errors_are_protected() {
    let session = Session::new().unwrap();
    session
        .eval("locked = setmetatable({}, { __index = function() error('no reads') end })")
        .unwrap();
    let locked = session.get_table("locked").unwrap().unwrap();

    let err = locked.get("anything").unwrap_err();
    assert!(err.to_string().contains("no reads"), "{}", err);
    assert_eq!(session.stack_depth(), 0);
}

#[test]
fn test_marshal_modes_on_functions() {
    let session = Session::new().unwrap();
    session.eval("function f() return 1 end").unwrap();

    assert_eq!(session.get_global("f").unwrap(), Variant::Nil);

    session.set_marshal_mode(MarshalMode::Strict);
    assert!(matches!(session.get_global("f"), Err(Error::Marshal { found: "function", .. })));
    assert_eq!(session.stack_depth(), 0);

    session.set_marshal_mode(MarshalMode::Promote);
    let f = session.get_global("f").unwrap();
    let reference = f.as_reference().unwrap();
    assert!(reference.is_function());
    assert_eq!(session.call_reference(reference, ()).unwrap(), Variant::Float(1.0));
}

#[test]
fn test_references_compare_by_identity() {
    let session = Session::new().unwrap();
    session.eval("a = {}; b = a; c = {}").unwrap();
    let a = session.get_reference("a").unwrap().unwrap();
    let b = session.get_reference("b").unwrap().unwrap();
    let c = session.get_reference("c").unwrap().unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
#[should_panic]
fn test_reference_from_other_session_panics() {
    let first = Session::new().unwrap();
    let second = Session::new().unwrap();
    let table = first.create_table().unwrap();
    let _ = second.set_global("stolen", table);
}

#[test]
fn test_captured_handles_do_not_outlive_session() {
    let session = Session::new().unwrap();
    let runtime = Rc::downgrade(session.runtime());

    let table = session.create_table().unwrap();
    session.register("put", move |v: f64| table.set("v", v)).unwrap();

    session.eval("counter = {}").unwrap();
    let counter = session.get_reference("counter").unwrap().unwrap();
    let size = session
        .create_function("size", move || counter.type_name().len() as f64)
        .unwrap();

    session.eval("put(5)").unwrap();
    assert_eq!(session.call_reference(&size, ()).unwrap(), Variant::Float(5.0));

    drop(size);
    drop(session);
    assert!(runtime.upgrade().is_none(), "runtime must close with its last session");
}
