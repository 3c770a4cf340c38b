use criterion::{black_box, criterion_group, criterion_main, Criterion};
use moonbridge_runtime::ffi::sys;
use moonbridge_runtime::interop::{install, load_source, marshal, wrap, EVAL_CHUNK};
use moonbridge_runtime::{RuntimeState, StateOptions, Variant};

fn bench_marshal(c: &mut Criterion) {
    let rt = RuntimeState::open(StateOptions::default(), None).unwrap();
    let stack = rt.stack();

    c.bench_function("push_pop_float", |b| {
        let value = Variant::from(3.5);
        b.iter(|| {
            marshal::push(stack, black_box(&value));
            black_box(marshal::pop(stack));
        });
    });

    c.bench_function("push_pop_string", |b| {
        let value = Variant::from("the quick brown fox");
        b.iter(|| {
            marshal::push(stack, black_box(&value));
            black_box(marshal::pop(stack));
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = RuntimeState::open(StateOptions::default(), None).unwrap();
    install(&rt, "add", Box::new(wrap("add", |a: f64, b: f64| a + b))).unwrap();

    let stack = rt.stack();
    let status = load_source(stack, "local add = add; for i = 1, 1000 do add(i, 1) end", EVAL_CHUNK).unwrap();
    rt.protect(status).unwrap();
    let chunk = moonbridge_runtime::Reference::acquire(stack, -1).unwrap();
    stack.pop(1);

    c.bench_function("dispatch_1000_calls", |b| {
        b.iter(|| {
            chunk.push(stack);
            let status = unsafe { sys::lua_pcall(stack.as_ptr(), 0, 0, 0) };
            rt.protect(status).unwrap();
        });
    });
}

criterion_group!(benches, bench_marshal, bench_dispatch);
criterion_main!(benches);
