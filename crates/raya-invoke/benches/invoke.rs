use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use raya_invoke::method::MethodDescriptor;
use raya_invoke::{
    ArgumentStorage, BindingFlags, InvokeConfig, InvokeContext, ObjectRef, PrimitiveKind, Runtime, TypeHandle,
};

fn add_method(runtime: &Runtime) -> Arc<MethodDescriptor> {
    let types = runtime.types();
    let int32: TypeHandle = types.primitive(PrimitiveKind::Int32).clone();
    let math = types.register_class("Math", None, &[]).unwrap();
    types
        .method("Add", &math)
        .param("a", &int32)
        .param("b", &int32)
        .returns(&int32)
        .body(|frame| {
            let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
            frame.set_return(sum)
        })
        .build()
        .unwrap()
}

fn runtimes() -> Vec<(&'static str, Runtime)> {
    vec![
        (
            "interpreted",
            Runtime::with_config(InvokeConfig {
                force_interpreted: true,
                ..Default::default()
            }),
        ),
        (
            "compiled",
            Runtime::with_config(InvokeConfig {
                force_compiled: true,
                ..Default::default()
            }),
        ),
    ]
}

fn bench_args_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("args_array");

    for (name, runtime) in runtimes() {
        let invoker = runtime.get_invoker(&add_method(&runtime));
        let heap = runtime.heap();
        let a = heap.box_value(20i32).unwrap();
        let b = heap.box_value(22i32).unwrap();

        group.bench_with_input(BenchmarkId::new("add", name), &invoker, |bench, invoker| {
            bench.iter(|| {
                let mut args = [a, b];
                let result = invoker
                    .invoke(ObjectRef::null(), black_box(&mut args), BindingFlags::DEFAULT)
                    .unwrap();
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("context");

    for (name, runtime) in runtimes() {
        let invoker = runtime.get_invoker(&add_method(&runtime));
        let heap = runtime.heap();
        let mut storage = ArgumentStorage::new(2);

        group.bench_function(BenchmarkId::new("add_by_ref", name), |bench| {
            bench.iter(|| {
                let mut a = black_box(20i32);
                let mut b = black_box(22i32);
                let mut sum = 0i32;
                {
                    let ctx = InvokeContext::new(heap, &mut storage);
                    ctx.set_argument_ref(0, &mut a).unwrap();
                    ctx.set_argument_ref(1, &mut b).unwrap();
                    ctx.set_return_ref(&mut sum).unwrap();
                    ctx.invoke(&invoker).unwrap();
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_args_array, bench_context);
criterion_main!(benches);
