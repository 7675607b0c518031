//! Native call thunks generated by the Cranelift compiler

#![cfg(feature = "jit")]

mod common;

use std::sync::Arc;

use common::{Fixture, Point};
use raya_invoke::jit::CraneliftCompiler;
use raya_invoke::{ArgumentStorage, BindingFlags, InvokeConfig, InvokeContext, NativeEntry, ObjectRef, Runtime, Strategy, TrampolineShape};

extern "C" fn native_add(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn native_mix(a: i32, b: f64, c: u8, negate: bool) -> f64 {
    let sum = a as f64 + b + c as f64;
    if negate {
        -sum
    } else {
        sum
    }
}

extern "C" fn native_bump(x: *mut i32) {
    // SAFETY: the thunk passes the address of the prepared Int32 slot.
    unsafe { *x += 1 };
}

extern "C" fn native_point_sum(this: *const Point) -> i32 {
    // SAFETY: value-type targets are passed by address.
    let p = unsafe { *this };
    p.x + p.y
}

fn fixture() -> Fixture {
    let compiler = CraneliftCompiler::host().unwrap();
    Fixture::from_runtime(Runtime::with_compiler(InvokeConfig::default(), Arc::new(compiler)))
}

fn entry(address: *const ()) -> NativeEntry {
    // SAFETY: every function passed here matches its method's signature.
    unsafe { NativeEntry::new(address) }
}

// ============================================================================
// Boxed Shape
// ============================================================================

#[test]
fn test_native_add() {
    let fx = fixture();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    // The body is the interpreted path; the thunk calls the native entry.
    let method = types
        .method("Add", &fx.math)
        .param("a", &fx.int32)
        .param("b", &fx.int32)
        .returns(&fx.int32)
        .body(|frame| {
            let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
            frame.set_return(sum)
        })
        .native_entry(entry(native_add as *const ()))
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    for (a, b) in [(1, 2), (100, -1), (i32::MAX - 1, 1)] {
        let mut args = [heap.box_value(a).unwrap(), heap.box_value(b).unwrap()];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), Some(a + b));
    }
    assert_eq!(invoker.strategy(), Strategy::Compiled);
    assert!(invoker.has_trampoline(TrampolineShape::Boxed));
}

#[test]
fn test_native_mixed_primitives() {
    let fx = fixture();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Mix", &fx.math)
        .param("a", &fx.int32)
        .param("b", &fx.double)
        .param("c", &fx.byte)
        .param("negate", &fx.boolean)
        .returns(&fx.double)
        .body(|frame| {
            let sum = frame.arg::<i32>(0)? as f64 + frame.arg::<f64>(1)? + frame.arg::<u8>(2)? as f64;
            frame.set_return(if frame.arg::<bool>(3)? { -sum } else { sum })
        })
        .native_entry(entry(native_mix as *const ()))
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    for negate in [false, true, false] {
        let mut args = [
            heap.box_value(1i32).unwrap(),
            heap.box_value(0.25f64).unwrap(),
            heap.box_value(200u8).unwrap(),
            heap.box_value(negate).unwrap(),
        ];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        let expected = if negate { -201.25 } else { 201.25 };
        assert_eq!(result.unbox::<f64>(), Some(expected));
    }
}

#[test]
fn test_native_value_type_this() {
    let fx = fixture();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Sum", &fx.point)
        .instance()
        .returns(&fx.int32)
        .body(|frame| {
            let p = frame.this::<Point>()?;
            frame.set_return(p.x + p.y)
        })
        .native_entry(entry(native_point_sum as *const ()))
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    for i in 0..3 {
        let target = heap.box_value(Point { x: i, y: 10 }).unwrap();
        let result = invoker.invoke(target, &mut [], BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), Some(i + 10));
    }
}

// ============================================================================
// By-Ref Shape
// ============================================================================

#[test]
fn test_native_by_ref_argument() {
    let fx = fixture();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Bump", &fx.math)
        .param("x", &fx.by_ref(&fx.int32))
        .body(|frame| {
            *frame.arg_mut::<i32>(0)? += 1;
            Ok(())
        })
        .native_entry(entry(native_bump as *const ()))
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.box_value(0i32).unwrap()];
    for expected in 1..=3 {
        invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(args[0].unbox::<i32>(), Some(expected));
    }
    assert!(invoker.has_trampoline(TrampolineShape::ByRef));

    let mut value = 10i32;
    let mut storage = ArgumentStorage::new(1);
    {
        let ctx = InvokeContext::new(heap, &mut storage);
        ctx.set_argument_ref(0, &mut value).unwrap();
        ctx.invoke(&invoker).unwrap();
    }
    assert_eq!(value, 11);
}

// ============================================================================
// Fallback
// ============================================================================

#[test]
fn test_methods_without_native_entry_fall_back() {
    let fx = fixture();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.point_ctor());

    for i in 0..3 {
        let mut args = [heap.box_value(i).unwrap(), heap.box_value(-i).unwrap()];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<Point>(), Some(Point { x: i, y: -i }));
    }
    assert_eq!(invoker.strategy(), Strategy::Compiled);
}
